//! The REST surface, running as a separate task talking to the engine core
//! only through its shared, mutex-guarded handle.

pub mod routes;

pub use routes::{router, AppState};
