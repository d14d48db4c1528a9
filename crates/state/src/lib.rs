//! The in-memory entity state mirror, its listener index, and the
//! single-writer command facade other crates use to reach it.

pub mod facade;
pub mod store;

pub use facade::{spawn_store, EngineHandle};
pub use store::{EngineStore, Listener, StateSnapshot};
