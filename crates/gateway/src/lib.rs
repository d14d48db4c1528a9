//! The engine core: rule registry and listener fan-out, the time-trigger
//! scheduler, and the connection supervisor that keeps the remote link
//! alive.

pub mod engine;
pub mod scheduler;
pub mod supervisor;

pub use engine::{run_scheduler_loop, Engine};
pub use scheduler::Scheduler;
pub use supervisor::{new_connection_sender, run_supervisor, ConnectionSender, RemoteConfig};
