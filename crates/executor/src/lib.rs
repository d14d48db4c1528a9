//! Sequenced action execution and rule invocation semantics.

pub mod runtime;

pub use runtime::{invoke_rule, ServiceSender};
