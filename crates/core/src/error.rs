use thiserror::Error;

/// Error taxonomy shared by the scheduler, rule runtime, and state façade.
#[derive(Debug, Error)]
pub enum Error {
    /// A `TimeSpec` or rule descriptor was rejected by validation.
    #[error("invalid spec: {field}: {message}")]
    InvalidSpec { field: String, message: String },

    /// A rule file failed to parse or construct.
    #[error("rule '{id}' failed to load: {message}")]
    RuleLoadError { id: String, message: String },

    /// The remote link read or write failed.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// A `ServiceAction` could not be sent.
    #[error("action failed: {0}")]
    ActionFailed(String),

    /// A `ConditionAction` evaluated false.
    #[error("condition evaluated false")]
    ConditionFalse,

    /// A cross-thread façade call exceeded its deadline.
    #[error("facade call timed out")]
    Timeout,

    /// The requested rule, entity, or service was not found.
    #[error("not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;
