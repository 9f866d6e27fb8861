use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignalError {
    /// Malformed input event. Recovered locally: the event is skipped and
    /// reported in the batch summary.
    #[error("Invalid event field '{field}': {reason}")]
    Validation { field: String, reason: String },

    /// Missing or invalid reference data / weight configuration.
    /// Fatal to the run; no partial results are published.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// External filing feed failed. The run aborts cleanly; previously
    /// published results remain untouched.
    #[error("Filing feed unavailable: {0}")]
    FeedUnavailable(String),

    /// A run was requested while another is in flight.
    #[error("A run is already in progress")]
    ConcurrentRun,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl SignalError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        SignalError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
