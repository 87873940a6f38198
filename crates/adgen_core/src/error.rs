use thiserror::Error;

/// Every failure the client can surface, one variant per user-facing path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Rejected locally before any network call; no job exists.
    #[error("invalid `{field}`: {reason}")]
    Validation { field: String, reason: String },
    #[error("not signed in")]
    Unauthenticated,
    /// The service reported insufficient credits (HTTP 402).
    #[error("quota exceeded: {message}")]
    QuotaExceeded { message: String },
    #[error("network error: {message}")]
    TransientNetwork { message: String },
    #[error("job failed: {message}")]
    JobFailed { message: String },
    #[error("stream error: {message}")]
    StreamError { message: String },
    #[error("disposal not acknowledged: {message}")]
    DisposalAckFailure { message: String },
    #[error("request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("unexpected response: {message}")]
    Protocol { message: String },
    #[error("cancelled")]
    Cancelled,
}

impl ClientError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::TransientNetwork {
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Only transient network errors are retried without user action.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientNetwork { .. })
    }
}
