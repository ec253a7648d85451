use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid period `{token}`: {reason}")]
    InvalidPeriod { token: String, reason: String },

    #[error("record store unavailable during {operation}: {detail}")]
    UpstreamUnavailable { operation: String, detail: String },
}

impl EngineError {
    pub fn invalid_period(token: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::InvalidPeriod {
            token: token.into(),
            reason: reason.into(),
        }
    }

    pub fn upstream(operation: impl Into<String>, detail: impl ToString) -> Self {
        EngineError::UpstreamUnavailable {
            operation: operation.into(),
            detail: detail.to_string(),
        }
    }

    /// Only store failures are worth another attempt; bad input stays bad.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::UpstreamUnavailable { .. })
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
