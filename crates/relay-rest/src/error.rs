//! REST error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RestError {
    /// A request that could not be completed, after retries where the
    /// failure was retryable. `status` is `None` when no response arrived
    /// at all (network-only failure).
    #[error("Request failed: status={status:?}, retriable={retriable}: {message}")]
    RequestFailed {
        status: Option<u16>,
        message: String,
        retriable: bool,
    },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response decode error: {0}")]
    Decode(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RestError {
    /// Whether this failure class is worth retrying.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::RequestFailed {
                retriable: true,
                ..
            }
        )
    }

    /// Whether no response was received at all.
    pub fn is_network_only(&self) -> bool {
        matches!(self, Self::RequestFailed { status: None, .. })
    }
}

pub type RestResult<T> = Result<T, RestError>;
