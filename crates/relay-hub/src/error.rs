//! Hub error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("Server error: {0}")]
    Server(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type HubResult<T> = Result<T, HubError>;
