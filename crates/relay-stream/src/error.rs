//! Stream error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    /// Fail-fast error for sends attempted while the session is not open.
    /// Nothing is queued; the caller decides whether to retry later.
    #[error("Stream is not open")]
    NotOpen,

    /// Terminal condition: the reconnect budget is spent. Operator action
    /// required; the connection will not retry on its own.
    #[error("Reconnect failed after {attempts} attempts")]
    ReconnectFailed { attempts: u32 },

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StreamResult<T> = Result<T, StreamError>;
