//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("REST error: {0}")]
    Rest(#[from] relay_rest::RestError),

    #[error("Stream error: {0}")]
    Stream(#[from] relay_stream::StreamError),

    #[error("Hub error: {0}")]
    Hub(#[from] relay_hub::HubError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] relay_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
