//! Realtime exchange gateway.
//!
//! Ingests market events from one exchange stream, republishes them to
//! dashboard clients through the subscription hub, and issues signed
//! trading commands over REST.

pub mod app;
pub mod config;
pub mod error;

pub use app::Application;
pub use config::{AppConfig, UpstreamSubscription};
pub use error::{AppError, AppResult};
