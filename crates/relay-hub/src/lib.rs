//! Client-facing WebSocket subscription hub.
//!
//! Accepts dashboard client connections, tracks per-client `(channel,
//! symbol)` subscriptions and fans exchange events out to the matching
//! clients. Registry state has a single owner; broadcast is best-effort and
//! never blocks on a slow client.

pub mod config;
pub mod error;
pub mod fanout;
pub mod protocol;
pub mod registry;
pub mod server;

pub use config::HubConfig;
pub use error::{HubError, HubResult};
pub use fanout::{fan_out, run_fanout};
pub use protocol::{ClientRequest, ServerMessage, SubscriptionAck, SubscriptionRequest};
pub use registry::{ClientRegistry, CLIENT_QUEUE_DEPTH};
pub use server::{create_router, run_server, ConnectionLimiter, HubState};
