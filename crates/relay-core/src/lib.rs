//! Core domain types for the relay exchange gateway.
//!
//! Shared vocabulary between the REST executor, the exchange stream and the
//! client-facing hub: typed exchange events, subscription keys and API
//! credentials.

pub mod credentials;
pub mod event;
pub mod key;

pub use credentials::Credentials;
pub use event::ExchangeEvent;
pub use key::{stream_id, KeyParseError, SubscriptionKey};
