//! Exchange stream connectivity for the relay gateway.
//!
//! Provides:
//! - A single resilient WebSocket session with linear-backoff reconnect,
//!   a bounded attempt budget and a flap guard on the counter reset
//! - Fail-fast subscription commands (nothing queued while disconnected)
//! - Frame decoding into typed [`relay_core::ExchangeEvent`]s published on
//!   an internal broadcast bus

pub mod connection;
pub mod error;
pub mod frame;
pub mod router;

pub use connection::{
    ConnectionState, StreamConfig, StreamConnection, StreamEvent, StreamWriteHandle,
};
pub use error::{StreamError, StreamResult};
pub use frame::{RawFrame, StreamCommand};
pub use router::{decode_frame, EventRouter};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any WebSocket connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
