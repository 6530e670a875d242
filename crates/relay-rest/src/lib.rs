//! Signed REST request pipeline to the exchange.
//!
//! Provides authenticated calls with:
//! - HMAC-SHA256 request signing over a canonical string
//! - Fresh per-attempt timestamps
//! - Bounded retry with exponential backoff (network, 5xx and 429 only)
//! - Typed terminal errors carrying the exchange's own message

pub mod api;
pub mod error;
pub mod executor;
pub mod signer;

pub use api::{OrderRequest, Side};
pub use error::{RestError, RestResult};
pub use executor::{RestConfig, SignedRequestExecutor};
