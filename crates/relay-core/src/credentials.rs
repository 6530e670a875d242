//! API credentials.
//!
//! Immutable for the process lifetime. The secret is zeroized on drop and
//! neither field ever reaches a log line: `Debug` masks both.

use std::fmt;
use zeroize::Zeroizing;

/// API key + secret used to sign authenticated exchange requests.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
    api_secret: Zeroizing<String>,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: Zeroizing::new(api_secret.into()),
        }
    }

    /// Read from `RELAY_API_KEY` / `RELAY_API_SECRET`.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("RELAY_API_KEY").ok()?;
        let api_secret = std::env::var("RELAY_API_SECRET").ok()?;
        Some(Self::new(api_key, api_secret))
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Secret bytes for HMAC computation. Do not log.
    pub fn secret_bytes(&self) -> &[u8] {
        self.api_secret.as_bytes()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let masked_key = if self.api_key.len() > 8 {
            format!(
                "{}...{}",
                &self.api_key[..4],
                &self.api_key[self.api_key.len() - 4..]
            )
        } else {
            "***REDACTED***".to_string()
        };

        f.debug_struct("Credentials")
            .field("api_key", &masked_key)
            .field("api_secret", &"***REDACTED***")
            .finish()
    }
}
