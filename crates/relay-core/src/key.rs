//! Subscription keys and exchange stream identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error parsing a `channel:symbol` key.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyParseError {
    #[error("subscription key missing ':' separator: {0}")]
    MissingSeparator(String),
    #[error("subscription key has empty channel: {0}")]
    EmptyChannel(String),
}

/// Fan-out routing key: one `(channel, symbol)` pair.
///
/// Many client sessions may hold the same key; one session may hold many.
/// The symbol may be empty for account channels that carry no symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubscriptionKey {
    channel: String,
    symbol: String,
}

impl SubscriptionKey {
    pub fn new(channel: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            symbol: symbol.into(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.channel, self.symbol)
    }
}

impl FromStr for SubscriptionKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (channel, symbol) = s
            .split_once(':')
            .ok_or_else(|| KeyParseError::MissingSeparator(s.to_string()))?;
        if channel.is_empty() {
            return Err(KeyParseError::EmptyChannel(s.to_string()));
        }
        Ok(Self::new(channel, symbol))
    }
}

impl TryFrom<String> for SubscriptionKey {
    type Error = KeyParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<SubscriptionKey> for String {
    fn from(key: SubscriptionKey) -> Self {
        key.to_string()
    }
}

/// Exchange stream identifier for SUBSCRIBE/UNSUBSCRIBE params.
///
/// Lowercased `symbol@channel`, e.g. `btcusdt@ticker`, `btcusdt@kline_1h`.
pub fn stream_id(symbol: &str, channel: &str) -> String {
    format!("{}@{}", symbol.to_lowercase(), channel.to_lowercase())
}
