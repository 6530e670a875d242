//! Client-facing wire protocol.
//!
//! Inbound: `{type: "subscribe"|"unsubscribe"|"ping", data: {channel, symbol}}`.
//! Outbound messages always carry an ISO-8601 timestamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Raw inbound client message.
///
/// The `type` is kept as a string so unknown types can be echoed back in an
/// error message instead of failing as a parse error.
#[derive(Debug, Deserialize)]
pub struct ClientRequest {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Payload of subscribe/unsubscribe requests.
#[derive(Debug, Deserialize)]
pub struct SubscriptionRequest {
    pub channel: String,
    pub symbol: String,
}

/// Subscription acknowledgement payload.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionAck {
    pub channel: String,
    pub symbol: String,
    /// The composite `channel:symbol` key.
    pub subscription: String,
}

/// Welcome payload sent on connect.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionData {
    pub client_id: Uuid,
}

/// Outbound server message (tagged enum for type safety).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Welcome, sent once per connection.
    Connection {
        data: ConnectionData,
        timestamp: DateTime<Utc>,
    },
    Subscribed {
        data: SubscriptionAck,
        timestamp: DateTime<Utc>,
    },
    Unsubscribed {
        data: SubscriptionAck,
        timestamp: DateTime<Utc>,
    },
    Pong {
        timestamp: DateTime<Utc>,
    },
    Error {
        message: String,
        timestamp: DateTime<Utc>,
    },
    /// Fanned-out exchange data.
    Data {
        channel: String,
        symbol: String,
        data: serde_json::Value,
        timestamp: DateTime<Utc>,
    },
}

impl ServerMessage {
    pub fn connection(client_id: Uuid) -> Self {
        Self::Connection {
            data: ConnectionData { client_id },
            timestamp: Utc::now(),
        }
    }

    pub fn subscribed(channel: &str, symbol: &str, subscription: String) -> Self {
        Self::Subscribed {
            data: SubscriptionAck {
                channel: channel.to_string(),
                symbol: symbol.to_string(),
                subscription,
            },
            timestamp: Utc::now(),
        }
    }

    pub fn unsubscribed(channel: &str, symbol: &str, subscription: String) -> Self {
        Self::Unsubscribed {
            data: SubscriptionAck {
                channel: channel.to_string(),
                symbol: symbol.to_string(),
                subscription,
            },
            timestamp: Utc::now(),
        }
    }

    pub fn pong() -> Self {
        Self::Pong {
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn data(channel: &str, symbol: &str, data: serde_json::Value) -> Self {
        Self::Data {
            channel: channel.to_string(),
            symbol: symbol.to_string(),
            data,
            timestamp: Utc::now(),
        }
    }
}
