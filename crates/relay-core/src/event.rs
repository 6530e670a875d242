//! Typed exchange events.
//!
//! Inbound stream frames are decoded into this tagged union by the router.
//! Consumers match exhaustively; there is no string-keyed dispatch anywhere
//! downstream of the decoder.

use serde::{Deserialize, Serialize};

/// One decoded event from the exchange stream.
///
/// Payloads are kept as opaque JSON. The gateway relays them; it does not
/// interpret prices or balances.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ExchangeEvent {
    /// Ticker update for a symbol.
    Ticker {
        symbol: String,
        payload: serde_json::Value,
    },
    /// Candlestick update for a symbol.
    Kline {
        symbol: String,
        payload: serde_json::Value,
    },
    /// Order state change on the authenticated account.
    OrderUpdate { payload: serde_json::Value },
    /// Balance change on the authenticated account.
    BalanceUpdate { payload: serde_json::Value },
    /// Event name the gateway does not know. Still published so consumers
    /// can opt in; unknown names are protocol evolution, not errors.
    Unknown {
        event: String,
        raw: serde_json::Value,
    },
}

impl ExchangeEvent {
    /// Channel name used for fan-out routing, if this event has one.
    pub fn channel(&self) -> Option<&'static str> {
        match self {
            Self::Ticker { .. } => Some("ticker"),
            Self::Kline { .. } => Some("kline"),
            Self::OrderUpdate { .. } => Some("orderUpdate"),
            Self::BalanceUpdate { .. } => Some("balanceUpdate"),
            Self::Unknown { .. } => None,
        }
    }

    /// Symbol carried by the event itself, if any.
    ///
    /// Account events (`OrderUpdate`, `BalanceUpdate`) carry the symbol in
    /// their payload instead; see the hub for how those are routed.
    pub fn symbol(&self) -> Option<&str> {
        match self {
            Self::Ticker { symbol, .. } | Self::Kline { symbol, .. } => Some(symbol),
            _ => None,
        }
    }
}
