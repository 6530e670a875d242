//! Exchange stream wire types.

use serde::{Deserialize, Serialize};

/// Outbound subscription command.
///
/// `{"method":"SUBSCRIBE","params":["btcusdt@ticker"],"id":1}` — params are
/// lowercase `symbol@channel` stream ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamCommand {
    pub method: String,
    pub params: Vec<String>,
    pub id: u64,
}

impl StreamCommand {
    pub fn subscribe(params: Vec<String>, id: u64) -> Self {
        Self {
            method: "SUBSCRIBE".to_string(),
            params,
            id,
        }
    }

    pub fn unsubscribe(params: Vec<String>, id: u64) -> Self {
        Self {
            method: "UNSUBSCRIBE".to_string(),
            params,
            id,
        }
    }
}

/// Inbound stream frame: `{event, symbol?, data}`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawFrame {
    pub event: String,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
}
