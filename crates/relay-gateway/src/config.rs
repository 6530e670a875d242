//! Application configuration.

use crate::error::{AppError, AppResult};
use relay_core::stream_id;
use relay_hub::HubConfig;
use relay_rest::RestConfig;
use relay_stream::StreamConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One exchange subscription the gateway maintains upstream. Replayed in
/// full after every reconnect, because the exchange session starts from
/// zero subscription state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamSubscription {
    /// Channel name, e.g. "ticker" or "kline_1h".
    pub channel: String,
    /// Symbol, e.g. "BTCUSDT".
    pub symbol: String,
}

impl UpstreamSubscription {
    /// Exchange stream id: lowercase `symbol@channel`.
    pub fn stream_id(&self) -> String {
        stream_id(&self.symbol, &self.channel)
    }
}

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub rest: RestConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub hub: HubConfig,
    /// Exchange subscriptions wanted by this process.
    #[serde(default)]
    pub subscriptions: Vec<UpstreamSubscription>,
    /// Force-exit bound for graceful shutdown.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

fn default_shutdown_grace_ms() -> u64 {
    10_000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            rest: RestConfig::default(),
            stream: StreamConfig::default(),
            hub: HubConfig::default(),
            subscriptions: Vec::new(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl AppConfig {
    /// Load from file, falling back to defaults when the file is absent.
    pub fn load_or_default(config_path: &str) -> AppResult<Self> {
        if Path::new(config_path).exists() {
            Self::from_file(config_path)
        } else {
            tracing::warn!(path = %config_path, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Stream ids for every wanted upstream subscription.
    pub fn upstream_stream_ids(&self) -> Vec<String> {
        self.subscriptions.iter().map(|s| s.stream_id()).collect()
    }
}
