//! Event routing: exchange frames to typed events on the internal bus.
//!
//! Publication is fire-and-forget over a broadcast channel. A subscriber
//! that lags or is absent simply misses events; that matches the exchange's
//! own unacknowledged push model.

use relay_core::ExchangeEvent;
use relay_telemetry::metrics::EVENTS_ROUTED_TOTAL;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

/// Default bus capacity. Lagging subscribers drop the oldest events.
const DEFAULT_BUS_CAPACITY: usize = 256;

/// Decodes inbound exchange frames and republishes them as
/// [`ExchangeEvent`]s on an internal broadcast bus.
pub struct EventRouter {
    bus: broadcast::Sender<ExchangeEvent>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (bus, _) = broadcast::channel(capacity);
        Self { bus }
    }

    /// Subscribe to the event bus.
    pub fn subscribe(&self) -> broadcast::Receiver<ExchangeEvent> {
        self.bus.subscribe()
    }

    /// Publish one event. No delivery guarantee: an error just means no
    /// subscriber is currently listening.
    pub fn publish(&self, event: ExchangeEvent) {
        let channel = event.channel().unwrap_or("unknown");
        EVENTS_ROUTED_TOTAL.with_label_values(&[channel]).inc();

        match self.bus.send(event) {
            Ok(receivers) => {
                debug!(channel, receivers, "Event published");
            }
            Err(_) => {
                debug!(channel, "No bus subscribers, event dropped");
            }
        }
    }

    /// Consume decoded frames until the connection side closes the channel.
    pub async fn run(&self, mut frames: mpsc::Receiver<serde_json::Value>) {
        while let Some(value) = frames.recv().await {
            if let Some(event) = decode_frame(&value) {
                self.publish(event);
            }
        }
        debug!("Frame channel closed, router stopping");
    }
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// Map one exchange frame to a typed event.
///
/// Dispatch is on the frame's declared `event` name. Names the gateway does
/// not know become `Unknown` and are still published; the exchange protocol
/// may grow event types faster than this gateway does. Frames with no
/// `event` field at all (subscription acks and similar) produce nothing.
pub fn decode_frame(value: &serde_json::Value) -> Option<ExchangeEvent> {
    let event_name = match value.get("event").and_then(|e| e.as_str()) {
        Some(name) => name,
        None => {
            debug!("Frame without event name ignored");
            return None;
        }
    };

    let symbol = value.get("symbol").and_then(|s| s.as_str());
    let payload = value.get("data").cloned().unwrap_or(serde_json::Value::Null);

    let event = match (event_name, symbol) {
        ("ticker", Some(symbol)) => ExchangeEvent::Ticker {
            symbol: symbol.to_string(),
            payload,
        },
        ("kline", Some(symbol)) => ExchangeEvent::Kline {
            symbol: symbol.to_string(),
            payload,
        },
        ("ticker" | "kline", None) => {
            // Market data without a symbol cannot be routed; keep it
            // observable instead of fabricating a key.
            warn!(event = event_name, "Market data frame without symbol");
            ExchangeEvent::Unknown {
                event: event_name.to_string(),
                raw: value.clone(),
            }
        }
        ("orderUpdate", _) => ExchangeEvent::OrderUpdate { payload },
        ("balanceUpdate", _) => ExchangeEvent::BalanceUpdate { payload },
        (other, _) => ExchangeEvent::Unknown {
            event: other.to_string(),
            raw: value.clone(),
        },
    };

    Some(event)
}
