//! Fan-out from the internal event bus to subscribed clients.

use crate::registry::ClientRegistry;
use relay_core::ExchangeEvent;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Consume the event bus until it closes, routing each event to the
/// clients subscribed to its `channel:symbol` key.
pub async fn run_fanout(
    registry: Arc<ClientRegistry>,
    mut bus: broadcast::Receiver<ExchangeEvent>,
) {
    loop {
        match bus.recv().await {
            Ok(event) => {
                fan_out(&registry, event);
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                // At-most-once: the hub missed events while busy. Clients
                // simply do not see them.
                warn!(skipped, "Hub lagged behind the event bus");
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("Event bus closed, fan-out stopping");
                return;
            }
        }
    }
}

/// Route one event. Returns the number of clients it was queued for.
///
/// Account events carry no top-level symbol; the routing symbol comes from
/// the payload's `symbol` field, or the empty string, so clients can
/// subscribe either way.
pub fn fan_out(registry: &ClientRegistry, event: ExchangeEvent) -> usize {
    match event {
        ExchangeEvent::Ticker { symbol, payload } => registry.broadcast("ticker", &symbol, payload),
        ExchangeEvent::Kline { symbol, payload } => registry.broadcast("kline", &symbol, payload),
        ExchangeEvent::OrderUpdate { payload } => {
            let symbol = payload_symbol(&payload);
            registry.broadcast("orderUpdate", &symbol, payload)
        }
        ExchangeEvent::BalanceUpdate { payload } => {
            let symbol = payload_symbol(&payload);
            registry.broadcast("balanceUpdate", &symbol, payload)
        }
        ExchangeEvent::Unknown { event, .. } => {
            // No channel to route by; bus subscribers other than the hub
            // may still care.
            debug!(event, "Unknown event not fanned out");
            0
        }
    }
}

fn payload_symbol(payload: &serde_json::Value) -> String {
    payload
        .get("symbol")
        .and_then(|s| s.as_str())
        .unwrap_or("")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ServerMessage;
    use crate::registry::CLIENT_QUEUE_DEPTH;
    use relay_core::SubscriptionKey;
    use serde_json::json;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_ticker_routes_by_event_symbol() {
        let registry = ClientRegistry::new();
        let (tx, mut rx) = mpsc::channel(CLIENT_QUEUE_DEPTH);
        let id = registry.register(tx);
        registry.subscribe(id, SubscriptionKey::new("ticker", "BTCUSDT"));

        let delivered = fan_out(
            &registry,
            ExchangeEvent::Ticker {
                symbol: "BTCUSDT".to_string(),
                payload: json!({"last": "42000"}),
            },
        );
        assert_eq!(delivered, 1);
        assert!(matches!(
            rx.recv().await.unwrap(),
            ServerMessage::Data { .. }
        ));
    }

    #[tokio::test]
    async fn test_order_update_routes_by_payload_symbol() {
        let registry = ClientRegistry::new();
        let (tx, mut rx) = mpsc::channel(CLIENT_QUEUE_DEPTH);
        let id = registry.register(tx);
        registry.subscribe(id, SubscriptionKey::new("orderUpdate", "BTCUSDT"));

        let delivered = fan_out(
            &registry,
            ExchangeEvent::OrderUpdate {
                payload: json!({"symbol": "BTCUSDT", "orderId": "7", "status": "FILLED"}),
            },
        );
        assert_eq!(delivered, 1);

        match rx.recv().await.unwrap() {
            ServerMessage::Data {
                channel, symbol, ..
            } => {
                assert_eq!(channel, "orderUpdate");
                assert_eq!(symbol, "BTCUSDT");
            }
            other => panic!("expected Data, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_balance_update_without_symbol_uses_empty_key() {
        let registry = ClientRegistry::new();
        let (tx, mut rx) = mpsc::channel(CLIENT_QUEUE_DEPTH);
        let id = registry.register(tx);
        registry.subscribe(id, SubscriptionKey::new("balanceUpdate", ""));

        let delivered = fan_out(
            &registry,
            ExchangeEvent::BalanceUpdate {
                payload: json!({"asset": "USDT", "free": "1000"}),
            },
        );
        assert_eq!(delivered, 1);
        assert!(rx.recv().await.is_some());
    }

    #[test]
    fn test_unknown_event_is_not_fanned_out() {
        let registry = ClientRegistry::new();
        let delivered = fan_out(
            &registry,
            ExchangeEvent::Unknown {
                event: "mystery".to_string(),
                raw: json!({}),
            },
        );
        assert_eq!(delivered, 0);
    }
}
