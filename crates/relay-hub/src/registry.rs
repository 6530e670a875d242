//! Client session registry.
//!
//! Single owner of every `ClientSession`. All mutation and broadcast
//! iteration is serialized through this struct's interior lock; the session
//! map is never handed out, so a broadcast can never observe a session
//! mid-removal.

use crate::protocol::ServerMessage;
use parking_lot::RwLock;
use relay_core::SubscriptionKey;
use relay_telemetry::metrics::{CLIENTS_CONNECTED, FANOUT_DELIVERED_TOTAL};
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;
use tracing::{debug, trace};
use uuid::Uuid;

/// Outbound queue depth per client. A client that falls this far behind
/// starts losing frames, not stalling the broadcast path.
pub const CLIENT_QUEUE_DEPTH: usize = 64;

/// One connected dashboard client.
struct ClientSession {
    /// Outbound queue drained by the socket writer task.
    tx: mpsc::Sender<ServerMessage>,
    /// Subscription keys held by this client. Insertion order irrelevant.
    keys: HashSet<SubscriptionKey>,
}

/// Registry of connected clients and their subscriptions.
#[derive(Default)]
pub struct ClientRegistry {
    sessions: RwLock<HashMap<Uuid, ClientSession>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session around its outbound queue. Returns the fresh
    /// client id.
    pub fn register(&self, tx: mpsc::Sender<ServerMessage>) -> Uuid {
        let id = Uuid::new_v4();
        let mut sessions = self.sessions.write();
        sessions.insert(
            id,
            ClientSession {
                tx,
                keys: HashSet::new(),
            },
        );
        CLIENTS_CONNECTED.set(sessions.len() as i64);
        debug!(client_id = %id, clients = sessions.len(), "Client registered");
        id
    }

    /// Remove a session. Called synchronously on socket close or error.
    pub fn deregister(&self, id: Uuid) -> bool {
        let mut sessions = self.sessions.write();
        let removed = sessions.remove(&id).is_some();
        CLIENTS_CONNECTED.set(sessions.len() as i64);
        if removed {
            debug!(client_id = %id, clients = sessions.len(), "Client deregistered");
        }
        removed
    }

    /// Add a subscription key to a session. Idempotent: re-adding an
    /// existing key changes nothing. Returns false if the session is gone.
    pub fn subscribe(&self, id: Uuid, key: SubscriptionKey) -> bool {
        let mut sessions = self.sessions.write();
        match sessions.get_mut(&id) {
            Some(session) => {
                session.keys.insert(key);
                true
            }
            None => false,
        }
    }

    /// Remove a subscription key. Removing an absent key is a no-op, not an
    /// error. Returns false if the session is gone.
    pub fn unsubscribe(&self, id: Uuid, key: &SubscriptionKey) -> bool {
        let mut sessions = self.sessions.write();
        match sessions.get_mut(&id) {
            Some(session) => {
                session.keys.remove(key);
                true
            }
            None => false,
        }
    }

    /// Number of subscription keys a session currently holds.
    pub fn subscription_count(&self, id: Uuid) -> Option<usize> {
        self.sessions.read().get(&id).map(|s| s.keys.len())
    }

    pub fn client_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Queue a message to one client. Returns false if the session is gone
    /// or its socket writer stopped.
    pub fn send_to(&self, id: Uuid, message: ServerMessage) -> bool {
        let sessions = self.sessions.read();
        match sessions.get(&id) {
            Some(session) => session.tx.try_send(message).is_ok(),
            None => false,
        }
    }

    /// Fan one payload out to every session subscribed to
    /// `channel:symbol`. Returns the number of clients the frame was queued
    /// for.
    ///
    /// Best-effort: a session whose writer already stopped is skipped (it
    /// is about to be pruned by its socket task), and a full queue drops
    /// the frame for that client only.
    pub fn broadcast(&self, channel: &str, symbol: &str, payload: serde_json::Value) -> usize {
        let key = SubscriptionKey::new(channel, symbol);
        let sessions = self.sessions.read();
        let mut delivered = 0;

        for (id, session) in sessions.iter() {
            if !session.keys.contains(&key) {
                continue;
            }
            if session.tx.is_closed() {
                trace!(client_id = %id, "Skipping closed session awaiting prune");
                continue;
            }
            let message = ServerMessage::data(channel, symbol, payload.clone());
            match session.tx.try_send(message) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    trace!(client_id = %id, "Client queue full, frame dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    trace!(client_id = %id, "Client queue closed, frame dropped");
                }
            }
        }

        if delivered > 0 {
            FANOUT_DELIVERED_TOTAL.inc_by(delivered as u64);
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn session(registry: &ClientRegistry) -> (Uuid, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(CLIENT_QUEUE_DEPTH);
        (registry.register(tx), rx)
    }

    fn ticker_btc() -> SubscriptionKey {
        SubscriptionKey::new("ticker", "BTCUSDT")
    }

    #[test]
    fn test_subscribe_is_idempotent() {
        let registry = ClientRegistry::new();
        let (id, _rx) = session(&registry);

        assert!(registry.subscribe(id, ticker_btc()));
        assert!(registry.subscribe(id, ticker_btc()));
        assert_eq!(registry.subscription_count(id), Some(1));
    }

    #[test]
    fn test_unsubscribe_absent_key_is_noop() {
        let registry = ClientRegistry::new();
        let (id, _rx) = session(&registry);

        registry.subscribe(id, ticker_btc());
        assert!(registry.unsubscribe(id, &SubscriptionKey::new("kline", "ETHUSDT")));
        assert_eq!(registry.subscription_count(id), Some(1));
    }

    #[tokio::test]
    async fn test_fanout_reaches_only_matching_sessions() {
        let registry = ClientRegistry::new();
        let (a, mut rx_a) = session(&registry);
        let (b, mut rx_b) = session(&registry);

        registry.subscribe(a, SubscriptionKey::new("ticker", "BTCUSDT"));
        registry.subscribe(b, SubscriptionKey::new("ticker", "ETHUSDT"));

        let delivered = registry.broadcast("ticker", "BTCUSDT", json!({"last": "42000"}));
        assert_eq!(delivered, 1);

        match rx_a.recv().await.unwrap() {
            ServerMessage::Data {
                channel, symbol, ..
            } => {
                assert_eq!(channel, "ticker");
                assert_eq!(symbol, "BTCUSDT");
            }
            other => panic!("expected Data, got {other:?}"),
        }
        assert!(rx_b.try_recv().is_err(), "B is not subscribed to BTCUSDT");
    }

    #[tokio::test]
    async fn test_unsubscribed_session_stops_receiving() {
        let registry = ClientRegistry::new();
        let (a, mut rx_a) = session(&registry);

        registry.subscribe(a, ticker_btc());
        assert_eq!(registry.broadcast("ticker", "BTCUSDT", json!({})), 1);
        rx_a.recv().await.unwrap();

        registry.unsubscribe(a, &ticker_btc());
        assert_eq!(registry.broadcast("ticker", "BTCUSDT", json!({})), 0);
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_deregistered_session_is_pruned_from_fanout() {
        let registry = ClientRegistry::new();
        let (a, _rx_a) = session(&registry);
        registry.subscribe(a, ticker_btc());

        assert!(registry.deregister(a));
        assert_eq!(registry.client_count(), 0);

        // Broadcast after pruning: no delivery, no panic.
        assert_eq!(registry.broadcast("ticker", "BTCUSDT", json!({})), 0);
        assert!(!registry.send_to(a, ServerMessage::pong()));
    }

    #[tokio::test]
    async fn test_closed_queue_is_skipped_before_prune() {
        let registry = ClientRegistry::new();
        let (a, rx_a) = session(&registry);
        registry.subscribe(a, ticker_btc());

        // Socket writer gone but session not yet deregistered: the session
        // must be skipped, never sent to.
        drop(rx_a);
        assert_eq!(registry.broadcast("ticker", "BTCUSDT", json!({})), 0);
    }

    #[tokio::test]
    async fn test_full_queue_drops_frame_for_that_client_only() {
        let registry = ClientRegistry::new();
        let (slow_tx, _slow_rx) = mpsc::channel(1);
        let slow = registry.register(slow_tx);
        let (fast, mut fast_rx) = session(&registry);

        registry.subscribe(slow, ticker_btc());
        registry.subscribe(fast, ticker_btc());

        // First frame fills the slow client's queue of one.
        assert_eq!(registry.broadcast("ticker", "BTCUSDT", json!({"seq": 1})), 2);
        // Second frame: slow client's queue is full, fast still receives.
        assert_eq!(registry.broadcast("ticker", "BTCUSDT", json!({"seq": 2})), 1);

        fast_rx.recv().await.unwrap();
        fast_rx.recv().await.unwrap();
    }

    #[test]
    fn test_empty_symbol_key_routes() {
        let registry = ClientRegistry::new();
        let (tx, _rx) = mpsc::channel(CLIENT_QUEUE_DEPTH);
        let id = registry.register(tx);

        registry.subscribe(id, SubscriptionKey::new("balanceUpdate", ""));
        assert_eq!(registry.broadcast("balanceUpdate", "", json!({})), 1);
    }
}
