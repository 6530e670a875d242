//! Client-facing WebSocket server.
//!
//! One axum route upgrades dashboard clients onto the hub. Each connection
//! gets a reader loop (protocol dispatch) and a writer task (outbound queue
//! drain); the registry is the single owner of session state.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::stream::StreamExt;
use futures_util::SinkExt;
use relay_core::SubscriptionKey;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::HubConfig;
use crate::error::HubResult;
use crate::protocol::{ClientRequest, ServerMessage, SubscriptionRequest};
use crate::registry::{ClientRegistry, CLIENT_QUEUE_DEPTH};

/// Connection limiter to prevent too many concurrent WebSocket connections.
pub struct ConnectionLimiter {
    current: AtomicUsize,
    max: usize,
}

impl ConnectionLimiter {
    pub fn new(max: usize) -> Self {
        Self {
            current: AtomicUsize::new(0),
            max,
        }
    }

    pub fn try_acquire(&self) -> Option<ConnectionGuard<'_>> {
        loop {
            let current = self.current.load(Ordering::Acquire);
            if current >= self.max {
                return None;
            }
            if self
                .current
                .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(ConnectionGuard { limiter: self });
            }
        }
    }

    pub fn current_count(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }
}

pub struct ConnectionGuard<'a> {
    limiter: &'a ConnectionLimiter,
}

impl Drop for ConnectionGuard<'_> {
    fn drop(&mut self) {
        self.limiter.current.fetch_sub(1, Ordering::Release);
    }
}

/// Shared state for axum handlers.
#[derive(Clone)]
pub struct HubState {
    registry: Arc<ClientRegistry>,
    limiter: Arc<ConnectionLimiter>,
    shutdown: CancellationToken,
}

impl HubState {
    pub fn new(
        registry: Arc<ClientRegistry>,
        config: &HubConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            limiter: Arc::new(ConnectionLimiter::new(config.max_connections)),
            shutdown,
        }
    }
}

/// Create the axum router.
pub fn create_router(state: HubState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state)
}

/// WebSocket upgrade handler.
async fn ws_handler(State(state): State<HubState>, ws: WebSocketUpgrade) -> Response {
    // Reject over-limit upgrades before the handshake completes. The slot
    // is re-acquired inside the connection handler, which owns its guard.
    match state.limiter.try_acquire() {
        Some(guard) => drop(guard),
        None => {
            warn!(
                current = state.limiter.current_count(),
                "WebSocket connection limit reached"
            );
            return (StatusCode::SERVICE_UNAVAILABLE, "Too many connections").into_response();
        }
    }

    ws.on_upgrade(move |socket| handle_client(socket, state))
}

/// Handle one client connection from welcome to prune.
async fn handle_client(socket: WebSocket, state: HubState) {
    let _guard = match state.limiter.try_acquire() {
        Some(guard) => guard,
        None => {
            warn!("Connection limit reached during upgrade");
            return;
        }
    };

    let (mut sink, mut reader) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(CLIENT_QUEUE_DEPTH);

    let client_id = state.registry.register(tx);
    info!(client_id = %client_id, clients = state.registry.client_count(), "Client connected");

    // Welcome goes through the queue so the writer task sends it first.
    state
        .registry
        .send_to(client_id, ServerMessage::connection(client_id));

    // Writer task: drain the outbound queue onto the socket. On shutdown,
    // close with a normal-closure code instead of just dropping the socket.
    let shutdown = state.shutdown.clone();
    let mut writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    let frame = CloseFrame {
                        code: close_code::NORMAL,
                        reason: "server shutting down".into(),
                    };
                    let _ = sink.send(Message::Close(Some(frame))).await;
                    break;
                }
                msg = rx.recv() => {
                    let Some(msg) = msg else { break };
                    let Ok(json) = serde_json::to_string(&msg) else { continue };
                    if sink.send(Message::Text(json.into())).await.is_err() {
                        debug!("Client send failed, writer stopping");
                        break;
                    }
                }
            }
        }
    });

    // Reader loop: protocol dispatch until the socket closes.
    loop {
        tokio::select! {
            msg = reader.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = dispatch(&state.registry, client_id, &text);
                        state.registry.send_to(client_id, reply);
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(client_id = %client_id, "Client sent close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        debug!(client_id = %client_id, error = %e, "Client receive error");
                        break;
                    }
                    None => break,
                    // Ping/pong handled by axum; binary frames ignored.
                    _ => {}
                }
            }
            _ = &mut writer => {
                debug!(client_id = %client_id, "Writer stopped, closing connection");
                break;
            }
        }
    }

    // Synchronous prune: a broadcast racing this removal either sees the
    // session (queued, writer gone, dropped) or does not see it at all.
    state.registry.deregister(client_id);
    info!(client_id = %client_id, clients = state.registry.client_count(), "Client disconnected");
}

/// Handle one inbound client message, producing exactly one reply.
///
/// Every failure mode answers with an `error` message and leaves the
/// connection open; the hub never punishes a client for a bad frame.
fn dispatch(registry: &ClientRegistry, client_id: Uuid, text: &str) -> ServerMessage {
    let request: ClientRequest = match serde_json::from_str(text) {
        Ok(request) => request,
        Err(e) => {
            debug!(client_id = %client_id, error = %e, "Malformed client message");
            return ServerMessage::error("Invalid message format");
        }
    };

    match request.msg_type.as_str() {
        "subscribe" => match serde_json::from_value::<SubscriptionRequest>(request.data) {
            Ok(sub) => {
                let key = SubscriptionKey::new(&sub.channel, &sub.symbol);
                let subscription = key.to_string();
                registry.subscribe(client_id, key);
                debug!(client_id = %client_id, %subscription, "Subscribed");
                ServerMessage::subscribed(&sub.channel, &sub.symbol, subscription)
            }
            Err(_) => ServerMessage::error("subscribe requires channel and symbol"),
        },
        "unsubscribe" => match serde_json::from_value::<SubscriptionRequest>(request.data) {
            Ok(sub) => {
                let key = SubscriptionKey::new(&sub.channel, &sub.symbol);
                let subscription = key.to_string();
                registry.unsubscribe(client_id, &key);
                debug!(client_id = %client_id, %subscription, "Unsubscribed");
                ServerMessage::unsubscribed(&sub.channel, &sub.symbol, subscription)
            }
            Err(_) => ServerMessage::error("unsubscribe requires channel and symbol"),
        },
        "ping" => ServerMessage::pong(),
        other => ServerMessage::error(format!("Unknown message type: {other}")),
    }
}

/// Run the hub server until the shutdown token fires.
pub async fn run_server(
    registry: Arc<ClientRegistry>,
    config: HubConfig,
    shutdown: CancellationToken,
) -> HubResult<()> {
    let state = HubState::new(registry, &config, shutdown.clone());
    let app = create_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(port = config.port, "Starting hub server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    Ok(())
}
