//! Exchange WebSocket connection manager.
//!
//! Keeps exactly one live session to the exchange and recovers from drops
//! with linear backoff, bounded by `max_reconnect_attempts`. The connection
//! holds no subscription memory: after every reconnect the server-side
//! subscription state is empty, and the owner replays on `Connected`.

use crate::error::{StreamError, StreamResult};
use crate::frame::StreamCommand;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use relay_telemetry::metrics::{STREAM_CONNECTED, STREAM_RECONNECT_TOTAL};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex as TokioMutex};
use tokio_tungstenite::{connect_async_tls_with_config, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Connection configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StreamConfig {
    /// Exchange WebSocket URL.
    pub url: String,
    /// Reconnect attempts before giving up.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Base delay for linear reconnect backoff.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// How long a session must stay open before the reconnect counter
    /// resets. A session that opens and drops sooner keeps accumulating
    /// attempts, so a flapping endpoint still reaches the terminal state.
    #[serde(default = "default_min_stable_open_ms")]
    pub min_stable_open_ms: u64,
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_delay_ms() -> u64 {
    5_000
}

fn default_min_stable_open_ms() -> u64 {
    30_000
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            min_stable_open_ms: default_min_stable_open_ms(),
        }
    }
}

/// Connection state. Owned exclusively by the connection; other components
/// only read it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

/// Lifecycle events emitted to the owning process.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Session opened. Server-side subscription state is empty; the owner
    /// must replay every wanted subscription now.
    Connected,
    /// Session dropped; a reconnect may follow.
    Disconnected { reason: String },
    /// Terminal: the reconnect budget is spent. No further attempts.
    ReconnectFailed { attempts: u32 },
}

/// Exchange WebSocket connection manager.
pub struct StreamConnection {
    config: StreamConfig,
    state: Arc<RwLock<ConnectionState>>,
    reconnect_attempt: Arc<RwLock<u32>>,
    /// Lifecycle events to the owner.
    event_tx: mpsc::Sender<StreamEvent>,
    /// Decoded-JSON inbound frames to the router.
    frame_tx: mpsc::Sender<serde_json::Value>,
    /// Outbound command sender (for StreamWriteHandle).
    outbound_tx: mpsc::Sender<String>,
    /// Outbound command receiver (consumed by the session loop).
    outbound_rx: Arc<TokioMutex<mpsc::Receiver<String>>>,
    next_command_id: Arc<AtomicU64>,
    /// True while a connect loop is running, including its backoff sleeps.
    connect_active: Arc<AtomicBool>,
    shutdown_token: CancellationToken,
}

impl StreamConnection {
    pub fn new(
        config: StreamConfig,
        event_tx: mpsc::Sender<StreamEvent>,
        frame_tx: mpsc::Sender<serde_json::Value>,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(100);
        Self {
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            reconnect_attempt: Arc::new(RwLock::new(0)),
            event_tx,
            frame_tx,
            outbound_tx,
            outbound_rx: Arc::new(TokioMutex::new(outbound_rx)),
            next_command_id: Arc::new(AtomicU64::new(0)),
            connect_active: Arc::new(AtomicBool::new(false)),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Get a cloneable write handle for subscription commands.
    pub fn write_handle(&self) -> StreamWriteHandle {
        StreamWriteHandle {
            tx: self.outbound_tx.clone(),
            state: self.state.clone(),
            next_id: self.next_command_id.clone(),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Current reconnect attempt counter.
    pub fn reconnect_attempt(&self) -> u32 {
        *self.reconnect_attempt.read()
    }

    /// Signal graceful shutdown. Cancels any pending reconnect delay and
    /// closes the session with a Close frame.
    pub fn shutdown(&self) {
        info!("Stream connection shutdown requested");
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Connect and run until shutdown or the reconnect budget is spent.
    ///
    /// No-op while a connect loop is already running, whether its session
    /// is open, being established or waiting out a backoff: at most one
    /// connection attempt is ever in flight.
    pub async fn connect(&self) -> StreamResult<()> {
        if self.connect_active.swap(true, Ordering::SeqCst) {
            debug!("connect() ignored, connection loop already running");
            return Ok(());
        }

        let result = self.connect_with_retry().await;
        self.connect_active.store(false, Ordering::SeqCst);
        result
    }

    async fn connect_with_retry(&self) -> StreamResult<()> {
        loop {
            if self.is_shutdown() {
                *self.state.write() = ConnectionState::Disconnected;
                return Ok(());
            }

            *self.state.write() = ConnectionState::Connecting;

            let session_result = self.run_session().await;
            *self.state.write() = ConnectionState::Disconnected;
            STREAM_CONNECTED.set(0.0);

            let reason = match session_result {
                Ok(()) => {
                    // Clean exit only happens on shutdown.
                    info!("Exchange stream closed");
                    return Ok(());
                }
                Err(e) => {
                    error!(error = %e, "Exchange stream session ended");
                    e.to_string()
                }
            };

            let _ = self
                .event_tx
                .send(StreamEvent::Disconnected {
                    reason: reason.clone(),
                })
                .await;

            if self.is_shutdown() {
                return Ok(());
            }

            // Bounded linear backoff: delay * 1, * 2, ... up to the cap.
            let attempt = {
                let mut counter = self.reconnect_attempt.write();
                if *counter >= self.config.max_reconnect_attempts {
                    None
                } else {
                    *counter += 1;
                    Some(*counter)
                }
            };

            let Some(attempt) = attempt else {
                let attempts = self.config.max_reconnect_attempts;
                error!(attempts, "Reconnect budget spent, giving up");
                let _ = self
                    .event_tx
                    .send(StreamEvent::ReconnectFailed { attempts })
                    .await;
                return Err(StreamError::ReconnectFailed { attempts });
            };

            STREAM_RECONNECT_TOTAL.inc();
            let delay =
                Duration::from_millis(self.config.reconnect_delay_ms * u64::from(attempt));
            warn!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");

            // Cancellation-aware sleep: shutdown must not wait out the backoff.
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown during reconnect backoff");
                    *self.state.write() = ConnectionState::Disconnected;
                    return Ok(());
                }
            }
        }
    }

    /// One WebSocket session: connect, announce, pump until it drops.
    async fn run_session(&self) -> StreamResult<()> {
        info!(url = %self.config.url, "Connecting to exchange stream");

        let (ws_stream, _response) =
            connect_async_tls_with_config(&self.config.url, None, true, None).await?;
        let (mut write, mut read) = ws_stream.split();

        *self.state.write() = ConnectionState::Open;
        STREAM_CONNECTED.set(1.0);
        info!("Exchange stream open");

        let _ = self.event_tx.send(StreamEvent::Connected).await;

        // Flap guard: the reconnect counter resets only after the session
        // has stayed open for the stability floor.
        let stable = tokio::time::sleep(Duration::from_millis(self.config.min_stable_open_ms));
        tokio::pin!(stable);
        let mut counter_reset = false;

        loop {
            let outbound_recv = async { self.outbound_rx.lock().await.recv().await };

            tokio::select! {
                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received in stream loop");
                    *self.state.write() = ConnectionState::Closing;
                    if let Err(e) = write.send(Message::Close(None)).await {
                        warn!(error = %e, "Failed to send Close frame during shutdown");
                    }
                    return Ok(());
                }

                () = &mut stable, if !counter_reset => {
                    counter_reset = true;
                    *self.reconnect_attempt.write() = 0;
                    debug!(
                        stable_ms = self.config.min_stable_open_ms,
                        "Session stable, reconnect counter reset"
                    );
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_frame(&text).await;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            warn!(code, %reason, "Exchange closed the stream");
                            return Err(StreamError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "Stream read error");
                            return Err(e.into());
                        }
                        None => {
                            warn!("Stream ended");
                            return Err(StreamError::ConnectionClosed {
                                code: 1006,
                                reason: "Stream ended".to_string(),
                            });
                        }
                        _ => {}
                    }
                }

                outbound = outbound_recv => {
                    if let Some(text) = outbound {
                        write.send(Message::Text(text)).await?;
                    }
                }
            }
        }
    }

    /// Parse one inbound text frame. Malformed frames are logged and
    /// dropped; they never affect connection state.
    async fn handle_frame(&self, text: &str) {
        match serde_json::from_str::<serde_json::Value>(text) {
            Ok(value) => {
                if self.frame_tx.send(value).await.is_err() {
                    warn!("Frame receiver dropped");
                }
            }
            Err(e) => {
                warn!(error = %e, "Malformed stream frame dropped");
            }
        }
    }
}

/// Cloneable handle for sending subscription commands.
///
/// Sending while the session is not open fails fast with
/// [`StreamError::NotOpen`]; commands are never queued across reconnects.
#[derive(Clone)]
pub struct StreamWriteHandle {
    tx: mpsc::Sender<String>,
    state: Arc<RwLock<ConnectionState>>,
    next_id: Arc<AtomicU64>,
}

impl StreamWriteHandle {
    pub fn is_open(&self) -> bool {
        *self.state.read() == ConnectionState::Open && !self.tx.is_closed()
    }

    /// Subscribe to the given stream ids. Returns the command id.
    pub async fn subscribe(&self, stream_ids: Vec<String>) -> StreamResult<u64> {
        self.send_command(StreamCommand::subscribe, stream_ids).await
    }

    /// Unsubscribe from the given stream ids. Returns the command id.
    pub async fn unsubscribe(&self, stream_ids: Vec<String>) -> StreamResult<u64> {
        self.send_command(StreamCommand::unsubscribe, stream_ids)
            .await
    }

    async fn send_command(
        &self,
        build: fn(Vec<String>, u64) -> StreamCommand,
        stream_ids: Vec<String>,
    ) -> StreamResult<u64> {
        if !self.is_open() {
            return Err(StreamError::NotOpen);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let command = build(stream_ids, id);
        let text = serde_json::to_string(&command)?;

        self.tx.send(text).await.map_err(|_| StreamError::NotOpen)?;
        debug!(id, method = %command.method, "Stream command queued");
        Ok(id)
    }
}
