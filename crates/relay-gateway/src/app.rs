//! Main application orchestration.
//!
//! Wires the single exchange stream connection into the event router, the
//! router's bus into the client hub, and owns the shutdown sequence. The
//! signed REST executor is constructed here and handed to the HTTP route
//! layer, which lives outside this process core.

use crate::config::AppConfig;
use crate::error::AppResult;
use relay_core::Credentials;
use relay_hub::{run_fanout, run_server, ClientRegistry};
use relay_rest::SignedRequestExecutor;
use relay_stream::{EventRouter, StreamConnection, StreamEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Main application.
pub struct Application {
    config: AppConfig,
    registry: Arc<ClientRegistry>,
    router: Arc<EventRouter>,
    connection: Arc<StreamConnection>,
    executor: Arc<SignedRequestExecutor>,
    stream_events: mpsc::Receiver<StreamEvent>,
    frames: Option<mpsc::Receiver<serde_json::Value>>,
    shutdown: CancellationToken,
}

impl Application {
    pub fn new(config: AppConfig, credentials: Credentials) -> AppResult<Self> {
        let (event_tx, stream_events) = mpsc::channel(32);
        let (frame_tx, frames) = mpsc::channel(256);

        let connection = Arc::new(StreamConnection::new(
            config.stream.clone(),
            event_tx,
            frame_tx,
        ));
        let executor = Arc::new(SignedRequestExecutor::new(config.rest.clone(), credentials)?);

        Ok(Self {
            config,
            registry: Arc::new(ClientRegistry::new()),
            router: Arc::new(EventRouter::new()),
            connection,
            executor,
            stream_events,
            frames: Some(frames),
            shutdown: CancellationToken::new(),
        })
    }

    /// The signed executor, for the HTTP route layer.
    pub fn executor(&self) -> Arc<SignedRequestExecutor> {
        self.executor.clone()
    }

    /// Run until ctrl-c or a terminal stream failure.
    pub async fn run(mut self) -> AppResult<()> {
        // Startup sanity check against the exchange clock.
        match self.executor.server_time().await {
            Ok(server_time) => {
                let drift_ms = chrono::Utc::now().timestamp_millis() - server_time;
                info!(server_time, drift_ms, "Exchange REST reachable");
            }
            Err(e) => {
                warn!(error = %e, "Exchange REST not reachable at startup");
            }
        }

        // Router: decoded frames -> typed events on the bus.
        let router = self.router.clone();
        let frames = self.frames.take().expect("run() called once");
        tokio::spawn(async move { router.run(frames).await });

        // Hub: bus events -> subscribed clients.
        tokio::spawn(run_fanout(self.registry.clone(), self.router.subscribe()));
        let hub_task = tokio::spawn(run_server(
            self.registry.clone(),
            self.config.hub.clone(),
            self.shutdown.clone(),
        ));

        // The one exchange stream connection for this process.
        let connection = self.connection.clone();
        let stream_task = tokio::spawn(async move { connection.connect().await });

        info!(
            subscriptions = self.config.subscriptions.len(),
            hub_port = self.config.hub.port,
            "Gateway running"
        );

        loop {
            tokio::select! {
                event = self.stream_events.recv() => {
                    match event {
                        Some(StreamEvent::Connected) => {
                            info!("Exchange stream connected");
                            self.replay_subscriptions().await;
                        }
                        Some(StreamEvent::Disconnected { reason }) => {
                            warn!(%reason, "Exchange stream disconnected");
                        }
                        Some(StreamEvent::ReconnectFailed { attempts }) => {
                            // Terminal. Not retried further; an operator has
                            // to look at this.
                            error!(
                                attempts,
                                "Exchange stream unavailable, shutting down"
                            );
                            break;
                        }
                        None => {
                            warn!("Stream event channel closed");
                            break;
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        self.shutdown_all(stream_task, hub_task).await
    }

    /// Replay every wanted upstream subscription. Called on each connect,
    /// because the exchange session starts with no subscription state.
    async fn replay_subscriptions(&self) {
        let stream_ids = self.config.upstream_stream_ids();
        if stream_ids.is_empty() {
            return;
        }

        let handle = self.connection.write_handle();
        match handle.subscribe(stream_ids).await {
            Ok(id) => info!(command_id = id, "Upstream subscriptions replayed"),
            Err(e) => warn!(error = %e, "Failed to replay subscriptions"),
        }
    }

    /// Orderly shutdown, bounded by the force-exit timer: clients get a
    /// normal closure, the exchange connection closes, and anything still
    /// in flight after the grace period is abandoned.
    async fn shutdown_all(
        self,
        stream_task: tokio::task::JoinHandle<relay_stream::StreamResult<()>>,
        hub_task: tokio::task::JoinHandle<relay_hub::HubResult<()>>,
    ) -> AppResult<()> {
        info!("Shutting down");
        self.shutdown.cancel();
        self.connection.shutdown();

        let grace = Duration::from_millis(self.config.shutdown_grace_ms);
        let drained = tokio::time::timeout(grace, async {
            let _ = stream_task.await;
            let _ = hub_task.await;
        })
        .await;

        if drained.is_err() {
            warn!(
                grace_ms = self.config.shutdown_grace_ms,
                "Shutdown grace expired, abandoning in-flight work"
            );
        }

        info!("Gateway stopped");
        Ok(())
    }
}
