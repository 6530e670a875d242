//! Mock exchange WebSocket server for integration tests.
//!
//! Accepts connections, records subscription commands, acknowledges them
//! Binance-style, and pushes arbitrary frames to every connected client.
//! A configurable number of initial connections can be closed right after
//! the handshake to exercise reconnect behavior.

use futures_util::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};

pub struct MockExchangeServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    messages: Arc<Mutex<VecDeque<String>>>,
    connections: Arc<Mutex<u32>>,
    push_tx: broadcast::Sender<String>,
}

impl MockExchangeServer {
    /// Start a server that keeps every connection alive.
    pub async fn start() -> Self {
        Self::start_flaky(0).await
    }

    /// Start a server that closes the first `close_first` connections
    /// immediately after the handshake.
    pub async fn start_flaky(close_first: u32) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let messages: Arc<Mutex<VecDeque<String>>> = Arc::new(Mutex::new(VecDeque::new()));
        let connections: Arc<Mutex<u32>> = Arc::new(Mutex::new(0));
        let (push_tx, _) = broadcast::channel::<String>(64);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let messages_clone = messages.clone();
        let connections_clone = connections.clone();
        let push_tx_clone = push_tx.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        let index = {
                            let mut count = connections_clone.lock().await;
                            *count += 1;
                            *count
                        };
                        let close_now = index <= close_first;
                        let messages = messages_clone.clone();
                        let push_rx = push_tx_clone.subscribe();
                        tokio::spawn(handle_connection(stream, messages, push_rx, close_now));
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            messages,
            connections,
            push_tx,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub async fn connection_count(&self) -> u32 {
        *self.connections.lock().await
    }

    pub async fn received_messages(&self) -> Vec<String> {
        self.messages.lock().await.iter().cloned().collect()
    }

    /// Push one raw text frame to every connected client.
    pub fn push_frame(&self, text: impl Into<String>) {
        let _ = self.push_tx.send(text.into());
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn handle_connection(
    stream: TcpStream,
    messages: Arc<Mutex<VecDeque<String>>>,
    mut push_rx: broadcast::Receiver<String>,
    close_now: bool,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {e}");
            return;
        }
    };

    let (mut write, mut read) = ws_stream.split();

    if close_now {
        let _ = write.send(Message::Close(None)).await;
        return;
    }

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        {
                            let mut msgs = messages.lock().await;
                            msgs.push_back(text.clone());
                        }
                        // Acknowledge subscription commands by id.
                        if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&text) {
                            if parsed.get("method").and_then(|m| m.as_str()).is_some() {
                                let ack = serde_json::json!({
                                    "result": null,
                                    "id": parsed.get("id").cloned().unwrap_or(serde_json::Value::Null),
                                });
                                let _ = write.send(Message::Text(ack.to_string())).await;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
            frame = push_rx.recv() => {
                match frame {
                    Ok(text) => {
                        if write.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        }
    }
}
