//! Real-time channel: fans normalized inbound events out to every connected
//! WebSocket client. Fire-and-forget, no replay for late subscribers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::server::AppState;
use crate::webhook::InboundEvent;

/// Name of the event carrying inbound page messages.
pub const INBOUND_EVENT: &str = "facebook-event";

const CHANNEL_CAPACITY: usize = 256;

/// Frame sent to clients: `{"event": "...", "data": {...}}`.
#[derive(Debug, Clone, Serialize)]
pub struct RelayFrame {
    pub event: &'static str,
    pub data: InboundEvent,
}

#[derive(Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<RelayFrame>,
    connections: Arc<AtomicUsize>,
}

impl Broadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Deliver an event to every currently subscribed client. Returns the
    /// number of subscribers it was handed to.
    pub fn broadcast(&self, event: InboundEvent) -> usize {
        let frame = RelayFrame {
            event: INBOUND_EVENT,
            data: event,
        };
        match self.tx.send(frame) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!("No real-time clients connected, event dropped");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RelayFrame> {
        self.tx.subscribe()
    }

    /// Number of open client sessions.
    pub fn connected(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    fn track(&self) -> ConnectionGuard {
        self.connections.fetch_add(1, Ordering::Relaxed);
        ConnectionGuard(self.connections.clone())
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

struct ConnectionGuard(Arc<AtomicUsize>);

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let broadcaster = state.broadcaster().clone();
    ws.on_upgrade(move |socket| run_session(socket, broadcaster))
}

async fn run_session(socket: WebSocket, broadcaster: Broadcaster) {
    let session_id = Uuid::new_v4();
    let mut rx = broadcaster.subscribe();
    let _guard = broadcaster.track();
    info!("Client connected to real-time channel: {}", session_id);

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            frame = rx.recv() => match frame {
                Ok(frame) => {
                    let json = match serde_json::to_string(&frame) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!("Failed to serialize real-time frame: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Client {} lagged, skipped {} events", session_id, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // Clients only listen on this channel.
                Some(Ok(_)) => {}
            },
        }
    }

    info!("Client disconnected from real-time channel: {}", session_id);
}
