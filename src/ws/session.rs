//! Stream server sessions.
//!
//! One read task per connected client. Outbound frames travel through a
//! bounded per-session queue drained by a writer task; a full queue means
//! the client cannot keep up, and the session is dropped. Market data is
//! lossy by design.

use axum::extract::ws::{Message, WebSocket};
use dashmap::DashMap;
use futures::stream::StreamExt;
use futures::SinkExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::WsState;
use crate::messages::{ClientRequest, StreamMethod};

/// Frames queued per session before it is considered too slow.
const OUTBOUND_BUFFER: usize = 64;

/// Live sessions, keyed by session id.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, mpsc::Sender<Message>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session_id: String, tx: mpsc::Sender<Message>) {
        self.sessions.insert(session_id, tx);
    }

    pub fn remove(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Queue a text frame for one session. Fails when the session is
    /// gone or its queue is full (too slow), in which case the caller
    /// drops the session.
    pub fn send_text(&self, session_id: &str, payload: String) -> Result<(), ()> {
        match self.sessions.get(session_id) {
            Some(tx) => tx.try_send(Message::Text(payload)).map_err(|_| ()),
            None => Err(()),
        }
    }
}

pub async fn handle_socket(socket: WebSocket, state: Arc<WsState>, token: Option<String>) {
    let session_id = state.session_id(token.as_deref());
    let (mut sink, mut stream) = socket.split();

    let (tx, mut rx) = mpsc::channel::<Message>(OUTBOUND_BUFFER);
    state.registry.insert(session_id.clone(), tx.clone());

    // Every session gets its private trades channel without asking.
    let private_channel = crate::broker::channels::private_trades_channel(&session_id);
    state.subscriptions.subscribe(&session_id, &private_channel);

    metrics::counter!("spotx_ws_sessions_total").increment(1);
    info!(%session_id, "stream session connected");

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    while let Some(received) = stream.next().await {
        match received {
            Ok(Message::Text(text)) => {
                let request: ClientRequest = match serde_json::from_str(&text) {
                    Ok(request) => request,
                    Err(e) => {
                        debug!(%session_id, error = %e, "ignoring malformed client frame");
                        continue;
                    }
                };
                match request.method {
                    StreamMethod::Subscribe => {
                        for channel in &request.params {
                            state.subscriptions.subscribe(&session_id, channel);
                        }
                    }
                    StreamMethod::Unsubscribe => {
                        for channel in &request.params {
                            state.subscriptions.unsubscribe(&session_id, channel);
                        }
                    }
                }
            }
            Ok(Message::Ping(data)) => {
                let _ = tx.try_send(Message::Pong(data));
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                // Resets without a close handshake are routine.
                warn!(%session_id, error = %e, "stream session read error");
                break;
            }
        }
    }

    state.registry.remove(&session_id);
    state.subscriptions.session_left(&session_id);
    writer.abort();
    info!(%session_id, "stream session disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_text_to_unknown_session_fails() {
        let registry = SessionRegistry::new();
        assert!(registry.send_text("nobody", "{}".to_string()).is_err());
    }

    #[tokio::test]
    async fn test_send_text_fails_when_queue_full() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = mpsc::channel::<Message>(1);
        registry.insert("slow".to_string(), tx);

        assert!(registry.send_text("slow", "a".to_string()).is_ok());
        // Queue of one is now full and nobody drains it.
        assert!(registry.send_text("slow", "b".to_string()).is_err());
    }

    #[tokio::test]
    async fn test_registry_insert_remove() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = mpsc::channel::<Message>(1);
        registry.insert("s1".to_string(), tx);
        assert_eq!(registry.len(), 1);
        registry.remove("s1");
        assert!(registry.is_empty());
    }
}
