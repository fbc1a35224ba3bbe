//! Live WebSocket connections and the registry that owns them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use relay_core::{ConnectionId, Envelope};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A connected WebSocket client.
pub struct Connection {
    id: ConnectionId,
    /// Send channel to the socket's writer task.
    tx: mpsc::Sender<String>,
    connected: AtomicBool,
    /// Cancelled exactly once, when the connection goes away.
    closed: CancellationToken,
}

impl Connection {
    fn new(id: ConnectionId, tx: mpsc::Sender<String>) -> Self {
        Self {
            id,
            tx,
            connected: AtomicBool::new(true),
            closed: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Queue a frame for the client.
    ///
    /// Returns `false` if the queue is full or the socket is gone; the frame is dropped.
    pub fn emit(&self, envelope: &Envelope) -> bool {
        let json = match envelope.to_json() {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(connection_id = %self.id, error = %e, "Failed to encode frame");
                return false;
            }
        };
        match self.tx.try_send(json) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(msg)) => {
                tracing::warn!(
                    connection_id = %self.id,
                    msg_len = msg.len(),
                    "Send queue full, dropping frame"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Resolves once the connection has been torn down.
    pub async fn disconnected(&self) {
        self.closed.cancelled().await;
    }

    pub(crate) fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    pub(crate) fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Relaxed);
        self.closed.cancel();
    }
}

/// Registry of all connected WebSocket clients.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<Connection>>,
    max_send_queue: usize,
}

impl ConnectionRegistry {
    pub fn new(max_send_queue: usize) -> Self {
        Self {
            connections: DashMap::new(),
            max_send_queue: max_send_queue.max(1),
        }
    }

    /// Register a new connection and return it with the receiving end of its send queue.
    pub fn register(&self) -> (Arc<Connection>, mpsc::Receiver<String>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        let connection = Arc::new(Connection::new(id.clone(), tx));
        let _ = self.connections.insert(id, Arc::clone(&connection));
        (connection, rx)
    }

    /// Remove a connection and fire its disconnect signal.
    pub fn unregister(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        let (_, connection) = self.connections.remove(id)?;
        connection.mark_disconnected();
        Some(connection)
    }

    /// Resolve a caller-supplied id to a live connection.
    pub fn get(&self, id: &str) -> Option<Arc<Connection>> {
        self.connections
            .get(&ConnectionId::from_raw(id))
            .map(|entry| Arc::clone(entry.value()))
            .filter(|c| c.is_connected())
    }

    /// Ids of every live connection, sorted.
    pub fn ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|entry| entry.value().is_connected())
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Tear down every connection. Returns how many were closed.
    pub fn close_all(&self) -> usize {
        let ids: Vec<ConnectionId> = self.connections.iter().map(|e| e.key().clone()).collect();
        ids.iter().filter(|id| self.unregister(id).is_some()).count()
    }
}
