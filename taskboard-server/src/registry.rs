//! Registry of open WebSocket connections.
//!
//! Every upgraded connection gets a [`ConnectionId`] and a bounded outbound
//! queue. The registry keeps the sending half ([`ConnectionHandle`]) so the
//! dispatcher can fan events out; the connection's writer task owns the
//! receiving half ([`Outbox`]) and forwards whatever arrives to the socket.
//!
//! Removing a member also closes its handle, which makes the writer stop and
//! close the socket even if events are still buffered.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::Message;
use tokio::sync::{Notify, RwLock, mpsc};

/// Process-unique identifier of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Why an event could not be handed to a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The writer task has stopped (socket write failed or peer went away).
    #[error("connection closed")]
    Closed,
    /// The peer is not draining its queue fast enough.
    #[error("outbound buffer full")]
    Full,
}

/// Sending half of a connection's outbound queue.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    outbound: mpsc::Sender<Message>,
    shutdown: Arc<Notify>,
}

impl ConnectionHandle {
    /// Queues a frame for the connection without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Closed`] if the writer is gone, or
    /// [`DeliveryError::Full`] if the queue is at capacity.
    pub fn try_deliver(&self, msg: Message) -> Result<(), DeliveryError> {
        self.outbound.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Tells the writer to stop immediately, discarding buffered frames.
    pub fn close(&self) {
        self.shutdown.notify_one();
    }

    /// Returns `true` once the writer side has gone away.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}

/// Receiving half of a connection's outbound queue, owned by its writer.
#[derive(Debug)]
pub struct Outbox {
    inbound: mpsc::Receiver<Message>,
    shutdown: Arc<Notify>,
}

impl Outbox {
    /// Waits for the next frame to write.
    ///
    /// Returns `None` when the connection has been closed through its handle
    /// or every handle has been dropped.
    pub async fn next(&mut self) -> Option<Message> {
        tokio::select! {
            biased;
            () = self.shutdown.notified() => None,
            msg = self.inbound.recv() => msg,
        }
    }
}

/// Creates the paired handle and outbox for a new connection.
#[must_use]
pub fn connection_channel(buffer: usize) -> (ConnectionHandle, Outbox) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    let shutdown = Arc::new(Notify::new());
    (
        ConnectionHandle {
            outbound: tx,
            shutdown: Arc::clone(&shutdown),
        },
        Outbox {
            inbound: rx,
            shutdown,
        },
    )
}

/// Set of currently open connections.
///
/// Thread-safe via [`RwLock`]. Reader loops add and remove themselves
/// concurrently while the dispatcher takes snapshots; no lock is held while
/// events are being delivered.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, ConnectionHandle>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands out a fresh connection identifier.
    pub fn allocate_id(&self) -> ConnectionId {
        ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Adds a connection. Registering an id that is already present keeps a
    /// single member, using the newer handle.
    ///
    /// Returns `true` if the id was not yet a member.
    pub async fn register(&self, id: ConnectionId, handle: ConnectionHandle) -> bool {
        let mut conns = self.connections.write().await;
        conns.insert(id, handle).is_none()
    }

    /// Removes a connection and closes its handle.
    ///
    /// Removing an absent id is a no-op. Returns `true` if it was a member.
    pub async fn deregister(&self, id: ConnectionId) -> bool {
        let removed = self.connections.write().await.remove(&id);
        removed.is_some_and(|handle| {
            handle.close();
            true
        })
    }

    /// Returns the members at this instant.
    pub async fn snapshot(&self) -> Vec<(ConnectionId, ConnectionHandle)> {
        let conns = self.connections.read().await;
        conns
            .iter()
            .map(|(id, handle)| (*id, handle.clone()))
            .collect()
    }

    /// Returns `true` if `id` is currently a member.
    #[cfg(test)]
    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.connections.read().await.contains_key(&id)
    }

    /// Number of members.
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Returns `true` if nobody is connected.
    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    /// Sends a close frame to every member and empties the registry.
    ///
    /// A member whose queue cannot take the close frame is closed through its
    /// handle instead, discarding whatever it still has buffered.
    ///
    /// Returns the number of connections that were closed.
    pub async fn close_all(&self) -> usize {
        let drained: Vec<_> = self.connections.write().await.drain().collect();
        for (id, handle) in &drained {
            tracing::info!(conn_id = %id, "closing connection");
            if let Err(e) = handle.try_deliver(Message::Close(None)) {
                tracing::debug!(conn_id = %id, error = %e, "close frame not queued, closing handle");
                handle.close();
            }
        }
        drained.len()
    }
}
