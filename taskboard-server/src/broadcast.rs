//! The ordered broadcast channel between task producers and the dispatcher.
//!
//! Producers (REST mutation handlers and connection reader loops) hold a
//! cloneable [`Broadcaster`]; the single [`Dispatcher`](crate::dispatcher::Dispatcher)
//! owns the [`EventQueue`]. The queue is bounded: when it is full, `publish`
//! waits for room instead of dropping the event.

use taskboard_proto::task::Task;
use tokio::sync::mpsc;

/// Returned by [`Broadcaster::publish`] once the dispatcher has shut down.
#[derive(Debug, thiserror::Error)]
#[error("broadcast channel closed, dispatcher is not running")]
pub struct PublishError(pub Task);

/// Creates a broadcast channel holding up to `capacity` pending events.
#[must_use]
pub fn channel(capacity: usize) -> (Broadcaster, EventQueue) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (Broadcaster { tx }, EventQueue { rx })
}

/// Producer side of the broadcast channel.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    tx: mpsc::Sender<Task>,
}

impl Broadcaster {
    /// Enqueues a task event for fan-out.
    ///
    /// Events from one producer are consumed in the order they were
    /// published. Waits while the channel is full.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] carrying the task back if the consumer side
    /// has been dropped.
    pub async fn publish(&self, task: Task) -> Result<(), PublishError> {
        self.tx.send(task).await.map_err(|e| PublishError(e.0))
    }

    /// Number of events waiting for the dispatcher.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

/// Consumer side of the broadcast channel.
#[derive(Debug)]
pub struct EventQueue {
    rx: mpsc::Receiver<Task>,
}

impl EventQueue {
    /// Waits for the next event.
    ///
    /// Returns `None` once every [`Broadcaster`] has been dropped and the
    /// queue is drained.
    pub async fn consume(&mut self) -> Option<Task> {
        self.rx.recv().await
    }
}
