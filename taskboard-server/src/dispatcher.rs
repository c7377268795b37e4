//! The dispatcher: sole consumer of the broadcast channel and the only place
//! where fan-out happens.
//!
//! Events are drained one at a time, so every connection that is a member
//! when an event is dispatched sees events in the same relative order. A
//! member that cannot accept an event is removed from the registry and its
//! connection closed; delivery to the remaining members carries on.

use std::sync::Arc;

use axum::extract::ws::Message;
use taskboard_proto::codec;
use taskboard_proto::task::Task;

use crate::broadcast::EventQueue;
use crate::registry::{ConnectionId, ConnectionRegistry};

/// Outcome of fanning out a single event.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    /// Number of connections the event was queued for.
    pub delivered: usize,
    /// Connections removed because delivery failed.
    pub pruned: Vec<ConnectionId>,
}

/// Drains the broadcast channel and fans each event out to the registry.
#[derive(Debug)]
pub struct Dispatcher {
    registry: Arc<ConnectionRegistry>,
    events: EventQueue,
}

impl Dispatcher {
    /// Creates a dispatcher over the given registry and event queue.
    #[must_use]
    pub const fn new(registry: Arc<ConnectionRegistry>, events: EventQueue) -> Self {
        Self { registry, events }
    }

    /// Runs the dispatch loop on a new tokio task.
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Dispatches events until every producer has gone away.
    pub async fn run(mut self) {
        tracing::info!("dispatcher started");
        while let Some(task) = self.events.consume().await {
            let report = dispatch(&self.registry, &task).await;
            tracing::debug!(
                task_id = %task.id,
                delivered = report.delivered,
                pruned = report.pruned.len(),
                "event dispatched"
            );
        }
        tracing::info!("broadcast channel closed, dispatcher stopping");
    }
}

/// Delivers one event to every member of a registry snapshot.
///
/// The event is encoded once. Members whose outbound queue is closed or full
/// are deregistered (which closes their connection) and reported in
/// [`DispatchReport::pruned`].
pub async fn dispatch(registry: &ConnectionRegistry, task: &Task) -> DispatchReport {
    let text = match codec::encode(task) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(task_id = %task.id, error = %e, "failed to encode task event");
            return DispatchReport::default();
        }
    };
    let frame = Message::Text(text.into());

    let mut report = DispatchReport::default();
    for (conn_id, handle) in registry.snapshot().await {
        match handle.try_deliver(frame.clone()) {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                tracing::warn!(
                    conn_id = %conn_id,
                    task_id = %task.id,
                    error = %e,
                    "delivery failed, dropping connection"
                );
                registry.deregister(conn_id).await;
                report.pruned.push(conn_id);
            }
        }
    }
    report
}
