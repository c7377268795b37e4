//! Per-connection WebSocket handling: upgrade, reader loop, writer loop.
//!
//! Connection lifecycle: `Connecting → Open → Closed`.
//! 1. `GET /ws` is upgraded; a failed upgrade never creates a connection.
//! 2. The connection is registered and two tasks start: a writer that drains
//!    the connection's [`Outbox`] into the socket, and a reader that decodes
//!    each inbound frame as a [`Task`] and republishes it.
//! 3. The first read failure, write failure, or close from either side ends
//!    both tasks. The connection is deregistered and never reopened; the
//!    client has to establish a new one.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use taskboard_proto::codec::{self, CodecError};
use taskboard_proto::task::Task;

use crate::broadcast::{Broadcaster, PublishError};
use crate::registry::{ConnectionId, Outbox, connection_channel};
use crate::server::AppState;

/// Why a reader loop stopped, other than an orderly close by the peer.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// The transport reported an error (network failure, protocol violation,
    /// oversized frame).
    #[error("transport error: {0}")]
    Transport(#[from] axum::Error),
    /// The frame did not decode as a task.
    #[error("malformed task event: {0}")]
    Malformed(#[from] CodecError),
    /// The dispatcher is gone, so events can no longer be forwarded.
    #[error(transparent)]
    Broadcast(#[from] PublishError),
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let limit = state.max_frame_size;
    ws.max_frame_size(limit)
        .max_message_size(limit)
        .on_failed_upgrade(|e| tracing::warn!(error = %e, "websocket upgrade failed"))
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// Runs one upgraded connection until it closes.
pub async fn handle_socket(socket: WebSocket, state: AppState) {
    let (ws_sender, mut ws_receiver) = socket.split();

    let conn_id = state.registry.allocate_id();
    let (handle, outbox) = connection_channel(state.outbound_buffer);
    state.registry.register(conn_id, handle).await;
    let members = state.registry.len().await;
    tracing::info!(conn_id = %conn_id, members, "connection open");

    let mut write_task = tokio::spawn(write_loop(conn_id, ws_sender, outbox));

    let broadcaster = state.broadcaster.clone();
    let mut read_task =
        tokio::spawn(async move { read_loop(conn_id, &mut ws_receiver, &broadcaster).await });

    // Wait for either task to finish, then abort the other.
    tokio::select! {
        result = &mut read_task => {
            write_task.abort();
            match result {
                Ok(Ok(())) => tracing::info!(conn_id = %conn_id, "peer closed connection"),
                Ok(Err(e)) => tracing::warn!(conn_id = %conn_id, error = %e, "read failed"),
                Err(e) => tracing::error!(conn_id = %conn_id, error = %e, "reader task failed"),
            }
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    state.registry.deregister(conn_id).await;
    tracing::info!(conn_id = %conn_id, "connection closed and deregistered");
}

/// Reads task events from a connection and republishes each one.
///
/// Returns `Ok(())` when the peer closes the connection (close frame or end
/// of stream), and an error on the first frame that cannot be read or
/// decoded. Ping and pong frames are skipped; the transport answers pings.
///
/// # Errors
///
/// Returns [`ReadError`] describing the failure that ended the loop.
pub async fn read_loop<S>(
    conn_id: ConnectionId,
    receiver: &mut S,
    broadcaster: &Broadcaster,
) -> Result<(), ReadError>
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    while let Some(frame) = receiver.next().await {
        let task = match frame? {
            Message::Text(text) => codec::decode(text.as_str())?,
            Message::Binary(data) => codec::decode_bytes(&data)?,
            Message::Close(_) => {
                tracing::debug!(conn_id = %conn_id, "received close frame");
                return Ok(());
            }
            Message::Ping(_) | Message::Pong(_) => continue,
        };
        forward(conn_id, task, broadcaster).await?;
    }
    Ok(())
}

async fn forward(
    conn_id: ConnectionId,
    task: Task,
    broadcaster: &Broadcaster,
) -> Result<(), PublishError> {
    tracing::debug!(conn_id = %conn_id, task_id = %task.id, "forwarding client event");
    broadcaster.publish(task).await
}

/// Writes queued frames to the socket until the outbox closes or a write
/// fails, then closes the socket.
pub async fn write_loop<S>(conn_id: ConnectionId, mut sender: S, mut outbox: Outbox)
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    while let Some(msg) = outbox.next().await {
        let closing = matches!(msg, Message::Close(_));
        if let Err(e) = sender.send(msg).await {
            tracing::warn!(conn_id = %conn_id, error = %e, "websocket write failed");
            return;
        }
        if closing {
            break;
        }
    }
    let _ = sender.close().await;
}
