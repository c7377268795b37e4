// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::future_not_send,
    clippy::redundant_pub_crate,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

//! Integration tests for real-time task fan-out over WebSocket.
//!
//! Each test starts its own in-process server on an OS-assigned port and
//! connects real WebSocket clients to `/ws`. These tests validate:
//! - every registered connection receives every published event
//! - events published by a client are rebroadcast to all clients
//! - a connection that fails is pruned and the others keep receiving
//! - a malformed inbound event closes only the offending connection
//! - all connections observe the same event order
//! - a connection only sees events dispatched after it joined

use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use taskboard_proto::codec;
use taskboard_proto::task::{Task, TaskId, TaskPriority, TaskStatus};
use taskboard_server::server::{ServerHandle, start_test_server};
use tokio_tungstenite::tungstenite;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// How long to wait for an expected frame before failing.
const RECV_TIMEOUT: Duration = Duration::from_secs(2);

// =============================================================================
// Helpers
// =============================================================================

async fn connect(handle: &ServerHandle) -> WsStream {
    let url = format!("ws://{}/ws", handle.addr);
    let (ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("websocket connect failed");
    ws
}

/// Connects `n` clients and waits until the server has registered them all.
async fn connect_many(handle: &ServerHandle, n: usize) -> Vec<WsStream> {
    let mut clients = Vec::with_capacity(n);
    for _ in 0..n {
        clients.push(connect(handle).await);
    }
    wait_for_members(handle, n).await;
    clients
}

/// Polls the registry until it has exactly `n` members.
async fn wait_for_members(handle: &ServerHandle, n: usize) {
    let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
    loop {
        let len = handle.state.registry.len().await;
        if len == n {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "registry has {len} members, expected {n}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Receives the next task event, skipping control frames.
async fn recv_task(ws: &mut WsStream) -> Task {
    tokio::time::timeout(RECV_TIMEOUT, async {
        loop {
            match ws.next().await {
                Some(Ok(tungstenite::Message::Text(text))) => {
                    return codec::decode(text.as_str()).expect("server sent a valid task");
                }
                Some(Ok(tungstenite::Message::Ping(_) | tungstenite::Message::Pong(_))) => {}
                other => panic!("expected task event, got {other:?}"),
            }
        }
    })
    .await
    .expect("timed out waiting for task event")
}

/// Asserts that no task event arrives within `wait`.
async fn assert_silent(ws: &mut WsStream, wait: Duration) {
    if let Ok(frame) = tokio::time::timeout(wait, ws.next()).await {
        panic!("expected no event, got {frame:?}");
    }
}

/// Waits until the server ends the connection.
async fn expect_closed(ws: &mut WsStream) {
    tokio::time::timeout(RECV_TIMEOUT, async {
        loop {
            match ws.next().await {
                None | Some(Err(_) | Ok(tungstenite::Message::Close(_))) => return,
                Some(Ok(tungstenite::Message::Text(text))) => {
                    panic!("expected connection to close, got event {text}")
                }
                Some(Ok(_)) => {}
            }
        }
    })
    .await
    .expect("connection was not closed");
}

async fn send_task(ws: &mut WsStream, task: &Task) {
    let text = codec::encode(task).unwrap();
    ws.send(tungstenite::Message::Text(text.into())).await.unwrap();
}

fn make_task(id: &str, status: TaskStatus) -> Task {
    let now = Utc::now();
    Task {
        id: TaskId::from(id),
        title: format!("task {id}"),
        description: "from a client".to_string(),
        status,
        priority: TaskPriority::Medium,
        due_date: Some(now),
        user_id: "test123".to_string(),
        created_at: now,
        updated_at: now,
        deleted: false,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn published_event_reaches_every_connection() {
    let handle = start_test_server().await.unwrap();
    let mut clients = connect_many(&handle, 3).await;

    let task = make_task("t1", TaskStatus::Todo);
    handle.state.broadcaster.publish(task.clone()).await.unwrap();

    for ws in &mut clients {
        assert_eq!(recv_task(ws).await, task);
    }
    handle.shutdown().await;
}

#[tokio::test]
async fn client_event_is_rebroadcast_to_all() {
    let handle = start_test_server().await.unwrap();
    let mut clients = connect_many(&handle, 2).await;

    let task = make_task("from-client", TaskStatus::Completed);
    send_task(&mut clients[0], &task).await;

    for ws in &mut clients {
        assert_eq!(recv_task(ws).await, task);
    }
    handle.shutdown().await;
}

#[tokio::test]
async fn failed_connection_is_pruned_and_others_keep_receiving() {
    let handle = start_test_server().await.unwrap();
    let mut clients = connect_many(&handle, 3).await;

    let created = make_task("t1", TaskStatus::Todo);
    handle.state.broadcaster.publish(created.clone()).await.unwrap();
    for ws in &mut clients {
        assert_eq!(recv_task(ws).await.status, TaskStatus::Todo);
    }

    // Connection 2 goes away without a close handshake.
    let second = clients.remove(1);
    drop(second);
    wait_for_members(&handle, 2).await;

    let mut updated = created.clone();
    updated.status = TaskStatus::InProgress;
    updated.updated_at = Utc::now();
    handle.state.broadcaster.publish(updated.clone()).await.unwrap();

    for ws in &mut clients {
        assert_eq!(recv_task(ws).await, updated);
    }
    assert_eq!(handle.state.registry.len().await, 2);
    handle.shutdown().await;
}

#[tokio::test]
async fn malformed_event_closes_only_that_connection() {
    let handle = start_test_server().await.unwrap();
    let mut bad = connect(&handle).await;
    let mut good = connect(&handle).await;
    wait_for_members(&handle, 2).await;

    bad.send(tungstenite::Message::Text("{\"id\":\"half a task\"}".into()))
        .await
        .unwrap();
    expect_closed(&mut bad).await;
    wait_for_members(&handle, 1).await;

    let task = make_task("after", TaskStatus::Todo);
    handle.state.broadcaster.publish(task.clone()).await.unwrap();
    assert_eq!(recv_task(&mut good).await, task);
    handle.shutdown().await;
}

#[tokio::test]
async fn all_connections_see_the_same_order() {
    let handle = start_test_server().await.unwrap();
    let mut clients = connect_many(&handle, 2).await;

    // Two producers interleave: the server and a client.
    let server_side = handle.state.broadcaster.clone();
    let producer = tokio::spawn(async move {
        for i in 0..25 {
            server_side
                .publish(make_task(&format!("s{i}"), TaskStatus::Todo))
                .await
                .unwrap();
        }
    });
    for i in 0..25 {
        send_task(&mut clients[0], &make_task(&format!("c{i}"), TaskStatus::Todo)).await;
    }
    producer.await.unwrap();

    let mut orders = Vec::new();
    for ws in &mut clients {
        let mut ids = Vec::with_capacity(50);
        for _ in 0..50 {
            ids.push(recv_task(ws).await.id.to_string());
        }
        orders.push(ids);
    }
    assert_eq!(orders[0], orders[1]);

    // Each producer's own events stay in publish order.
    let client_events: Vec<_> = orders[0].iter().filter(|id| id.starts_with('c')).collect();
    let expected: Vec<_> = (0..25).map(|i| format!("c{i}")).collect();
    assert_eq!(client_events, expected.iter().collect::<Vec<_>>());
    handle.shutdown().await;
}

#[tokio::test]
async fn late_joiner_only_sees_later_events() {
    let handle = start_test_server().await.unwrap();
    let mut early = connect_many(&handle, 1).await.remove(0);

    let first = make_task("before", TaskStatus::Todo);
    handle.state.broadcaster.publish(first.clone()).await.unwrap();
    assert_eq!(recv_task(&mut early).await, first);

    let mut late = connect(&handle).await;
    wait_for_members(&handle, 2).await;

    let second = make_task("after", TaskStatus::Todo);
    handle.state.broadcaster.publish(second.clone()).await.unwrap();
    assert_eq!(recv_task(&mut late).await, second);
    assert_eq!(recv_task(&mut early).await, second);
    handle.shutdown().await;
}

#[tokio::test]
async fn client_close_deregisters_connection() {
    let handle = start_test_server().await.unwrap();
    let mut ws = connect_many(&handle, 1).await.remove(0);

    ws.close(None).await.unwrap();
    wait_for_members(&handle, 0).await;
    handle.shutdown().await;
}

#[tokio::test]
async fn shutdown_closes_open_connections() {
    let handle = start_test_server().await.unwrap();
    let mut ws = connect_many(&handle, 1).await.remove(0);

    let registry = std::sync::Arc::clone(&handle.state.registry);
    handle.shutdown().await;
    expect_closed(&mut ws).await;
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn idle_connection_receives_nothing() {
    let handle = start_test_server().await.unwrap();
    let mut ws = connect_many(&handle, 1).await.remove(0);
    assert_silent(&mut ws, Duration::from_millis(200)).await;
    handle.shutdown().await;
}
