//! Server assembly: shared state, router, and listener startup.
//!
//! The connection registry and the broadcast channel are owned by
//! [`AppState`]. They are created when the server starts and dropped when it
//! stops, so every test can run its own isolated instance.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderValue, Method, header};
use axum::routing::get;
use taskboard_proto::task::Task;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::broadcast::{self, Broadcaster, EventQueue};
use crate::config::ServerConfig;
use crate::connection;
use crate::dispatcher::Dispatcher;
use crate::registry::ConnectionRegistry;
use crate::store::{StoreError, TaskStore};

/// Error type returned by server startup.
pub type StartError = Box<dyn std::error::Error + Send + Sync>;

/// State shared by every handler and connection.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Open WebSocket connections.
    pub registry: Arc<ConnectionRegistry>,
    /// Producer side of the broadcast channel.
    pub broadcaster: Broadcaster,
    /// Task records.
    pub store: Arc<TaskStore>,
    /// Per-connection outbound queue length.
    pub outbound_buffer: usize,
    /// Largest accepted inbound frame.
    pub max_frame_size: usize,
    /// Held from a mutation until its event is published.
    commit_order: Arc<Mutex<()>>,
}

impl AppState {
    /// Creates fresh state and returns it with the consumer side of its
    /// broadcast channel, which belongs to the [`Dispatcher`].
    #[must_use]
    pub fn new(config: &ServerConfig) -> (Self, EventQueue) {
        let (broadcaster, events) = broadcast::channel(config.channel_capacity);
        let state = Self {
            registry: Arc::new(ConnectionRegistry::new()),
            broadcaster,
            store: Arc::new(TaskStore::new()),
            outbound_buffer: config.outbound_buffer,
            max_frame_size: config.max_frame_size,
            commit_order: Arc::new(Mutex::new(())),
        };
        (state, events)
    }

    /// Runs a store mutation and publishes the task it returns.
    ///
    /// Mutations are serialized with their publish, so events reach the
    /// broadcast channel in the order the store committed them. A failed
    /// mutation publishes nothing.
    ///
    /// # Errors
    ///
    /// Returns the mutation's [`StoreError`].
    pub async fn commit<F>(&self, mutation: F) -> Result<Task, StoreError>
    where
        F: Future<Output = Result<Task, StoreError>>,
    {
        let _order = self.commit_order.lock().await;
        let task = mutation.await?;
        self.notify(task.clone()).await;
        Ok(task)
    }

    /// Publishes a task event after a successful mutation.
    ///
    /// The mutation has already been stored, so a stopped dispatcher is only
    /// logged.
    pub async fn notify(&self, task: Task) {
        if let Err(e) = self.broadcaster.publish(task).await {
            tracing::error!(task_id = %e.0.id, error = %e, "failed to publish task event");
        }
    }
}

/// Builds the HTTP router.
#[must_use]
pub fn router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/ws", get(connection::ws_handler))
        .route("/tasks", get(api::list_tasks).post(api::create_task))
        .route(
            "/tasks/{id}",
            get(api::get_task)
                .patch(api::update_task_status)
                .delete(api::delete_task),
        )
        .route("/health", get(api::health))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(allowed_origins))
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

/// A running server.
#[derive(Debug)]
pub struct ServerHandle {
    /// Address the listener is bound to.
    pub addr: SocketAddr,
    /// Shared state, for inspection and direct publishing.
    pub state: AppState,
    /// The HTTP server task.
    pub server: tokio::task::JoinHandle<()>,
    /// The dispatcher task.
    pub dispatcher: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    /// Closes every connection and stops the server and dispatcher.
    pub async fn shutdown(self) {
        let closed = self.state.registry.close_all().await;
        tracing::info!(closed, "server shutting down");
        self.server.abort();
        self.dispatcher.abort();
    }
}

/// Starts the server described by `config`.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the configured address.
pub async fn start_server(config: &ServerConfig) -> Result<ServerHandle, StartError> {
    let (state, events) = AppState::new(config);
    start_server_with_state(&config.bind_addr, state, events, &config.allowed_origins).await
}

/// Starts the server with pre-built state and spawns its dispatcher.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: AppState,
    events: EventQueue,
    allowed_origins: &[String],
) -> Result<ServerHandle, StartError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let dispatcher = Dispatcher::new(Arc::clone(&state.registry), events).spawn();

    let app = router(state.clone(), allowed_origins);
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "server error");
        }
    });

    Ok(ServerHandle {
        addr: bound_addr,
        state,
        server,
        dispatcher,
    })
}

/// Starts a server on `127.0.0.1:0` with default settings, for tests.
///
/// # Errors
///
/// Returns an error if the loopback listener cannot be bound.
pub async fn start_test_server() -> Result<ServerHandle, StartError> {
    let config = ServerConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        ..ServerConfig::default()
    };
    start_server(&config).await
}
