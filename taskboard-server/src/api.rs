//! REST handlers for the task collection.
//!
//! Every successful mutation publishes the post-mutation task to the
//! broadcast channel after the store has accepted it; failed mutations
//! publish nothing.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use taskboard_proto::task::{Task, TaskId, TaskStatus};

use crate::server::AppState;
use crate::store::{NewTask, StoreError};

/// Errors surfaced to HTTP clients as `{"error": "..."}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request was malformed or failed validation.
    #[error("{0}")]
    BadRequest(String),
    /// The addressed task does not exist.
    #[error("{0}")]
    NotFound(String),
}

impl ApiError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => Self::NotFound("Task not found".to_string()),
            StoreError::Invalid(reason) => Self::BadRequest(reason),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self::BadRequest(format!("Invalid request payload: {}", e.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        Self::BadRequest(e.body_text())
    }
}

/// Query string of `GET /tasks`.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Owner whose tasks are listed.
    pub user_id: Option<String>,
}

/// Body of `PATCH /tasks/{id}`.
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    /// The new status.
    pub status: TaskStatus,
}

/// Plain acknowledgement body.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageBody {
    /// Human-readable outcome.
    pub message: String,
}

/// Body of `GET /health`.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthBody {
    /// Always `"ok"` while the server is answering.
    pub status: String,
    /// Open WebSocket connections.
    pub connections: usize,
    /// Events waiting for the dispatcher.
    pub pending_events: usize,
    /// Stored tasks.
    pub tasks: usize,
}

/// `POST /tasks`
pub async fn create_task(
    State(state): State<AppState>,
    body: Result<Json<NewTask>, JsonRejection>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let Json(new) = body?;
    let task = state.commit(state.store.create(new)).await?;
    tracing::info!(task_id = %task.id, user_id = %task.user_id, "task created");
    Ok((StatusCode::CREATED, Json(task)))
}

/// `GET /tasks?user_id=`
pub async fn list_tasks(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let Query(query) = query?;
    let user_id = query
        .user_id
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("User ID is required".to_string()))?;
    Ok(Json(state.store.list_for_user(&user_id).await))
}

/// `GET /tasks/{id}`
pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    Ok(Json(state.store.get(&TaskId::from(id)).await?))
}

/// `PATCH /tasks/{id}`
pub async fn update_task_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<Task>, ApiError> {
    let Json(update) = body?;
    let id = TaskId::from(id);
    let task = state
        .commit(state.store.update_status(&id, update.status))
        .await?;
    tracing::info!(task_id = %task.id, status = %task.status, "task status updated");
    Ok(Json(task))
}

/// `DELETE /tasks/{id}`
pub async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageBody>, ApiError> {
    let id = TaskId::from(id);
    let tombstone = state.commit(state.store.delete(&id)).await?;
    tracing::info!(task_id = %tombstone.id, "task deleted");
    Ok(Json(MessageBody {
        message: "Task deleted successfully".to_string(),
    }))
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthBody> {
    Json(HealthBody {
        status: "ok".to_string(),
        connections: state.registry.len().await,
        pending_events: state.broadcaster.pending(),
        tasks: state.store.len().await,
    })
}
