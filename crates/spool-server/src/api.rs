//! HTTP API over the task pool.
//!
//! - `POST /tasks` submits work, 202 with the freshly created record.
//! - `GET /tasks/{id}` fetches one record.
//! - `GET /tasks` lists all records, newest first.
//! - `GET /status` reports queue depth and in-flight count.

use std::str::FromStr;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::error;

use spool_core::domain::{SpoolError, TaskId};
use spool_core::TaskIngress;

use crate::ratelimit::{self, RateLimiter};

#[derive(Clone)]
pub struct AppState {
    pub ingress: TaskIngress,
}

pub fn router(state: AppState, limiter: Arc<RateLimiter>) -> Router {
    Router::new()
        .route("/tasks", post(create_task).get(list_tasks))
        .route("/tasks/{id}", get(get_task))
        .route("/status", get(pool_status))
        .layer(axum::middleware::from_fn_with_state(limiter, ratelimit::limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Error with a fixed status and a one-line JSON body.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<SpoolError> for ApiError {
    fn from(err: SpoolError) -> Self {
        match err {
            SpoolError::QueueSaturated => {
                Self::new(StatusCode::TOO_MANY_REQUESTS, "task queue is full")
            }
            SpoolError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, "task not found"),
            SpoolError::Conflict(_) => {
                Self::new(StatusCode::CONFLICT, "task was modified concurrently")
            }
            SpoolError::Store(detail) => {
                error!(%detail, "store failure surfaced to the API");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "message": self.message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl CreateTaskRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if self.title.is_empty() {
            return Err(ApiError::new(StatusCode::BAD_REQUEST, "title is required"));
        }
        if self.description.is_empty() {
            return Err(ApiError::new(
                StatusCode::BAD_REQUEST,
                "description is required",
            ));
        }
        Ok(())
    }
}

async fn create_task(
    State(state): State<AppState>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<Response, ApiError> {
    req.validate()?;
    let task = state.ingress.create_task(&req.title, &req.description).await?;
    Ok((StatusCode::ACCEPTED, Json(task)).into_response())
}

async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    // An unparseable id cannot name any record.
    let id = TaskId::from_str(&id)
        .map_err(|_| ApiError::new(StatusCode::NOT_FOUND, "task not found"))?;
    let task = state.ingress.get_task(id).await?;
    Ok(Json(task).into_response())
}

async fn list_tasks(State(state): State<AppState>) -> Result<Response, ApiError> {
    let tasks = state.ingress.list_tasks().await?;
    Ok(Json(json!({ "count": tasks.len(), "tasks": tasks })).into_response())
}

async fn pool_status(State(state): State<AppState>) -> Response {
    Json(state.ingress.status().await).into_response()
}
