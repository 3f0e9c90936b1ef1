use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Utc;
use serde::Deserialize;

use super::backend::{LocalBackend, RequestTable};
use super::models::*;
use super::roles::{Role, RoleAssignment, RoleStore};
use super::ws::ws_handler;
use crate::errors::BoardError;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub backend: LocalBackend,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct DepartmentRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct AssignRoleRequest {
    pub role: String,
}

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<BoardError> for ApiError {
    fn from(err: BoardError) -> Self {
        match &err {
            BoardError::RequestNotFound { .. } => ApiError::NotFound(err.to_string()),
            BoardError::AlreadyCompleted { .. } => ApiError::Conflict(err.to_string()),
            e if e.is_validation() => ApiError::BadRequest(err.to_string()),
            _ => {
                tracing::error!(error = %err, "request failed");
                ApiError::Internal(err.to_string())
            }
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/time", get(server_time))
        .route(
            "/api/requests",
            get(list_requests).post(create_request).delete(reset_board),
        )
        .route(
            "/api/requests/{id}",
            get(get_request).patch(update_request).delete(delete_request),
        )
        .route(
            "/api/departments",
            get(list_departments).post(ensure_department),
        )
        .route("/api/analytics/departments", get(department_downtime))
        .route("/api/users/{id}/role", get(get_role).put(assign_role))
        .route("/ws", get(ws_handler))
        .route("/health", get(health_check))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn server_time() -> Json<ServerTime> {
    Json(ServerTime { now: Utc::now() })
}

async fn list_requests(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let requests = state.backend.fetch_all().await?;
    Ok(Json(requests))
}

async fn create_request(
    State(state): State<SharedState>,
    Json(draft): Json<RequestDraft>,
) -> Result<impl IntoResponse, ApiError> {
    let request = state.backend.insert(draft).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

async fn get_request(
    State(state): State<SharedState>,
    Path(id): Path<RequestId>,
) -> Result<impl IntoResponse, ApiError> {
    match state.backend.get(id).await? {
        Some(request) => Ok(Json(request)),
        None => Err(BoardError::RequestNotFound { id }.into()),
    }
}

async fn update_request(
    State(state): State<SharedState>,
    Path(id): Path<RequestId>,
    Json(patch): Json<RequestPatch>,
) -> Result<impl IntoResponse, ApiError> {
    if patch.is_empty() {
        return Err(ApiError::BadRequest("Patch has no fields".into()));
    }
    let request = state.backend.update(id, patch).await?;
    Ok(Json(request))
}

async fn delete_request(
    State(state): State<SharedState>,
    Path(id): Path<RequestId>,
) -> Result<impl IntoResponse, ApiError> {
    state.backend.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn reset_board(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    state.backend.delete_all().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_departments(
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, ApiError> {
    let departments = state.backend.list_departments().await?;
    Ok(Json(departments))
}

async fn ensure_department(
    State(state): State<SharedState>,
    Json(req): Json<DepartmentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(BoardError::MissingField("name").into());
    }
    let (department, created) = state
        .backend
        .db()
        .call(move |db| db.ensure_department(&name, Utc::now()))
        .await
        .map_err(BoardError::from_storage)?;
    let status = if created {
        tracing::info!(name = %department.name, "department created");
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(department)))
}

async fn department_downtime(
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = state.backend.department_downtime().await?;
    Ok(Json(rows))
}

async fn get_role(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    match state.backend.role_for(&user_id).await? {
        Some(role) => Ok(Json(RoleAssignment::new(user_id, role))),
        None => Err(ApiError::NotFound(format!(
            "No role assigned to user {}",
            user_id
        ))),
    }
}

async fn assign_role(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
    Json(req): Json<AssignRoleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let role = Role::from_str(&req.role)?;
    state.backend.assign_role(&user_id, role).await?;
    tracing::info!(user = %user_id, role = %role, "role assigned");
    Ok(Json(RoleAssignment::new(user_id, role)))
}
