//! HTTP request handlers

use super::types::{
    AssignmentRequest, BackendsResponse, ErrorResponse, InputRequest, SelectQuery, SelectRequest,
    SelectResponse, SessionResponse,
};
use super::AppState;
use crate::runtime::SessionError;
use crate::state_machine::TransitionError;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Session lifecycle
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_session))
        // Worker actions
        .route("/api/sessions/:id/input", post(submit_input))
        .route("/api/sessions/:id/select", post(select_response))
        .route("/api/sessions/:id/assignment", post(set_assignment))
        // Backend info
        .route("/api/backends", get(list_backends))
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Sessions
// ============================================================

async fn create_session(State(state): State<AppState>) -> Json<SessionResponse> {
    let session = state.manager.create_session().await;
    Json((&session).into())
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, AppError> {
    let session = state.manager.get(&id).await?;
    Ok(Json((&session).into()))
}

// ============================================================
// Worker Actions
// ============================================================

async fn submit_input(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<InputRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    if req.text.trim().is_empty() {
        return Err(AppError::BadRequest("Input text is empty".to_string()));
    }

    let session = state.manager.submit_input(&id, &req.text).await?;
    Ok(Json((&session).into()))
}

async fn select_response(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<SelectQuery>,
    Json(req): Json<SelectRequest>,
) -> Result<Json<SelectResponse>, AppError> {
    let (outcome, session) = state
        .manager
        .select_response(&id, &req.response, query.assignment_id.as_deref())
        .await?;

    Ok(Json(SelectResponse {
        turn: outcome.turn,
        finalized: outcome.finalized,
        persisted: outcome.persisted,
        session: (&session).into(),
    }))
}

async fn set_assignment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AssignmentRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    let session = state
        .manager
        .set_assignment_id(&id, &req.assignment_id)
        .await?;
    Ok(Json((&session).into()))
}

// ============================================================
// Backend Info
// ============================================================

async fn list_backends(State(state): State<AppState>) -> Json<BackendsResponse> {
    Json(BackendsResponse {
        backends: state.manager.backend_ids(),
        turn_budget: state.manager.turn_budget(),
    })
}

async fn get_version() -> &'static str {
    concat!("rlhf-collect ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
    Generation { message: String, retryable: bool },
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        let message = err.to_string();
        match err {
            SessionError::NotFound(_) => AppError::NotFound(message),
            SessionError::Transition(TransitionError::InvalidSelection) => {
                AppError::BadRequest(message)
            }
            SessionError::Transition(_) | SessionError::SessionBusy => AppError::Conflict(message),
            SessionError::Generation(e) => AppError::Generation {
                retryable: e.is_retryable(),
                message,
            },
            SessionError::Persistence(_) => {
                tracing::error!(error = %message, "Session record could not be persisted");
                AppError::Internal(message)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ErrorResponse::new(msg)),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorResponse::new(msg)),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, ErrorResponse::new(msg)),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorResponse::new(msg)),
            AppError::Generation { message, retryable } => {
                let status = if retryable {
                    StatusCode::SERVICE_UNAVAILABLE
                } else {
                    StatusCode::BAD_GATEWAY
                };
                let body = ErrorResponse {
                    retryable: Some(retryable),
                    ..ErrorResponse::new(message)
                };
                (status, body)
            }
        };

        (status, Json(body)).into_response()
    }
}
