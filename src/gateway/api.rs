//! REST API handlers for chat sessions.
//!
//! `/api/*` routes require `Authorization: Bearer <token>` when a gateway
//! token is configured. `/health` is always open.

use super::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

use crate::agent::TurnError;
use crate::sessions::{SessionError, SessionHandle};

// ── Errors ──────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized: send Authorization: Bearer <token>")]
    Unauthorized,

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("turn cancelled: session closed")]
    Cancelled,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = match &self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::SessionNotFound(_) | ApiError::Session(SessionError::NotFound { .. }) => {
                StatusCode::NOT_FOUND
            }
            ApiError::Session(SessionError::UnknownPersona { .. }) | ApiError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Session(SessionError::RegistryFull { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Cancelled => StatusCode::CONFLICT,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (code, body).into_response()
    }
}

impl From<TurnError> for ApiError {
    fn from(e: TurnError) -> Self {
        match e {
            TurnError::EmptyQuery => ApiError::BadRequest(e.to_string()),
            TurnError::Cancelled => ApiError::Cancelled,
        }
    }
}

// ── Bearer token auth ───────────────────────────────────────────

/// Extract bearer token from Authorization header.
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
}

/// Verify the bearer token when one is configured.
fn require_auth(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = state.bearer_token.as_ref() else {
        return Ok(());
    };

    match extract_bearer_token(headers) {
        Some(token) if expected.matches(token) => Ok(()),
        _ => Err(ApiError::Unauthorized),
    }
}

fn session_handle(state: &AppState, sid: &str) -> Result<Arc<SessionHandle>, ApiError> {
    state
        .registry
        .get(sid)
        .ok_or_else(|| ApiError::SessionNotFound(sid.to_string()))
}

// ── Request bodies ──────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct PinBody {
    pub persona: String,
}

#[derive(Deserialize)]
pub struct MessageBody {
    pub text: String,
}

// ── Handlers ────────────────────────────────────────────────────

/// GET /health
pub async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "sessions": state.registry.len(),
        "provider": state.runner.provider_name(),
    }))
}

/// GET /api/personas
pub async fn handle_personas(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_auth(&state, &headers)?;

    let personas: Vec<serde_json::Value> = state
        .runner
        .personas()
        .iter()
        .map(|p| {
            serde_json::json!({
                "name": p.name,
                "description": p.description,
                "icon": p.icon,
                "color": p.color,
            })
        })
        .collect();

    Ok(Json(serde_json::json!({ "personas": personas })))
}

/// POST /api/sessions
pub async fn handle_create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    require_auth(&state, &headers)?;

    let (_, handle) = state.registry.create()?;
    let snapshot = handle.state.lock().await.snapshot(state.recent_limit);
    Ok((StatusCode::CREATED, Json(snapshot)).into_response())
}

/// GET /api/sessions/{sid}
pub async fn handle_get_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(sid): Path<String>,
) -> Result<Response, ApiError> {
    require_auth(&state, &headers)?;

    let handle = session_handle(&state, &sid)?;
    let snapshot = handle.state.lock().await.snapshot(state.recent_limit);
    Ok(Json(snapshot).into_response())
}

/// DELETE /api/sessions/{sid}: drop the session and cancel its in-flight turn.
pub async fn handle_delete_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(sid): Path<String>,
) -> Result<StatusCode, ApiError> {
    require_auth(&state, &headers)?;

    if state.registry.remove(&sid) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::SessionNotFound(sid))
    }
}

/// GET /api/sessions/{sid}/conversations?limit=n
pub async fn handle_list_conversations(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(sid): Path<String>,
    Query(params): Query<ListQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_auth(&state, &headers)?;

    let handle = session_handle(&state, &sid)?;
    let limit = params.limit.unwrap_or(state.recent_limit);
    let conversations = handle.state.lock().await.recent_summaries(limit);
    Ok(Json(serde_json::json!({ "conversations": conversations })))
}

/// POST /api/sessions/{sid}/conversations: save the current chat, start a new one.
pub async fn handle_new_conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(sid): Path<String>,
) -> Result<Response, ApiError> {
    require_auth(&state, &headers)?;

    let handle = session_handle(&state, &sid)?;
    let mut session = handle.state.lock().await;
    session.start_new_conversation();
    Ok((StatusCode::CREATED, Json(session.snapshot(state.recent_limit))).into_response())
}

/// POST /api/sessions/{sid}/conversations/{cid}/load
pub async fn handle_load_conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((sid, cid)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    require_auth(&state, &headers)?;

    let handle = session_handle(&state, &sid)?;
    let mut session = handle.state.lock().await;
    session.load_conversation(&cid)?;
    Ok(Json(session.snapshot(state.recent_limit)).into_response())
}

/// POST /api/sessions/{sid}/pin
pub async fn handle_pin(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(sid): Path<String>,
    Json(body): Json<PinBody>,
) -> Result<Response, ApiError> {
    require_auth(&state, &headers)?;

    let handle = session_handle(&state, &sid)?;
    let mut session = handle.state.lock().await;
    session.pin_agent(body.persona.trim(), state.runner.personas())?;
    Ok(Json(session.snapshot(state.recent_limit)).into_response())
}

/// DELETE /api/sessions/{sid}/pin
pub async fn handle_unpin(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(sid): Path<String>,
) -> Result<Response, ApiError> {
    require_auth(&state, &headers)?;

    let handle = session_handle(&state, &sid)?;
    let mut session = handle.state.lock().await;
    session.unpin_agent();
    Ok(Json(session.snapshot(state.recent_limit)).into_response())
}

/// POST /api/sessions/{sid}/clear
pub async fn handle_clear(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(sid): Path<String>,
) -> Result<Response, ApiError> {
    require_auth(&state, &headers)?;

    let handle = session_handle(&state, &sid)?;
    let mut session = handle.state.lock().await;
    session.clear_conversation();
    Ok(Json(session.snapshot(state.recent_limit)).into_response())
}

/// POST /api/sessions/{sid}/messages: run one chat turn.
///
/// Backend failures still return 200; the reply carries the error text and
/// `turn.error` is set.
pub async fn handle_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(sid): Path<String>,
    Json(body): Json<MessageBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_auth(&state, &headers)?;

    let handle = session_handle(&state, &sid)?;
    let mut session = handle.state.lock().await;
    let report = state
        .runner
        .run(&mut session, &body.text, &handle.cancel)
        .await?;

    Ok(Json(serde_json::json!({
        "turn": report,
        "session": session.snapshot(state.recent_limit),
    })))
}
