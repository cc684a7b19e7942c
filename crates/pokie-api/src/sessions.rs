use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use pokie_types::api::{Claims, CreateSessionRequest};

use crate::AppState;
use crate::error::ApiError;

pub async fn create_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .engine
        .create_session(&claims.sub, &req.name, req.timer_duration)
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let sessions = state.engine.list_sessions(&claims.sub).await?;
    Ok(Json(sessions))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = state.engine.get_session(&claims.sub, &session_id).await?;
    Ok(Json(detail))
}

pub async fn join_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.engine.join_session(&claims.sub, &session_id).await?;
    Ok(Json(session))
}
