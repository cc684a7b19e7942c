use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use pokie_types::api::{Claims, CreateStoryRequest, StatusResponse, SubmitVoteRequest, VoteListing};

use crate::AppState;
use crate::error::ApiError;

/// Host only.
pub async fn create_story(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateStoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let story = state
        .engine
        .create_story(&claims.sub, &session_id, &req.title, req.description.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(story)))
}

/// Host only.
pub async fn start_voting(
    State(state): State<AppState>,
    Path((session_id, story_id)): Path<(String, String)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .engine
        .start_voting(&claims.sub, &session_id, &story_id)
        .await?;
    Ok(Json(StatusResponse::success()))
}

/// Any member. The response echoes the caller's own stored vote.
pub async fn submit_vote(
    State(state): State<AppState>,
    Path((session_id, story_id)): Path<(String, String)>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SubmitVoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let value = req.value.map(|v| v.into_string());
    let vote = state
        .engine
        .submit_vote(&claims.sub, &session_id, &story_id, value)
        .await?;
    Ok(Json(vote))
}

/// Host only.
pub async fn reveal_votes(
    State(state): State<AppState>,
    Path((session_id, story_id)): Path<(String, String)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let reveal = state
        .engine
        .reveal_votes(&claims.sub, &session_id, &story_id)
        .await?;
    Ok(Json(VoteListing::Revealed {
        votes: reveal.votes,
        final_estimate: reveal.story.final_estimate,
    }))
}

pub async fn list_votes(
    State(state): State<AppState>,
    Path((session_id, story_id)): Path<(String, String)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let listing = state
        .engine
        .list_votes(&claims.sub, &session_id, &story_id)
        .await?;
    Ok(Json(listing))
}
