pub mod auth;
pub mod error;
pub mod identity;
pub mod middleware;
pub mod sessions;
pub mod stories;

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use pokie_engine::SessionEngine;

use crate::identity::JwtIdentity;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub engine: SessionEngine,
    pub identity: JwtIdentity,
}

/// REST routes, unprefixed. The binary nests them under `/api/v1`.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/token", post(auth::issue_token))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/me", get(auth::me).put(auth::rename_me))
        .route("/sessions", post(sessions::create_session).get(sessions::list_sessions))
        .route("/sessions/{session_id}", get(sessions::get_session))
        .route("/sessions/{session_id}/join", post(sessions::join_session))
        .route("/sessions/{session_id}/stories", post(stories::create_story))
        .route(
            "/sessions/{session_id}/stories/{story_id}/start-voting",
            post(stories::start_voting),
        )
        .route("/sessions/{session_id}/stories/{story_id}/vote", post(stories::submit_vote))
        .route(
            "/sessions/{session_id}/stories/{story_id}/reveal-votes",
            post(stories::reveal_votes),
        )
        .route("/sessions/{session_id}/stories/{story_id}/votes", get(stories::list_votes))
        .layer(axum_middleware::from_fn_with_state(state.clone(), middleware::require_auth))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}
