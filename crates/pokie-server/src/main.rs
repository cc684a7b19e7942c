mod config;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State, WebSocketUpgrade},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use pokie_api::error::ApiError;
use pokie_api::identity::{AuthError, JwtIdentity};
use pokie_api::{AppState, AppStateInner};
use pokie_engine::SessionEngine;
use pokie_types::api::Claims;
use pokie_gateway::{NotificationHub, connection};

use crate::config::Config;

#[derive(Deserialize)]
struct WsParams {
    token: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pokie=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(pokie_db::Database::open(&config.db_path)?);
    info!("Database ready at {}", config.db_path.display());

    // Shared state
    let hub = NotificationHub::new();
    let engine = SessionEngine::new(db, hub, config.store_timeout);
    let state: AppState = Arc::new(AppStateInner {
        engine,
        identity: JwtIdentity::new(config.jwt_secret.clone(), config.token_ttl),
    });

    let ws_route = Router::new()
        .route("/ws/{session_id}", get(ws_upgrade))
        .with_state(state.clone());

    let app = Router::new()
        .nest("/api/v1", pokie_api::router(state))
        .merge(ws_route)
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = config.addr()?;
    info!("Pokie server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Session event stream. The token travels in the query string since browsers
/// can't set headers on a WebSocket handshake. Auth and membership are settled
/// before the upgrade so failures come back as plain HTTP errors.
async fn ws_upgrade(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let claims = match subscriber_claims(&state, &params) {
        Ok(claims) => claims,
        Err(e) => return ApiError::from(e).into_response(),
    };
    if let Err(e) = state.engine.authorize_subscriber(&claims.sub, &session_id).await {
        debug!("Rejected subscriber {} for session {}: {}", claims.sub, session_id, e);
        return ApiError::from(e).into_response();
    }

    let hub = state.engine.hub().clone();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, hub, session_id, claims.sub))
}

fn subscriber_claims(state: &AppState, params: &WsParams) -> Result<Claims, AuthError> {
    let token = params.token.as_deref().ok_or(AuthError::MissingToken)?;
    state.identity.resolve(token)
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler unavailable ({}), waiting for Ctrl+C", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::*;

    fn state() -> AppState {
        let db = Arc::new(pokie_db::Database::open_in_memory().unwrap());
        let engine = SessionEngine::new(db, NotificationHub::new(), pokie_engine::DEFAULT_STORE_TIMEOUT);
        Arc::new(AppStateInner {
            engine,
            identity: JwtIdentity::new("ws-test-secret", chrono::Duration::minutes(30)),
        })
    }

    #[test]
    fn missing_ws_token_is_unauthorized() {
        let err = subscriber_claims(&state(), &WsParams { token: None }).unwrap_err();
        assert!(matches!(err, AuthError::MissingToken));
        assert_eq!(ApiError::from(err).status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn bad_ws_token_is_unauthorized() {
        let params = WsParams {
            token: Some("garbage".into()),
        };
        let err = subscriber_claims(&state(), &params).unwrap_err();
        assert_eq!(ApiError::from(err).status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn query_without_token_still_parses() {
        let Query(params) =
            Query::<WsParams>::try_from_uri(&"/ws/s1".parse().unwrap()).unwrap();
        assert!(params.token.is_none());
    }
}
