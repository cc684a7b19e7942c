use axum::{Extension, Json, extract::State, response::IntoResponse};
use tracing::info;

use pokie_types::api::{Claims, RenameRequest, TokenRequest, TokenResponse};

use crate::AppState;
use crate::error::ApiError;

/// POST /auth/token: get-or-create the user by display name and issue a
/// bearer token. Stands in for a real identity provider during development.
pub async fn issue_token(
    State(state): State<AppState>,
    Json(req): Json<TokenRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.engine.ensure_user(&req.name).await?;
    let access_token = state.identity.issue(&user)?;

    info!("Issued token for {} ({})", user.display_name, user.id);
    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".into(),
        user_id: user.id,
    }))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.engine.get_user(&claims.sub).await?;
    Ok(Json(user))
}

pub async fn rename_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RenameRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.engine.rename_user(&claims.sub, &req.display_name).await?;
    Ok(Json(user))
}
