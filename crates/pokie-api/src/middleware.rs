use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::AppState;
use crate::error::ApiError;
use crate::identity::AuthError;

/// Resolve the bearer token once per request and hand the claims to the
/// handler as an extension.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .ok_or(AuthError::MissingToken)?;

    let claims = state.identity.resolve(token)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
