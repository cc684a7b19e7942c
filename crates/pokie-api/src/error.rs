use axum::{Json, http::StatusCode, response::{IntoResponse, Response}};
use tracing::error;

use pokie_engine::EngineError;
use pokie_types::api::ErrorResponse;

use crate::identity::AuthError;

/// Anything a handler can fail with, mapped to a status code and a JSON
/// `{"error": ...}` body.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::Engine(e) => match e {
                EngineError::NotFound(_) => StatusCode::NOT_FOUND,
                EngineError::Forbidden(_) => StatusCode::FORBIDDEN,
                EngineError::InvalidState(_) => StatusCode::CONFLICT,
                EngineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                EngineError::StoreTimeout => StatusCode::SERVICE_UNAVAILABLE,
                EngineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Store and internal failures are logged, not echoed to clients
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {:#}", self);
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
