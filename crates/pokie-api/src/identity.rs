use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};

use pokie_types::api::Claims;
use pokie_types::models::User;

/// Why a request could not be tied to a user.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("invalid or expired token")]
    InvalidToken,
}

/// HS256 bearer tokens: resolves a token to the caller's identity, and
/// issues tokens for the development login endpoint.
#[derive(Clone)]
pub struct JwtIdentity {
    secret: String,
    ttl: chrono::Duration,
}

impl JwtIdentity {
    pub fn new(secret: impl Into<String>, ttl: chrono::Duration) -> Self {
        Self {
            secret: secret.into(),
            ttl,
        }
    }

    pub fn issue(&self, user: &User) -> anyhow::Result<String> {
        let claims = Claims {
            sub: user.id.clone(),
            name: user.display_name.clone(),
            exp: (chrono::Utc::now() + self.ttl).timestamp() as usize,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?;

        Ok(token)
    }

    pub fn resolve(&self, token: &str) -> Result<Claims, AuthError> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| AuthError::InvalidToken)?;

        Ok(token_data.claims)
    }
}
