use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::warn;
use uuid::Uuid;

use super::jwt::{is_expired, JwtKeys, TokenKind};
use crate::error::AppError;

/// Caller identity taken from a valid `Authorization: Bearer <access token>`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
}

pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::unauthorized("Unauthorized: No token provided"))?;

        let token = bearer_token(header)
            .ok_or_else(|| AppError::unauthorized("Unauthorized: Invalid authorization header"))?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify(token).map_err(|e| {
            if is_expired(&e) {
                AppError::unauthorized(
                    "Unauthorized: Token expired, login again or use the refresh token endpoint",
                )
            } else {
                warn!(error = %e, "invalid bearer token");
                AppError::unauthorized("Unauthorized: Invalid token")
            }
        })?;

        if claims.kind != TokenKind::Access {
            return Err(AppError::unauthorized("Unauthorized: Access token required"));
        }

        Ok(AuthUser {
            id: claims.sub,
            email: claims.email,
        })
    }
}
