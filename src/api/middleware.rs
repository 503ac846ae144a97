use crate::api::AppState;
use crate::domain::auth::AccessClaims;
use crate::error::AppError;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use std::convert::Infallible;

fn bearer_header(parts: &Parts) -> Option<&str> {
    parts.headers.get(header::AUTHORIZATION).and_then(|value| value.to_str().ok())
}

/// Extractor for handlers that require a valid access token.
#[derive(Debug)]
pub struct AuthUser {
    pub claims: AccessClaims,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        state
            .auth_service
            .authenticate_request(bearer_header(parts))
            .map(|claims| Self { claims })
            .ok_or(AppError::Auth)
    }
}

/// Extractor for handlers where a bearer is optional (logout). Never rejects.
#[derive(Debug)]
pub struct MaybeAuthUser(pub Option<AccessClaims>);

impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(Self(state.auth_service.authenticate_request(bearer_header(parts))))
    }
}
