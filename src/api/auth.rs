use crate::api::AppState;
use crate::api::middleware::{AuthUser, MaybeAuthUser};
use crate::api::schemas::auth::{
    LoginRequest, LoginResponse, LogoutRequest, RefreshRequest, SessionResponse, UserProfile,
};
use crate::domain::auth_session::{SessionMetadata, SessionTokens};
use crate::error::{AppError, Result};
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::{Json, response::IntoResponse};
use std::net::SocketAddr;

fn session_metadata(headers: &HeaderMap, addr: SocketAddr) -> SessionMetadata {
    SessionMetadata {
        device_info: headers.get(header::USER_AGENT).and_then(|v| v.to_str().ok()).map(ToString::to_string),
        ip_address: Some(addr.ip().to_string()),
    }
}

pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse> {
    let email = payload.email.ok_or_else(|| AppError::Validation("email is required".to_string()))?;
    let password = payload.password.ok_or_else(|| AppError::Validation("password is required".to_string()))?;

    let (user, session) = state.account_service.login(email, password, session_metadata(&headers, addr)).await?;

    Ok(Json(LoginResponse { user: UserProfile::from(user), tokens: map_session(session) }))
}

pub async fn refresh(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<RefreshRequest>,
) -> Result<impl IntoResponse> {
    let refresh_token =
        payload.refresh_token.ok_or_else(|| AppError::Validation("refreshToken is required".to_string()))?;

    let session =
        state.auth_service.refresh_session(&refresh_token, session_metadata(&headers, addr)).await?;

    Ok(Json(map_session(session)))
}

/// Logout is fail-soft: the client discards its local credentials no matter
/// what happens here, so revocation errors must not turn into a failed
/// user-visible operation. The body is parsed leniently for the same reason.
pub async fn logout(maybe_user: MaybeAuthUser, State(state): State<AppState>, body: String) -> impl IntoResponse {
    let payload: LogoutRequest = serde_json::from_str(&body).unwrap_or_default();
    let all_devices = payload.all_devices.unwrap_or(false);

    if all_devices {
        if let MaybeAuthUser(Some(claims)) = &maybe_user {
            if let Err(e) = state.auth_service.revoke_all_sessions(claims.sub).await {
                tracing::warn!(error = %e, "Failed to revoke all sessions during logout");
            }
            return StatusCode::OK;
        }
        // No verified identity to scope "all devices" to; fall through and
        // revoke the presented token if there is one.
    }

    if let Some(refresh_token) = payload.refresh_token {
        if let Err(e) = state.auth_service.revoke_refresh_token(&refresh_token).await {
            tracing::warn!(error = %e, "Failed to revoke refresh token during logout");
        }
    }

    StatusCode::OK
}

pub async fn me(auth_user: AuthUser, State(state): State<AppState>) -> Result<impl IntoResponse> {
    let user = state.account_service.me(auth_user.claims.sub).await?;
    Ok(Json(UserProfile::from(user)))
}

fn map_session(session: SessionTokens) -> SessionResponse {
    SessionResponse {
        access_token: session.access_token,
        refresh_token: session.refresh_token,
        expires_in: session.expires_in,
    }
}
