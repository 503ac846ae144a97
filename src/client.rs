//! HTTP client session coordinator with single-flight token refresh.
//!
//! [`SessionCoordinator`] attaches the held access token to outbound calls,
//! detects authorization failures, and refreshes the session at most once
//! at a time: the first caller to observe a 401 performs the refresh while
//! every concurrently-failing caller queues on its outcome. Each original
//! call is replayed at most once; a second rejection is definitive.
//!
//! Coordinators are plain objects — multiple independent sessions can
//! coexist in one process, each with its own tokens and refresh gate.

use crate::domain::auth_session::SessionTokens;
use reqwest::{Method, Response, StatusCode};
use serde::Deserialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{RwLock, oneshot};
use uuid::Uuid;

const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),
    /// The session could not be refreshed; the caller must re-authenticate.
    #[error("Session expired")]
    SessionExpired,
    #[error("Unexpected status: {0}")]
    UnexpectedStatus(StatusCode),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    user: UserProfile,
    #[serde(flatten)]
    tokens: TokenResponse,
}

/// What an in-flight refresh resolved to. Cloned to every queued waiter so
/// all concurrent callers see the same outcome.
#[derive(Clone, Debug)]
enum RefreshOutcome {
    Refreshed { access_token: String },
    SessionExpired,
}

#[derive(Debug, Default)]
struct RefreshGate {
    refreshing: bool,
    waiters: Vec<oneshot::Sender<RefreshOutcome>>,
}

#[derive(Clone, Debug)]
pub struct SessionCoordinator {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    http: reqwest::Client,
    base_url: String,
    refresh_timeout: Duration,
    tokens: RwLock<Option<SessionTokens>>,
    // Held only to flip the flag and queue waiters, never across an await.
    gate: Mutex<RefreshGate>,
}

impl Inner {
    fn release(&self, outcome: &RefreshOutcome) {
        let waiters = {
            let mut gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
            gate.refreshing = false;
            std::mem::take(&mut gate.waiters)
        };
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }
}

/// Releases the gate even if the leading task is cancelled mid-refresh, so
/// queued waiters fail instead of stalling forever.
struct LeaderGuard<'a> {
    inner: &'a Inner,
    done: bool,
}

impl LeaderGuard<'_> {
    fn finish(mut self, outcome: &RefreshOutcome) {
        self.done = true;
        self.inner.release(outcome);
    }
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.inner.release(&RefreshOutcome::SessionExpired);
        }
    }
}

impl SessionCoordinator {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                http: reqwest::Client::new(),
                base_url: base_url.into(),
                refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
                tokens: RwLock::new(None),
                gate: Mutex::new(RefreshGate::default()),
            }),
        }
    }

    /// Caps how long a refresh call may hang before every queued waiter is
    /// released with a session-expired outcome. Call at construction time,
    /// before any tokens are held.
    #[must_use]
    pub fn with_refresh_timeout(self, refresh_timeout: Duration) -> Self {
        let inner = Arc::new(Inner {
            http: self.inner.http.clone(),
            base_url: self.inner.base_url.clone(),
            refresh_timeout,
            tokens: RwLock::new(None),
            gate: Mutex::new(RefreshGate::default()),
        });
        Self { inner }
    }

    pub async fn tokens(&self) -> Option<SessionTokens> {
        self.inner.tokens.read().await.clone()
    }

    /// Resumes a previously persisted session.
    pub async fn set_tokens(&self, tokens: SessionTokens) {
        *self.inner.tokens.write().await = Some(tokens);
    }

    #[tracing::instrument(skip(self, email, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile, ClientError> {
        let response = self
            .inner
            .http
            .post(format!("{}/auth/login", self.inner.base_url))
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(ClientError::UnexpectedStatus(response.status()));
        }

        let body: LoginResponse = response.json().await?;
        *self.inner.tokens.write().await = Some(SessionTokens {
            access_token: body.tokens.access_token,
            refresh_token: body.tokens.refresh_token,
            expires_in: body.tokens.expires_in,
        });

        tracing::debug!("Session established");
        Ok(body.user)
    }

    /// Ends the session. Local credentials are discarded before the server
    /// is told, and a failed revocation is logged rather than surfaced: the
    /// caller must never be left believing it is still authenticated.
    #[tracing::instrument(skip(self))]
    pub async fn logout(&self, all_devices: bool) {
        let tokens = self.inner.tokens.write().await.take();
        let Some(tokens) = tokens else { return };

        let result = self
            .inner
            .http
            .post(format!("{}/auth/logout", self.inner.base_url))
            .bearer_auth(&tokens.access_token)
            .json(&serde_json::json!({ "refreshToken": tokens.refresh_token, "allDevices": all_devices }))
            .send()
            .await;

        if let Err(e) = result {
            tracing::warn!(error = %e, "Logout request failed; local session cleared anyway");
        }
    }

    pub async fn me(&self) -> Result<UserProfile, ClientError> {
        let response = self.execute(Method::GET, "/auth/me", None).await?;
        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            StatusCode::UNAUTHORIZED => Err(ClientError::SessionExpired),
            status => Err(ClientError::UnexpectedStatus(status)),
        }
    }

    pub async fn get(&self, path: &str) -> Result<Response, ClientError> {
        self.execute(Method::GET, path, None).await
    }

    pub async fn post_json(&self, path: &str, body: serde_json::Value) -> Result<Response, ClientError> {
        self.execute(Method::POST, path, Some(body)).await
    }

    /// Sends an authenticated request, transparently refreshing the session
    /// on an authorization failure and replaying the call exactly once.
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<Response, ClientError> {
        let access_token = self.inner.tokens.read().await.as_ref().map(|t| t.access_token.clone());
        let response = self.dispatch(method.clone(), path, body.as_ref(), access_token.as_deref()).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        // An unauthenticated call that bounced has nothing to refresh.
        if access_token.is_none() {
            return Ok(response);
        }

        match self.refresh_access_token().await {
            RefreshOutcome::Refreshed { access_token } => {
                // One replay; if this also bounces, the caller gets the 401.
                Ok(self.dispatch(method, path, body.as_ref(), Some(&access_token)).await?)
            }
            RefreshOutcome::SessionExpired => Err(ClientError::SessionExpired),
        }
    }

    async fn dispatch(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        bearer: Option<&str>,
    ) -> Result<Response, reqwest::Error> {
        let mut request = self.inner.http.request(method, format!("{}{}", self.inner.base_url, path));
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        request.send().await
    }

    /// Single-flight entry point: the first caller becomes the leader and
    /// performs the network call, everyone else queues on its outcome.
    async fn refresh_access_token(&self) -> RefreshOutcome {
        let joined = {
            let mut gate = self.inner.gate.lock().unwrap_or_else(PoisonError::into_inner);
            if gate.refreshing {
                let (tx, rx) = oneshot::channel();
                gate.waiters.push(tx);
                Some(rx)
            } else {
                gate.refreshing = true;
                None
            }
        };

        if let Some(rx) = joined {
            // A dropped leader counts as failure rather than a stall.
            return rx.await.unwrap_or(RefreshOutcome::SessionExpired);
        }

        let guard = LeaderGuard { inner: self.inner.as_ref(), done: false };
        let outcome = self.run_refresh().await;
        guard.finish(&outcome);
        outcome
    }

    async fn run_refresh(&self) -> RefreshOutcome {
        let refresh_token = self.inner.tokens.read().await.as_ref().map(|t| t.refresh_token.clone());
        let Some(refresh_token) = refresh_token else {
            return self.expire_session().await;
        };

        let call = self
            .inner
            .http
            .post(format!("{}/auth/refresh", self.inner.base_url))
            .json(&serde_json::json!({ "refreshToken": refresh_token }))
            .send();

        // A hung refresh must not stall the waiter queue indefinitely.
        let response = match tokio::time::timeout(self.inner.refresh_timeout, call).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Refresh request failed");
                return self.expire_session().await;
            }
            Err(_) => {
                tracing::warn!(timeout_secs = self.inner.refresh_timeout.as_secs(), "Refresh request timed out");
                return self.expire_session().await;
            }
        };

        if response.status() != StatusCode::OK {
            tracing::debug!(status = %response.status(), "Refresh rejected");
            return self.expire_session().await;
        }

        let body: TokenResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(error = %e, "Malformed refresh response");
                return self.expire_session().await;
            }
        };

        let access_token = body.access_token.clone();
        *self.inner.tokens.write().await = Some(SessionTokens {
            access_token: body.access_token,
            refresh_token: body.refresh_token,
            expires_in: body.expires_in,
        });

        tracing::debug!("Session tokens rotated");
        RefreshOutcome::Refreshed { access_token }
    }

    async fn expire_session(&self) -> RefreshOutcome {
        *self.inner.tokens.write().await = None;
        RefreshOutcome::SessionExpired
    }
}
