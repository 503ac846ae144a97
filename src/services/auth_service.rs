use crate::config::AuthConfig;
use crate::domain::auth::{AccessClaims, OpaqueToken, RefreshRecord, TokenVerdict, extract_bearer};
use crate::domain::auth_session::{SessionMetadata, SessionTokens};
use crate::domain::user::User;
use crate::error::{AppError, Result};
use crate::storage::token_store::TokenStore;
use crate::storage::user_store::UserStore;
use opentelemetry::{global, metrics::Counter};
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug)]
struct Metrics {
    issued_total: Counter<u64>,
    refresh_total: Counter<u64>,
    revoked_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("stride-server");
        Self {
            issued_total: meter
                .u64_counter("auth_sessions_issued_total")
                .with_description("Total number of token pairs issued")
                .build(),
            refresh_total: meter
                .u64_counter("auth_refresh_total")
                .with_description("Total number of successful token rotations")
                .build(),
            revoked_total: meter
                .u64_counter("auth_revocations_total")
                .with_description("Total number of refresh token revocations")
                .build(),
        }
    }
}

/// Issues, rotates, revokes, and validates session credentials.
///
/// Access tokens are signed and self-contained; refresh tokens are opaque,
/// stored only as hashes, and single-use via revoke-then-reissue rotation.
#[derive(Clone, Debug)]
pub struct AuthService {
    config: AuthConfig,
    users: Arc<dyn UserStore>,
    tokens: Arc<dyn TokenStore>,
    metrics: Metrics,
}

impl AuthService {
    pub fn new(config: AuthConfig, users: Arc<dyn UserStore>, tokens: Arc<dyn TokenStore>) -> Self {
        Self { config, users, tokens, metrics: Metrics::new() }
    }

    /// Mints a fresh access/refresh pair for `user` and persists the refresh
    /// record. The raw refresh token is returned exactly once.
    #[tracing::instrument(skip(self, user, meta), fields(user_id = %user.id), err(level = "warn"))]
    pub async fn issue_session(&self, user: &User, meta: SessionMetadata) -> Result<SessionTokens> {
        let claims = AccessClaims::new(user, self.config.access_token_ttl_secs);
        let access_token = claims.encode(&self.config.jwt_secret)?;

        let refresh_token = OpaqueToken::generate();
        let now = OffsetDateTime::now_utc();
        let record = RefreshRecord {
            id: Uuid::new_v4(),
            user_id: user.id,
            token_hash: OpaqueToken::hash(&refresh_token),
            device_info: meta.device_info,
            ip_address: meta.ip_address,
            expires_at: now + time::Duration::days(self.config.refresh_token_ttl_days),
            revoked_at: None,
            created_at: now,
        };
        self.tokens.insert(&record).await?;

        self.metrics.issued_total.add(1, &[]);

        Ok(SessionTokens { access_token, refresh_token, expires_in: self.config.access_token_ttl_secs })
    }

    /// Rotates a refresh token: the presented token is consumed (revoked)
    /// and a brand-new pair is issued for its owner.
    ///
    /// A replayed token finds no active record and fails; reuse is treated
    /// as an ordinary authentication failure, not a theft signal.
    #[tracing::instrument(skip(self, refresh_token, meta), fields(user_id = tracing::field::Empty), err(level = "warn"))]
    pub async fn refresh_session(&self, refresh_token: &str, meta: SessionMetadata) -> Result<SessionTokens> {
        let hash = OpaqueToken::hash(refresh_token);
        let record = self.tokens.claim(&hash).await?.ok_or(AppError::Auth)?;

        tracing::Span::current().record("user_id", tracing::field::display(record.user_id));

        let user = self.users.find_by_id(record.user_id).await?.ok_or(AppError::Auth)?;
        if !user.is_active {
            tracing::warn!("Refresh rejected: account is disabled");
            return Err(AppError::Auth);
        }

        let session = self.issue_session(&user, meta).await?;

        tracing::info!("Tokens rotated");
        self.metrics.refresh_total.add(1, &[]);

        Ok(session)
    }

    /// Revokes the record matching the presented refresh token, if any.
    /// Idempotent; revoking an already-revoked token is a no-op.
    #[tracing::instrument(skip(self, refresh_token), err(level = "warn"))]
    pub async fn revoke_refresh_token(&self, refresh_token: &str) -> Result<()> {
        let hash = OpaqueToken::hash(refresh_token);
        self.tokens.revoke(&hash).await?;
        self.metrics.revoked_total.add(1, &[]);
        Ok(())
    }

    /// Revokes every active session for `user_id` ("log out of all devices",
    /// password reset).
    #[tracing::instrument(skip(self), fields(user_id = %user_id), err(level = "warn"))]
    pub async fn revoke_all_sessions(&self, user_id: Uuid) -> Result<u64> {
        let revoked = self.tokens.revoke_all_for_user(user_id).await?;
        if revoked > 0 {
            tracing::info!(count = %revoked, "Revoked all active sessions");
            self.metrics.revoked_total.add(revoked, &[]);
        }
        Ok(revoked)
    }

    /// Verifies the signature and expiry of an access token. Never fails
    /// with an error; every problem collapses to a rejection whose reason
    /// is logged but not exposed.
    #[must_use]
    pub fn validate_access_token(&self, token: &str) -> TokenVerdict {
        match AccessClaims::decode(token, &self.config.jwt_secret) {
            Ok(claims) => TokenVerdict::Accepted(claims),
            Err(reason) => {
                tracing::debug!(%reason, "Access token rejected");
                TokenVerdict::Rejected(reason)
            }
        }
    }

    /// The single entry point for request handlers: header in, claims out.
    #[must_use]
    pub fn authenticate_request(&self, header: Option<&str>) -> Option<AccessClaims> {
        let token = extract_bearer(header?)?;
        self.validate_access_token(token).into_claims()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::{InMemoryTokenStore, InMemoryUserStore};

    fn test_config() -> AuthConfig {
        AuthConfig { jwt_secret: "test_secret".to_string(), access_token_ttl_secs: 900, refresh_token_ttl_days: 30 }
    }

    fn seeded_service() -> (AuthService, Arc<InMemoryTokenStore>, User) {
        let users = Arc::new(InMemoryUserStore::new());
        let tokens = Arc::new(InMemoryTokenStore::new());
        let user = User {
            id: Uuid::new_v4(),
            email: "client@example.com".to_string(),
            password_hash: None,
            display_name: "Client".to_string(),
            roles: vec!["client".to_string()],
            is_active: true,
            created_at: None,
        };
        users.insert(user.clone());

        let service = AuthService::new(
            test_config(),
            Arc::clone(&users) as Arc<dyn UserStore>,
            Arc::clone(&tokens) as Arc<dyn TokenStore>,
        );
        (service, tokens, user)
    }

    #[tokio::test]
    async fn test_issue_creates_active_record() {
        let (service, tokens, user) = seeded_service();

        let session = service.issue_session(&user, SessionMetadata::default()).await.unwrap();
        assert_eq!(session.expires_in, 900);

        let records = tokens.records();
        assert_eq!(records.len(), 1);
        assert!(records[0].is_active());
        assert_eq!(records[0].token_hash, OpaqueToken::hash(&session.refresh_token));

        // expires_at lands about 30 days out
        let expected = OffsetDateTime::now_utc() + time::Duration::days(30);
        let drift = (records[0].expires_at - expected).abs();
        assert!(drift < time::Duration::minutes(1));
    }

    #[tokio::test]
    async fn test_rotation_is_single_use() {
        let (service, _, user) = seeded_service();
        let session = service.issue_session(&user, SessionMetadata::default()).await.unwrap();

        let rotated = service.refresh_session(&session.refresh_token, SessionMetadata::default()).await.unwrap();
        assert_ne!(rotated.refresh_token, session.refresh_token);

        // Replaying the consumed token fails.
        let replay = service.refresh_session(&session.refresh_token, SessionMetadata::default()).await;
        assert!(matches!(replay, Err(AppError::Auth)));

        // The rotated token still works.
        assert!(service.refresh_session(&rotated.refresh_token, SessionMetadata::default()).await.is_ok());
    }

    #[tokio::test]
    async fn test_refresh_with_unknown_token_fails() {
        let (service, _, _) = seeded_service();
        let result = service.refresh_session(&OpaqueToken::generate(), SessionMetadata::default()).await;
        assert!(matches!(result, Err(AppError::Auth)));
    }

    #[tokio::test]
    async fn test_revoke_all_kills_every_session() {
        let (service, _, user) = seeded_service();
        let s1 = service.issue_session(&user, SessionMetadata::default()).await.unwrap();
        let s2 = service.issue_session(&user, SessionMetadata::default()).await.unwrap();

        let revoked = service.revoke_all_sessions(user.id).await.unwrap();
        assert_eq!(revoked, 2);

        for token in [s1.refresh_token, s2.refresh_token] {
            let result = service.refresh_session(&token, SessionMetadata::default()).await;
            assert!(matches!(result, Err(AppError::Auth)));
        }
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let (service, tokens, user) = seeded_service();
        let session = service.issue_session(&user, SessionMetadata::default()).await.unwrap();

        service.revoke_refresh_token(&session.refresh_token).await.unwrap();
        let first_revoked_at = tokens.records()[0].revoked_at;
        assert!(first_revoked_at.is_some());

        service.revoke_refresh_token(&session.refresh_token).await.unwrap();
        assert_eq!(tokens.records()[0].revoked_at, first_revoked_at);
    }

    #[tokio::test]
    async fn test_validation_verdicts() {
        let (service, _, user) = seeded_service();
        let session = service.issue_session(&user, SessionMetadata::default()).await.unwrap();

        let verdict = service.validate_access_token(&session.access_token);
        match verdict {
            TokenVerdict::Accepted(claims) => {
                assert_eq!(claims.sub, user.id);
                assert_eq!(claims.email, user.email);
                assert_eq!(claims.roles, user.roles);
            }
            TokenVerdict::Rejected(reason) => panic!("expected acceptance, got {reason}"),
        }

        assert!(matches!(service.validate_access_token("garbage"), TokenVerdict::Rejected(_)));
    }

    #[tokio::test]
    async fn test_authenticate_request_composition() {
        let (service, _, user) = seeded_service();
        let session = service.issue_session(&user, SessionMetadata::default()).await.unwrap();

        let header = format!("Bearer {}", session.access_token);
        assert!(service.authenticate_request(Some(&header)).is_some());

        assert!(service.authenticate_request(None).is_none());
        assert!(service.authenticate_request(Some("")).is_none());
        assert!(service.authenticate_request(Some(&format!("Token {}", session.access_token))).is_none());
    }
}
