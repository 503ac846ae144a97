use crate::domain::auth::Password;
use crate::domain::auth_session::{SessionMetadata, SessionTokens};
use crate::domain::user::User;
use crate::error::{AppError, Result};
use crate::services::auth_service::AuthService;
use crate::storage::user_store::UserStore;
use opentelemetry::{global, metrics::Counter};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone, Debug)]
struct Metrics {
    login_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("stride-server");
        Self {
            login_total: meter
                .u64_counter("auth_login_total")
                .with_description("Total number of successful logins")
                .build(),
        }
    }
}

/// Orchestrates password login and profile lookup on top of the issuer.
#[derive(Clone, Debug)]
pub struct AccountService {
    users: Arc<dyn UserStore>,
    auth_service: AuthService,
    metrics: Metrics,
}

impl AccountService {
    pub fn new(users: Arc<dyn UserStore>, auth_service: AuthService) -> Self {
        Self { users, auth_service, metrics: Metrics::new() }
    }

    /// Verifies an email/password pair and issues a session.
    ///
    /// Unknown emails and wrong passwords are indistinguishable to the
    /// caller. Disabled accounts and accounts without a password (external
    /// identity provider) fail with 403 instead, but only once the caller
    /// has cleared the authentication hurdle that applies to them.
    #[tracing::instrument(
        skip(self, email, password, meta),
        fields(user_id = tracing::field::Empty),
        err(level = "warn")
    )]
    pub async fn login(
        &self,
        email: String,
        password: String,
        meta: SessionMetadata,
    ) -> Result<(User, SessionTokens)> {
        let email = User::normalize_email(&email);
        let user = match self.users.find_by_email(&email).await? {
            Some(u) => u,
            None => {
                tracing::warn!("Login failed: user not found");
                return Err(AppError::Auth);
            }
        };

        tracing::Span::current().record("user_id", tracing::field::display(user.id));

        let Some(password_hash) = user.password_hash.clone() else {
            tracing::warn!("Login failed: account has no password set");
            return Err(AppError::Forbidden("This account does not support password login".to_string()));
        };

        let is_valid = Self::verify_password(&password, &password_hash).await?;
        if !is_valid {
            tracing::warn!("Login failed: invalid password");
            return Err(AppError::Auth);
        }

        if !user.is_active {
            tracing::warn!("Login failed: account is disabled");
            return Err(AppError::Forbidden("Account is disabled".to_string()));
        }

        let session = self.auth_service.issue_session(&user, meta).await?;

        tracing::info!("User logged in");
        self.metrics.login_total.add(1, &[]);

        Ok((user, session))
    }

    /// Profile lookup for an authenticated caller. The claims were minted
    /// from a live row, but the row may have vanished since.
    #[tracing::instrument(skip(self), fields(user_id = %user_id), err(level = "debug"))]
    pub async fn me(&self, user_id: Uuid) -> Result<User> {
        self.users.find_by_id(user_id).await?.ok_or(AppError::NotFound)
    }

    /// Argon2 hashing is CPU-bound, so both directions run on the blocking
    /// pool.
    #[tracing::instrument(err, skip(password))]
    pub async fn hash_password(password: &str) -> Result<String> {
        let password = password.to_string();
        tokio::task::spawn_blocking(move || Password::hash(&password)).await.map_err(|_| AppError::Internal)?
    }

    #[tracing::instrument(err, skip(password, password_hash))]
    pub async fn verify_password(password: &str, password_hash: &str) -> Result<bool> {
        let password = password.to_string();
        let password_hash = password_hash.to_string();
        tokio::task::spawn_blocking(move || Password::verify(&password, &password_hash))
            .await
            .map_err(|_| AppError::Internal)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use crate::storage::memory::{InMemoryTokenStore, InMemoryUserStore};
    use crate::storage::token_store::TokenStore;

    fn service_with_user(user: User) -> AccountService {
        let users = Arc::new(InMemoryUserStore::new());
        users.insert(user);
        let tokens = Arc::new(InMemoryTokenStore::new());
        let auth_service = AuthService::new(
            AuthConfig { jwt_secret: "test_secret".to_string(), access_token_ttl_secs: 900, refresh_token_ttl_days: 30 },
            Arc::clone(&users) as Arc<dyn UserStore>,
            tokens as Arc<dyn TokenStore>,
        );
        AccountService::new(users, auth_service)
    }

    fn test_user(password_hash: Option<String>, is_active: bool) -> User {
        User {
            id: Uuid::new_v4(),
            email: "client@example.com".to_string(),
            password_hash,
            display_name: "Client".to_string(),
            roles: vec!["client".to_string()],
            is_active,
            created_at: None,
        }
    }

    #[tokio::test]
    async fn test_login_success() {
        let hash = Password::hash("password12345").unwrap();
        let service = service_with_user(test_user(Some(hash), true));

        let (user, session) =
            service.login("Client@Example.com".to_string(), "password12345".to_string(), SessionMetadata::default())
                .await
                .unwrap();

        assert_eq!(user.email, "client@example.com");
        assert_eq!(session.expires_in, 900);
        assert!(!session.refresh_token.is_empty());
    }

    #[tokio::test]
    async fn test_login_wrong_password_and_unknown_email_match() {
        let hash = Password::hash("password12345").unwrap();
        let service = service_with_user(test_user(Some(hash), true));

        let wrong_password = service
            .login("client@example.com".to_string(), "nope".to_string(), SessionMetadata::default())
            .await;
        let unknown_email = service
            .login("ghost@example.com".to_string(), "password12345".to_string(), SessionMetadata::default())
            .await;

        assert!(matches!(wrong_password, Err(AppError::Auth)));
        assert!(matches!(unknown_email, Err(AppError::Auth)));
    }

    #[tokio::test]
    async fn test_login_disabled_account() {
        let hash = Password::hash("password12345").unwrap();
        let service = service_with_user(test_user(Some(hash), false));

        let result = service
            .login("client@example.com".to_string(), "password12345".to_string(), SessionMetadata::default())
            .await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_login_oauth_only_account() {
        let service = service_with_user(test_user(None, true));

        let result = service
            .login("client@example.com".to_string(), "anything".to_string(), SessionMetadata::default())
            .await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }
}
