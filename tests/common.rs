use std::net::SocketAddr;
use std::sync::Once;
use std::sync::Arc;
use stride_server::api::{self, AppState, MgmtState};
use stride_server::config::{AuthConfig, Config, LogFormat, ServerConfig, TelemetryConfig};
use stride_server::domain::auth::Password;
use stride_server::domain::user::User;
use stride_server::services::account_service::AccountService;
use stride_server::services::auth_service::AuthService;
use stride_server::services::health_service::HealthService;
use stride_server::storage::memory::{InMemoryTokenStore, InMemoryUserStore};
use stride_server::storage::token_store::TokenStore;
use stride_server::storage::user_store::UserStore;
use uuid::Uuid;

pub const JWT_SECRET: &str = "test_secret";

static INIT: Once = Once::new();

pub fn setup_tracing() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "warn".into())
            .add_directive("stride_server=debug".parse().unwrap())
            .add_directive("tower=warn".parse().unwrap())
            .add_directive("hyper=warn".parse().unwrap())
            .add_directive("reqwest=warn".parse().unwrap());

        tracing_subscriber::fmt().with_env_filter(filter).init();
    });
}

pub fn test_config() -> Config {
    Config {
        database_url: "postgres://unused".to_string(),
        server: ServerConfig { host: "127.0.0.1".to_string(), port: 0, mgmt_port: 0 },
        auth: AuthConfig {
            jwt_secret: JWT_SECRET.to_string(),
            access_token_ttl_secs: 900,
            refresh_token_ttl_days: 30,
        },
        telemetry: TelemetryConfig { otlp_endpoint: None, log_format: LogFormat::Text },
    }
}

/// Binds the real application router to an OS-assigned port on top of the
/// given stores and returns its base URL.
pub async fn spawn_router(users: Arc<dyn UserStore>, tokens: Arc<dyn TokenStore>) -> String {
    setup_tracing();

    let config = test_config();
    let auth_service = AuthService::new(config.auth.clone(), Arc::clone(&users), tokens);
    let account_service = AccountService::new(users, auth_service.clone());
    let router = api::app_router(AppState { config, account_service, auth_service });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Failed to read local addr");

    tokio::spawn(async move {
        axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .expect("Test server crashed");
    });

    format!("http://{addr}")
}

#[allow(dead_code)]
pub async fn spawn_mgmt_router(tokens: Arc<dyn TokenStore>) -> String {
    setup_tracing();

    let router = api::mgmt_router(MgmtState { health_service: HealthService::new(tokens) });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Failed to read local addr");

    tokio::spawn(async move {
        axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .expect("Test server crashed");
    });

    format!("http://{addr}")
}

pub struct TestApp {
    pub server_url: String,
    pub client: reqwest::Client,
    pub users: Arc<InMemoryUserStore>,
    pub tokens: Arc<InMemoryTokenStore>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let users = Arc::new(InMemoryUserStore::new());
        let tokens = Arc::new(InMemoryTokenStore::new());
        let server_url =
            spawn_router(Arc::clone(&users) as Arc<dyn UserStore>, Arc::clone(&tokens) as Arc<dyn TokenStore>)
                .await;

        Self { server_url, client: reqwest::Client::new(), users, tokens }
    }

    /// Seeds a user with an argon2-hashed password. `password: None` models
    /// an account owned by an external identity provider.
    pub fn seed_user(&self, email: &str, password: Option<&str>, roles: &[&str], is_active: bool) -> User {
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: password.map(|p| Password::hash(p).expect("Failed to hash password")),
            display_name: "Test User".to_string(),
            roles: roles.iter().map(ToString::to_string).collect(),
            is_active,
            created_at: None,
        };
        self.users.insert(user.clone());
        user
    }

    pub async fn login(&self, email: &str, password: &str) -> reqwest::Response {
        self.client
            .post(format!("{}/auth/login", self.server_url))
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("Login request failed")
    }
}
