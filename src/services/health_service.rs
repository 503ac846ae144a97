use crate::error::{AppError, Result};
use crate::storage::token_store::TokenStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

const CHECK_TIMEOUT: Duration = Duration::from_secs(2);

/// Backs the readiness probe. A store that cannot be reached within the
/// check timeout counts as down.
#[derive(Clone, Debug)]
pub struct HealthService {
    tokens: Arc<dyn TokenStore>,
}

impl HealthService {
    pub fn new(tokens: Arc<dyn TokenStore>) -> Self {
        Self { tokens }
    }

    pub async fn check_store(&self) -> Result<()> {
        timeout(CHECK_TIMEOUT, self.tokens.ping()).await.map_err(|_| AppError::Internal)?
    }
}
