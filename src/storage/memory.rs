//! In-memory store implementations. Used by the test suites and handy for
//! local development without a database.

use crate::domain::auth::RefreshRecord;
use crate::domain::user::User;
use crate::error::Result;
use crate::storage::token_store::TokenStore;
use crate::storage::user_store::UserStore;
use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: Mutex<Vec<User>>,
}

impl InMemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user: User) {
        self.users.lock().unwrap_or_else(PoisonError::into_inner).push(user);
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(users.iter().find(|u| u.id == id).cloned())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    records: Mutex<Vec<RefreshRecord>>,
}

impl InMemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record ever inserted, revoked ones included.
    #[must_use]
    pub fn records(&self) -> Vec<RefreshRecord> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn insert(&self, record: &RefreshRecord) -> Result<()> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).push(record.clone());
        Ok(())
    }

    async fn claim(&self, token_hash: &str) -> Result<Option<RefreshRecord>> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let claimed = records.iter_mut().find(|r| r.token_hash == token_hash && r.is_active());

        Ok(claimed.map(|record| {
            record.revoked_at = Some(OffsetDateTime::now_utc());
            record.clone()
        }))
    }

    async fn revoke(&self, token_hash: &str) -> Result<()> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(record) = records.iter_mut().find(|r| r.token_hash == token_hash && r.revoked_at.is_none()) {
            record.revoked_at = Some(OffsetDateTime::now_utc());
        }
        Ok(())
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let mut touched = 0;
        for record in records.iter_mut().filter(|r| r.user_id == user_id && r.is_active()) {
            record.revoked_at = Some(OffsetDateTime::now_utc());
            touched += 1;
        }
        Ok(touched)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
