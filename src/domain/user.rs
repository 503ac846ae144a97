use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    /// `None` for accounts created through an external identity provider;
    /// password login is rejected for those with a 403.
    pub password_hash: Option<String>,
    pub display_name: String,
    pub roles: Vec<String>,
    pub is_active: bool,
    pub created_at: Option<OffsetDateTime>,
}

impl User {
    /// Canonical form used for storage and lookup.
    #[must_use]
    pub fn normalize_email(raw: &str) -> String {
        raw.trim().to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_normalization() {
        assert_eq!(User::normalize_email("  Coach@Example.COM "), "coach@example.com");
        assert_eq!(User::normalize_email("client@example.com"), "client@example.com");
    }
}
