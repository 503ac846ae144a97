use crate::domain::user::User;
use crate::error::{AppError, Result};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};
use rand::{RngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use time::OffsetDateTime;
use uuid::Uuid;

/// A persisted refresh token row. The raw token itself is never stored,
/// only its SHA-256 hash.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct RefreshRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub device_info: Option<String>,
    pub ip_address: Option<String>,
    pub expires_at: OffsetDateTime,
    pub revoked_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

impl RefreshRecord {
    /// A record is active iff it has not been revoked and has not expired.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.revoked_at.is_none() && self.expires_at > OffsetDateTime::now_utc()
    }
}

/// Claims embedded in the signed access token. Validity is purely a
/// function of the signature and `exp`; nothing here touches the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessClaims {
    pub sub: Uuid,
    pub email: String,
    pub roles: Vec<String>,
    pub exp: usize,
}

impl AccessClaims {
    #[must_use]
    pub fn new(user: &User, ttl_secs: u64) -> Self {
        let expiration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(std::time::Duration::from_secs(0))
            .as_secs() as usize
            + ttl_secs as usize;

        Self { sub: user.id, email: user.email.clone(), roles: user.roles.clone(), exp: expiration }
    }

    pub fn encode(&self, secret: &str) -> Result<String> {
        encode(&Header::default(), self, &EncodingKey::from_secret(secret.as_bytes())).map_err(|_| AppError::Internal)
    }

    /// Decodes and verifies a token, reporting the reason on rejection.
    pub fn decode(token: &str, secret: &str) -> std::result::Result<Self, RejectReason> {
        decode::<Self>(token, &DecodingKey::from_secret(secret.as_bytes()), &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => RejectReason::Expired,
                ErrorKind::InvalidSignature => RejectReason::BadSignature,
                _ => RejectReason::Malformed,
            })
    }
}

/// Outcome of access token validation. Rejection carries a loggable reason,
/// but callers get the same observable behavior for every rejection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenVerdict {
    Accepted(AccessClaims),
    Rejected(RejectReason),
}

impl TokenVerdict {
    #[must_use]
    pub fn into_claims(self) -> Option<AccessClaims> {
        match self {
            Self::Accepted(claims) => Some(claims),
            Self::Rejected(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Malformed,
    Expired,
    BadSignature,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "malformed"),
            Self::Expired => write!(f, "expired"),
            Self::BadSignature => write!(f, "bad signature"),
        }
    }
}

/// Extracts the token from an `Authorization` header value.
/// Returns `None` unless the value matches the `Bearer <token>` shape.
#[must_use]
pub fn extract_bearer(header: &str) -> Option<&str> {
    let token = header.strip_prefix("Bearer ")?;
    if token.is_empty() { None } else { Some(token) }
}

pub struct Password;

impl Password {
    #[tracing::instrument(skip(password), level = "debug")]
    pub fn hash(password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();
        let password_hash =
            argon2.hash_password(password.as_bytes(), &salt).map_err(|_| AppError::Internal)?.to_string();
        Ok(password_hash)
    }

    pub fn verify(password: &str, hash: &str) -> Result<bool> {
        let parsed_hash = PasswordHash::new(hash).map_err(|_| AppError::Internal)?;
        Ok(Argon2::default().verify_password(password.as_bytes(), &parsed_hash).is_ok())
    }
}

pub struct OpaqueToken;

impl OpaqueToken {
    /// Generates a refresh token as `<uuid>-<hex of 32 random bytes>`.
    #[must_use]
    pub fn generate() -> String {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        format!("{}-{}", Uuid::new_v4(), hex::encode(bytes))
    }

    /// Hashes a raw token with SHA-256 for storage.
    #[must_use]
    pub fn hash(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user() -> User {
        User {
            id: Uuid::new_v4(),
            email: "coach@example.com".to_string(),
            password_hash: None,
            display_name: "Coach".to_string(),
            roles: vec!["coach".to_string()],
            is_active: true,
            created_at: None,
        }
    }

    #[test]
    fn test_claims_roundtrip() {
        let user = test_user();
        let secret = "test_secret";
        let claims = AccessClaims::new(&user, 3600);

        let token = claims.encode(secret).unwrap();
        let decoded = AccessClaims::decode(&token, secret).unwrap();

        assert_eq!(claims, decoded);
        assert_eq!(decoded.roles, vec!["coach".to_string()]);
    }

    #[test]
    fn test_claims_invalid_secret() {
        let claims = AccessClaims::new(&test_user(), 3600);
        let token = claims.encode("secret1").unwrap();

        assert_eq!(AccessClaims::decode(&token, "secret2"), Err(RejectReason::BadSignature));
    }

    #[test]
    fn test_claims_expired() {
        let mut claims = AccessClaims::new(&test_user(), 3600);
        claims.exp = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as usize - 120;
        let token = claims.encode("secret").unwrap();

        assert_eq!(AccessClaims::decode(&token, "secret"), Err(RejectReason::Expired));
    }

    #[test]
    fn test_claims_malformed() {
        assert_eq!(AccessClaims::decode("not-a-token", "secret"), Err(RejectReason::Malformed));
    }

    #[test]
    fn test_bearer_extraction() {
        assert_eq!(extract_bearer("Bearer abc123"), Some("abc123"));
        assert_eq!(extract_bearer("Token abc123"), None);
        assert_eq!(extract_bearer("bearer abc123"), None);
        assert_eq!(extract_bearer("Bearer "), None);
        assert_eq!(extract_bearer("Bearer"), None);
        assert_eq!(extract_bearer(""), None);
    }

    #[test]
    fn test_password_hashing() {
        let password = "password12345";
        let hash = Password::hash(password).unwrap();

        assert!(Password::verify(password, &hash).unwrap());
        assert!(!Password::verify("wrong_password", &hash).unwrap());
    }

    #[test]
    fn test_opaque_token_shape() {
        let token1 = OpaqueToken::generate();
        let token2 = OpaqueToken::generate();

        assert_ne!(token1, token2);
        // uuid (36) + separator + 32 bytes of hex (64)
        assert_eq!(token1.len(), 101);
    }

    #[test]
    fn test_opaque_token_hashing() {
        let token = OpaqueToken::generate();
        let hash1 = OpaqueToken::hash(&token);
        let hash2 = OpaqueToken::hash(&token);

        assert_eq!(hash1, hash2);
        assert_ne!(token, hash1);
    }

    #[test]
    fn test_refresh_record_activity() {
        let mut record = RefreshRecord {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            token_hash: OpaqueToken::hash("raw"),
            device_info: None,
            ip_address: None,
            expires_at: OffsetDateTime::now_utc() + time::Duration::days(30),
            revoked_at: None,
            created_at: OffsetDateTime::now_utc(),
        };
        assert!(record.is_active());

        record.revoked_at = Some(OffsetDateTime::now_utc());
        assert!(!record.is_active());

        record.revoked_at = None;
        record.expires_at = OffsetDateTime::now_utc() - time::Duration::seconds(1);
        assert!(!record.is_active());
    }
}
