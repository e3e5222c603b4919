use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::{Duration, Utc};
use cookie::{Cookie, SameSite};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{AppError, Result};

pub mod csrf;
pub mod session;

pub use csrf::{CsrfService, CSRF_FIELD};
pub use session::{AdminSession, SessionStore};

pub const SESSION_COOKIE: &str = "lerhuset_admin";

pub struct AuthService {
    session_store: SessionStore,
    session_hours: i64,
}

impl AuthService {
    pub fn new(pool: SqlitePool, session_hours: i64) -> Self {
        Self {
            session_store: SessionStore::new(pool),
            session_hours,
        }
    }

    pub async fn verify_password(password: &str, hash: &str) -> Result<bool> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| AppError::Internal(format!("Invalid password hash: {}", e)))?;

        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }

    pub async fn hash_password(password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?;

        Ok(password_hash.to_string())
    }

    pub async fn create_session(&self, admin_id: Uuid) -> Result<(AdminSession, String)> {
        let token = generate_token();
        let expires_at = Utc::now() + Duration::hours(self.session_hours);
        let session = self.session_store.create(admin_id, &token, expires_at).await?;
        Ok((session, token))
    }

    pub async fn validate_session(&self, token: &str) -> Result<Option<AdminSession>> {
        self.session_store.find_by_token(token).await
    }

    pub async fn invalidate_session(&self, token: &str) -> Result<()> {
        self.session_store.delete_by_token(token).await
    }

    pub async fn cleanup_expired_sessions(&self) -> Result<u64> {
        self.session_store.cleanup_expired().await
    }

    pub fn session_cookie(&self, token: &str, secure: bool) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, token.to_string()))
            .path("/")
            .same_site(SameSite::Lax)
            .http_only(true)
            .secure(secure)
            .max_age(cookie::time::Duration::hours(self.session_hours))
            .build()
    }

    pub fn logout_cookie() -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, ""))
            .path("/")
            .same_site(SameSite::Lax)
            .http_only(true)
            .max_age(cookie::time::Duration::seconds(0))
            .build()
    }
}

fn generate_token() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_password_hash_verifies() {
        let hash = AuthService::hash_password("lera och glasyr").await.unwrap();
        assert!(AuthService::verify_password("lera och glasyr", &hash).await.unwrap());
        assert!(!AuthService::verify_password("fel", &hash).await.unwrap());
    }

    #[test]
    fn test_generated_tokens_are_unique() {
        let a = generate_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, generate_token());
    }
}
