use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use chrono::Utc;
use rand_core::OsRng;
use sqlx::SqlitePool;

use crate::{error::AuthError, registration::MIN_PASSWORD_LEN, store::new_id};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub uid: String,
    pub email: String,
}

/// Authentication provider: owns credentials and hands out stable uids.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn create_identity(&self, email: &str, password: &str) -> Result<Identity, AuthError>;

    /// `Ok(None)` when the email is unknown or the password does not match.
    async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<Identity>, AuthError>;

    async fn delete_identity(&self, uid: &str) -> Result<(), AuthError>;
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn hash_password(password: &str) -> Result<String, password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(hash) => Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok(),
        Err(_) => false,
    }
}

fn unavailable(err: sqlx::Error) -> AuthError {
    AuthError::Unavailable(err.to_string())
}

#[derive(Debug, sqlx::FromRow)]
struct IdentityRow {
    uid: String,
    email: String,
    password_hash: String,
}

pub struct SqliteIdentityProvider {
    pool: SqlitePool,
}

impl SqliteIdentityProvider {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityProvider for SqliteIdentityProvider {
    async fn create_identity(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakCredential(format!(
                "password should be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let email = normalize_email(email);
        let password_hash =
            hash_password(password).map_err(|err| AuthError::Unavailable(err.to_string()))?;
        let uid = new_id();

        let inserted = sqlx::query(
            r#"INSERT INTO identities (uid, email, password_hash, created_at)
               VALUES (?, ?, ?, ?)"#,
        )
        .bind(&uid)
        .bind(&email)
        .bind(password_hash)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(Identity { uid, email }),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(AuthError::IdentityExists(email))
            }
            Err(err) => Err(unavailable(err)),
        }
    }

    async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<Identity>, AuthError> {
        let row = sqlx::query_as::<_, IdentityRow>(
            "SELECT uid, email, password_hash FROM identities WHERE email = ? LIMIT 1",
        )
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(row
            .filter(|row| verify_password(password, &row.password_hash))
            .map(|row| Identity {
                uid: row.uid,
                email: row.email,
            }))
    }

    async fn delete_identity(&self, uid: &str) -> Result<(), AuthError> {
        sqlx::query("DELETE FROM identities WHERE uid = ?")
            .bind(uid)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}
