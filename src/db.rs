use std::{fs, path::Path, str::FromStr};

use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};

use crate::{
    config::{AdminSeed, DEFAULT_ADMIN_PASSWORD},
    error::{AppError, AuthError},
    identity::IdentityProvider,
    models::{Role, UserRecord, USERS},
    store::{encode, DocumentStore},
};

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

pub async fn connect(db_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let connect_options = SqliteConnectOptions::from_str(db_url)?.create_if_missing(true);

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(connect_options)
        .await
}

pub fn ensure_sqlite_dir(db_url: &str) -> std::io::Result<()> {
    let path = if let Some(path) = db_url.strip_prefix("sqlite://") {
        Some(path)
    } else if let Some(path) = db_url.strip_prefix("sqlite:") {
        Some(path)
    } else {
        None
    };

    let Some(path) = path else {
        return Ok(());
    };

    let path = path.split('?').next().unwrap_or(path);
    if path == ":memory:" || path.is_empty() {
        return Ok(());
    }

    let path = path.strip_prefix("file:").unwrap_or(path);
    let db_path = Path::new(path);
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Creates the configured administrator unless an admin profile exists.
pub async fn seed_admin(
    store: &dyn DocumentStore,
    identities: &dyn IdentityProvider,
    seed: &AdminSeed,
) -> Result<(), AppError> {
    let existing = store.find_eq(USERS, "role", Role::Admin.as_str()).await?;
    if !existing.is_empty() {
        return Ok(());
    }

    if seed.password == DEFAULT_ADMIN_PASSWORD {
        log::warn!("ADMIN_PASSWORD not set. Using default password '{DEFAULT_ADMIN_PASSWORD}'. Set ADMIN_PASSWORD in production.");
    }

    let identity = match identities.create_identity(&seed.email, &seed.password).await {
        Ok(identity) => identity,
        Err(AuthError::IdentityExists(email)) => {
            log::warn!("Identity {email} exists without an admin profile; skipping admin seed.");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    let admin = UserRecord {
        id: String::new(),
        email: identity.email.clone(),
        name: seed.name.clone(),
        role: Role::Admin,
    };
    let written = match encode(&admin) {
        Ok(data) => store.set(USERS, &identity.uid, data).await,
        Err(err) => Err(err),
    };
    if let Err(err) = written {
        log::error!("Admin profile write failed for {}: {err}", identity.email);
        if let Err(undo) = identities.delete_identity(&identity.uid).await {
            log::warn!("Could not remove admin identity {}: {undo}", identity.uid);
        }
        return Err(err.into());
    }

    log::info!("Seeded administrator {}", identity.email);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FlakyStore, RecordingIdentities};

    fn seed() -> AdminSeed {
        AdminSeed {
            email: "admin@spa.local".to_string(),
            password: "change-me-now".to_string(),
            name: "Spa Admin".to_string(),
        }
    }

    #[tokio::test]
    async fn seeds_admin_once() {
        let store = FlakyStore::new().await;
        let identities = RecordingIdentities::default();

        seed_admin(&store, &identities, &seed()).await.unwrap();
        seed_admin(&store, &identities, &seed()).await.unwrap();

        let admins = store.find_eq(USERS, "role", "admin").await.unwrap();
        assert_eq!(admins.len(), 1);
        assert_eq!(identities.created.lock().unwrap().len(), 1);
        let admin: UserRecord = admins[0].decode().unwrap();
        assert_eq!(admin.name, "Spa Admin");
    }

    #[tokio::test]
    async fn failed_profile_write_does_not_block_next_start() {
        let store = FlakyStore::new().await;
        let identities = RecordingIdentities::default();

        store.set_fail_writes(true);
        assert!(seed_admin(&store, &identities, &seed()).await.is_err());
        assert!(identities.created.lock().unwrap().is_empty());

        store.set_fail_writes(false);
        seed_admin(&store, &identities, &seed()).await.unwrap();

        assert_eq!(store.find_eq(USERS, "role", "admin").await.unwrap().len(), 1);
        assert_eq!(identities.created.lock().unwrap().len(), 1);
        assert_eq!(identities.deleted.lock().unwrap().len(), 1);
    }

    #[test]
    fn sqlite_dir_ignores_memory_urls() {
        assert!(ensure_sqlite_dir("sqlite::memory:").is_ok());
        assert!(ensure_sqlite_dir("postgres://localhost/spa").is_ok());
    }
}
