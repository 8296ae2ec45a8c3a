use std::{env, time::Duration};

use crate::state::DEFAULT_SCREEN_IDLE;

pub const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub admin: AdminSeed,
    /// How long a signed-in user's screens are kept without a visit.
    pub screen_idle: Duration,
}

/// Credentials of the administrator created on first start.
#[derive(Clone, Debug)]
pub struct AdminSeed {
    pub email: String,
    pub password: String,
    pub name: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://./data/spa.db".to_string());
        let port = env::var("PORT")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(8080);
        let screen_idle = env::var("SCREEN_IDLE_SECS")
            .ok()
            .and_then(|value| value.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_SCREEN_IDLE);

        Self {
            database_url,
            port,
            admin: AdminSeed {
                email: env::var("ADMIN_EMAIL").unwrap_or_else(|_| "admin@spa.local".to_string()),
                password: env::var("ADMIN_PASSWORD")
                    .unwrap_or_else(|_| DEFAULT_ADMIN_PASSWORD.to_string()),
                name: env::var("ADMIN_NAME").unwrap_or_else(|_| "Spa Admin".to_string()),
            },
            screen_idle,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}
