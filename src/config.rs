use std::{env, time::Duration};

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub db_path: String,
    pub auth_service_url: String,
    pub token_sign_timeout: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into()),
            db_path: env::var("DB_PATH").unwrap_or_else(|_| "registrydb".into()),
            auth_service_url: env::var("AUTH_SERVICE_URL")
                .context("AUTH_SERVICE_URL must be set")?,
            token_sign_timeout: Duration::from_millis(
                env::var("TOKEN_SIGN_TIMEOUT_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(5_000),
            ),
        })
    }
}
