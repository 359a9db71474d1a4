//! Startup configuration, loaded from the environment.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
}

impl AppConfig {
    /// Load configuration from the environment, applying the exchange's
    /// conventional defaults (`0.0.0.0:12345`, a pool of 100 connections),
    /// with `DATABASE_URL` as the only required variable.
    pub fn load() -> Result<Self, ConfigError> {
        let host = std::env::var("EXCHANGE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = match std::env::var("EXCHANGE_PORT") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                name: "EXCHANGE_PORT",
                value: raw,
            })?,
            Err(_) => 12345,
        };

        let database_url =
            std::env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;

        let db_max_connections = match std::env::var("DB_MAX_CONNECTIONS") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                name: "DB_MAX_CONNECTIONS",
                value: raw,
            })?,
            Err(_) => 100,
        };

        Ok(Self {
            host,
            port,
            database_url,
            db_max_connections,
        })
    }
}
