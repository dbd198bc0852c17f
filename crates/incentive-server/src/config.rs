//! Configuration loaded from environment variables.

use std::env;
use std::net::SocketAddr;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid environment value: {0}")]
    InvalidValue(String),
}

/// Which storage backend serves requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    /// Process-local state; lost on restart.
    Memory,
}

impl StoreKind {
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreKind::Postgres),
            "memory" => Ok(StoreKind::Memory),
            other => Err(ConfigError::InvalidValue(format!(
                "Invalid INCENTIVES_STORE: '{}'. Expected: postgres or memory",
                other
            ))),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub store: StoreKind,

    /// Database connection URL; required for the postgres store.
    pub database_url: Option<String>,

    pub db_max_connections: u32,

    pub bind_addr: SocketAddr,

    /// Currency reported alongside ledger balances.
    pub ledger_currency: String,

    /// Fallback tracing filter when RUST_LOG is unset.
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors)
        dotenvy::dotenv().ok();

        let store = env::var("INCENTIVES_STORE")
            .map(|s| StoreKind::parse(&s))
            .unwrap_or(Ok(StoreKind::Postgres))?;

        let database_url = env::var("DATABASE_URL").ok();
        if store == StoreKind::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingEnvVar("DATABASE_URL".to_string()));
        }

        let db_max_connections = env::var("DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<u32>()
            .map_err(|_| {
                ConfigError::InvalidValue("DB_MAX_CONNECTIONS must be a positive number".to_string())
            })?;

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:5000".to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue(format!("BIND_ADDR: {}", e)))?;

        let ledger_currency = env::var("LEDGER_CURRENCY")
            .map(|c| c.trim().to_uppercase())
            .ok()
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "GBP".to_string());

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Config {
            store,
            database_url,
            db_max_connections,
            bind_addr,
            ledger_currency,
            log_level,
        })
    }
}
