//! Server configuration loaded from environment variables.
//!
//! All settings have defaults so the server starts with zero configuration
//! for local development.  Invalid values are logged and ignored.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chatbus_core::ChatConfig;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Name reported by `GET /`.
    /// Env: `APP_NAME`
    /// Default: `"Chat Bus"`
    pub app_name: String,

    /// Deployment environment label, for logs only.
    /// Env: `ENV`
    /// Default: `"dev"`
    pub environment: String,

    /// Socket address for the HTTP API.
    /// Env: `HTTP_ADDR`, or `PORT` to keep the default host.
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: `./chatbus.db`
    pub database_path: PathBuf,

    /// Cache and background-task tuning.
    /// Env: `MAILBOX_CAPACITY`, `SESSION_TIMEOUT_SECS`, `CULL_INTERVAL_SECS`,
    /// `PERSISTENCE_WORKERS`
    pub chat: ChatConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            app_name: "Chat Bus".to_string(),
            environment: "dev".to_string(),
            http_addr: ([0, 0, 0, 0], 8080).into(),
            database_path: PathBuf::from("./chatbus.db"),
            chat: ChatConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_vars<F>(var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(name) = var("APP_NAME").filter(|v| !v.is_empty()) {
            config.app_name = name;
        }

        if let Some(env) = var("ENV").filter(|v| !v.is_empty()) {
            config.environment = env;
        }

        if let Some(addr) = var("HTTP_ADDR") {
            if let Some(parsed) = parse_or_warn::<SocketAddr>("HTTP_ADDR", &addr) {
                config.http_addr = parsed;
            }
        } else if let Some(port) = var("PORT") {
            if let Some(parsed) = parse_or_warn::<u16>("PORT", &port) {
                config.http_addr.set_port(parsed);
            }
        }

        if let Some(path) = var("DATABASE_PATH").filter(|v| !v.is_empty()) {
            config.database_path = PathBuf::from(path);
        }

        if let Some(raw) = var("MAILBOX_CAPACITY") {
            if let Some(n) = parse_positive("MAILBOX_CAPACITY", &raw) {
                config.chat.mailbox_capacity = n;
            }
        }

        if let Some(raw) = var("SESSION_TIMEOUT_SECS") {
            if let Some(secs) = parse_positive("SESSION_TIMEOUT_SECS", &raw) {
                config.chat.session_timeout = Duration::from_secs(secs as u64);
            }
        }

        if let Some(raw) = var("CULL_INTERVAL_SECS") {
            if let Some(secs) = parse_positive("CULL_INTERVAL_SECS", &raw) {
                config.chat.cull_interval = Duration::from_secs(secs as u64);
            }
        }

        if let Some(raw) = var("PERSISTENCE_WORKERS") {
            if let Some(n) = parse_positive("PERSISTENCE_WORKERS", &raw) {
                config.chat.persistence_workers = n;
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }
}

fn parse_or_warn<T: FromStr>(key: &str, raw: &str) -> Option<T> {
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Invalid value, using default");
            None
        }
    }
}

fn parse_positive(key: &str, raw: &str) -> Option<usize> {
    match parse_or_warn::<usize>(key, raw)? {
        0 => {
            tracing::warn!(key, "Value must be positive, using default");
            None
        }
        n => Some(n),
    }
}
