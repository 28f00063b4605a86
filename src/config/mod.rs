use serde::Deserialize;
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use thiserror::Error;

// Главная структура конфигурации - контейнер для всех настроек
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub storage: StorageBackend,
    pub database: Option<DatabaseConfig>,
    pub redis: Option<RedisConfig>,
    pub auth: AuthConfig,
    pub invitations: InvitationConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub live: LiveConfig,
}

// Настройки приложения
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
    pub log_format: LogFormat,
    /// Base of the URLs printed into QR codes and invitations.
    pub public_base_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("expected pretty or json, got '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(format!("expected postgres or memory, got '{other}'")),
        }
    }
}

// Настройки базы данных
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
    pub acquire_timeout_seconds: u64,
}

// Настройки Redis (кеш статистики, необязателен)
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    pub stats_ttl_seconds: u64,
}

/// Seed credentials for the first admin account.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub admin_username: String,
    pub admin_password: String,
    pub admin_display_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvitationConfig {
    pub webhook_url: Option<String>,
    pub timeout_seconds: u64,
}

// Настройки Circuit Breaker
#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LiveConfig {
    pub channel_capacity: usize,
    pub ping_interval_seconds: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has invalid value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

pub const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; `from_env` passes the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = var("DATABASE_URL");
        let storage = match var("STORAGE_BACKEND") {
            Some(raw) => parse("STORAGE_BACKEND", &raw)?,
            None if database_url.is_some() => StorageBackend::Postgres,
            None => StorageBackend::Memory,
        };

        let database = match (storage, database_url) {
            (StorageBackend::Postgres, None) => return Err(ConfigError::Missing("DATABASE_URL")),
            (_, Some(url)) => Some(DatabaseConfig {
                url,
                pool_size: parse_or(&var, "DB_POOL_SIZE", 20)?,
                acquire_timeout_seconds: parse_or(&var, "DB_ACQUIRE_TIMEOUT_SECONDS", 5)?,
            }),
            (StorageBackend::Memory, None) => None,
        };

        let redis = match var("REDIS_URL") {
            Some(url) => Some(RedisConfig {
                url,
                stats_ttl_seconds: parse_or(&var, "STATS_CACHE_TTL_SECONDS", 5)?,
            }),
            None => None,
        };

        let port: u16 = parse_or(&var, "PORT", 8000)?;
        let public_base_url = var("PUBLIC_BASE_URL")
            .unwrap_or_else(|| format!("http://localhost:{port}"));

        Ok(Config {
            app: AppConfig {
                host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port,
                environment: var("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
                rust_log: var("RUST_LOG")
                    .unwrap_or_else(|| "guest_checkin=debug,tower_http=debug".to_string()),
                log_format: parse_or(&var, "LOG_FORMAT", LogFormat::Pretty)?,
                public_base_url,
            },
            storage,
            database,
            redis,
            auth: AuthConfig {
                admin_username: var("ADMIN_USERNAME").unwrap_or_else(|| "admin".to_string()),
                admin_password: var("ADMIN_PASSWORD")
                    .unwrap_or_else(|| DEFAULT_ADMIN_PASSWORD.to_string()),
                admin_display_name: var("ADMIN_DISPLAY_NAME")
                    .unwrap_or_else(|| "Administrator".to_string()),
            },
            invitations: InvitationConfig {
                webhook_url: var("INVITATION_WEBHOOK_URL"),
                timeout_seconds: parse_or(&var, "INVITATION_TIMEOUT_SECONDS", 30)?,
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: parse_or(&var, "CIRCUIT_BREAKER_FAILURE_THRESHOLD", 5)?,
                timeout_seconds: parse_or(&var, "CIRCUIT_BREAKER_TIMEOUT_SECONDS", 60)?,
            },
            live: LiveConfig {
                channel_capacity: parse_or(&var, "LIVE_CHANNEL_CAPACITY", 256)?,
                ping_interval_seconds: parse_or(&var, "LIVE_PING_INTERVAL_SECONDS", 30)?,
            },
        })
    }

    pub fn is_production(&self) -> bool {
        self.app.environment.eq_ignore_ascii_case("production")
    }
}

fn parse<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_or<T, F>(var: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => parse(key, &raw),
        None => Ok(default),
    }
}
