//! Service configuration.
//!
//! Loaded from the YAML file named by `CONFIG_PATH` (default
//! `config/local.yaml`). Every field has a default, so an empty file is a
//! valid local setup. Durations are written the human way: `10m`, `4s`, `250ms`.

use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/local.yaml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub env: String,
    #[serde(alias = "data_base")]
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub kafka: KafkaConfig,
    pub http_server: HttpServerConfig,
    pub ingestion: IngestionConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    #[serde(alias = "adress")]
    pub address: String,
    pub user: String,
    pub password: String,
    pub name: String,
    pub ssl_mode: bool,
    pub max_connections: u32,
    #[serde(deserialize_with = "human_duration")]
    pub acquire_timeout: Duration,
    /// Run `schema.sql` at startup
    pub bootstrap_schema: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    #[serde(alias = "adress")]
    pub address: String,
    #[serde(deserialize_with = "human_duration")]
    pub ttl: Duration,
    /// Upper bound on a single cache connect, GET or SET
    #[serde(deserialize_with = "human_duration")]
    pub op_timeout: Duration,
    #[serde(deserialize_with = "human_duration")]
    pub ping_timeout: Duration,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    #[serde(alias = "adress")]
    pub address: String,
    pub group_id: String,
    pub offset_reset: String,
    pub topic: String,
    #[serde(deserialize_with = "human_duration")]
    pub poll_timeout: Duration,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpServerConfig {
    #[serde(alias = "adress")]
    pub address: String,
    #[serde(deserialize_with = "human_duration")]
    pub timeout: Duration,
    #[serde(deserialize_with = "human_duration")]
    pub idle_timeout: Duration,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// How long shutdown waits for the in-flight message
    #[serde(deserialize_with = "human_duration")]
    pub drain_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            env: "local".to_string(),
            database: DatabaseConfig::default(),
            cache: CacheConfig::default(),
            kafka: KafkaConfig::default(),
            http_server: HttpServerConfig::default(),
            ingestion: IngestionConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            address: "localhost:5432".to_string(),
            user: "user".to_string(),
            password: "password".to_string(),
            name: "orders_db".to_string(),
            ssl_mode: false,
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
            bootstrap_schema: false,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            address: "redis://localhost:6379".to_string(),
            ttl: Duration::from_secs(10 * 60),
            op_timeout: Duration::from_millis(500),
            ping_timeout: Duration::from_secs(2),
        }
    }
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            address: "localhost:29092".to_string(),
            group_id: "order-consumer-group".to_string(),
            offset_reset: "earliest".to_string(),
            topic: "orders".to_string(),
            poll_timeout: Duration::from_millis(100),
        }
    }
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            address: "localhost:8081".to_string(),
            timeout: Duration::from_secs(4),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file does not exist: {0}")]
    NotFound(PathBuf),
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config YAML: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl AppConfig {
    /// Load from `$CONFIG_PATH`, falling back to `config/local.yaml`
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        let config = Self::from_path(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("database.address", &self.database.address),
            ("database.name", &self.database.name),
            ("cache.address", &self.cache.address),
            ("kafka.address", &self.kafka.address),
            ("kafka.group_id", &self.kafka.group_id),
            ("kafka.topic", &self.kafka.topic),
            ("http_server.address", &self.http_server.address),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must not be empty".to_string(),
                });
            }
        }

        if !matches!(self.kafka.offset_reset.as_str(), "earliest" | "latest") {
            return Err(ConfigError::InvalidValue {
                field: "kafka.offset_reset",
                reason: format!("expected earliest or latest, got '{}'", self.kafka.offset_reset),
            });
        }
        if self.cache.ttl.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "cache.ttl",
                reason: "must be > 0".to_string(),
            });
        }
        if self.cache.op_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "cache.op_timeout",
                reason: "must be > 0".to_string(),
            });
        }
        if self.kafka.poll_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "kafka.poll_timeout",
                reason: "must be > 0".to_string(),
            });
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                field: "database.max_connections",
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

impl DatabaseConfig {
    /// Connection URL for sqlx
    pub fn url(&self) -> String {
        let ssl_mode = if self.ssl_mode { "require" } else { "disable" };
        format!(
            "postgres://{}:{}@{}/{}?sslmode={}",
            self.user, self.password, self.address, self.name, ssl_mode
        )
    }
}

fn human_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
}
