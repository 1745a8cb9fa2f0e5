use service_core::config::{self as core_config, get_env, get_env_parsed, is_prod};
use service_core::error::AppError;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PersonConfig {
    pub common: core_config::Config,
    pub storage: StorageConfig,
    pub mongodb: MongoConfig,
    pub generator: GeneratorConfig,
    pub otlp_endpoint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Mongodb,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mongodb" | "mongo" => Ok(StorageBackend::Mongodb),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(format!("unknown storage backend '{}'", other)),
        }
    }
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackend::Mongodb => write!(f, "mongodb"),
            StorageBackend::Memory => write!(f, "memory"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub collection: String,
    /// Capped collection document limit.
    pub max_documents: u64,
    /// Capped collection byte limit.
    pub size_bytes: u64,
    pub tail_retry_ms: u64,
}

impl StorageConfig {
    pub fn tail_retry(&self) -> Duration {
        Duration::from_millis(self.tail_retry_ms)
    }
}

#[derive(Debug, Clone)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
}

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub enabled: bool,
    pub interval_ms: u64,
}

impl GeneratorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

impl PersonConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        let is_prod = is_prod();

        Ok(PersonConfig {
            common: common_config,
            storage: StorageConfig {
                backend: get_env_parsed("STORAGE_BACKEND", StorageBackend::Mongodb)?,
                collection: get_env("PERSON_COLLECTION", Some("person"), false)?,
                max_documents: get_env_parsed("CAPPED_MAX_DOCUMENTS", 10_000)?,
                size_bytes: get_env_parsed("CAPPED_SIZE_BYTES", 10_000)?,
                tail_retry_ms: get_env_parsed("TAIL_RETRY_MS", 1_000)?,
            },
            mongodb: MongoConfig {
                uri: get_env("MONGODB_URI", Some("mongodb://localhost:27017"), is_prod)?,
                database: get_env("MONGODB_DATABASE", Some("reactive"), is_prod)?,
            },
            generator: GeneratorConfig {
                enabled: get_env_parsed("GENERATOR_ENABLED", true)?,
                interval_ms: get_env_parsed("GENERATOR_INTERVAL_MS", 1_000)?,
            },
            otlp_endpoint: std::env::var("OTLP_ENDPOINT").ok(),
        })
    }
}
