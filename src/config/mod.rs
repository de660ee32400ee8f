//! Configuration

use crate::storage::registry::StorageConfig;
use crate::transfer::TransferConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Configuration for the storage gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of worker tasks
    pub worker_count: usize,

    /// Maximum number of tasks waiting for a worker
    pub max_queue_size: usize,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_secs: u64,

    /// Default log filter, overridden by `RUST_LOG`
    pub log_level: String,

    /// How many times a copied file is looked up before giving up
    pub verify_attempts: u32,

    /// Delay between two lookups of a copied file, in milliseconds
    pub verify_interval_ms: u64,

    /// Storages mounted at startup
    pub mounts: Vec<MountConfig>,
}

/// A storage mounted at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountConfig {
    /// Virtual path the storage is attached at
    pub mount_path: String,

    /// Registered driver name
    pub driver: String,

    /// Driver-specific settings
    #[serde(default)]
    pub addition: serde_json::Map<String, serde_json::Value>,

    /// Skip this storage at startup
    #[serde(default)]
    pub disabled: bool,
}

impl MountConfig {
    /// Storage configuration with a fresh identity
    pub fn storage_config(&self) -> StorageConfig {
        let mut config = StorageConfig::new(
            &self.mount_path,
            &self.driver,
            serde_json::Value::Object(self.addition.clone()),
        );
        config.disabled = self.disabled;
        config
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_count: num_cpus(),
            max_queue_size: 10000,
            shutdown_timeout_secs: 30,
            log_level: "info".to_string(),
            verify_attempts: 3,
            verify_interval_ms: 1000,
            mounts: Vec::new(),
        }
    }
}

impl Config {
    /// Create a new configuration with custom values
    pub fn new(worker_count: usize) -> Self {
        Self {
            worker_count,
            ..Default::default()
        }
    }

    /// Load configuration from file, environment variables, or defaults
    pub fn load() -> crate::Result<Self> {
        if let Ok(config_path) = env::var("GATEWAY_CONFIG") {
            info!("Loading config from GATEWAY_CONFIG: {}", config_path);
            return Self::from_file(&config_path);
        }

        let default_paths = [
            "config.yaml",
            "config.toml",
            "config/config.yaml",
            "config/config.toml",
        ];

        for path in default_paths {
            if Path::new(path).exists() {
                info!("Loading config from: {}", path);
                return Self::from_file(path);
            }
        }

        if let Some(config) = Self::from_env()? {
            info!("Loaded config from environment variables");
            return Ok(config);
        }

        warn!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a file (YAML or TOML)
    pub fn from_file(path: &str) -> crate::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()
            .map_err(|e| {
                crate::GatewayError::ConfigError(format!("Failed to load config file: {}", e))
            })?;

        let config: Config = settings.try_deserialize().map_err(|e| {
            crate::GatewayError::ConfigError(format!("Failed to parse config: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables; `None` when none of
    /// the `GATEWAY_*` variables is set
    pub fn from_env() -> crate::Result<Option<Self>> {
        let mut config = Self::default();
        let mut found_any = false;

        if let Some(val) = read_env("GATEWAY_WORKER_COUNT")? {
            config.worker_count = val;
            found_any = true;
        }

        if let Some(val) = read_env("GATEWAY_MAX_QUEUE_SIZE")? {
            config.max_queue_size = val;
            found_any = true;
        }

        if let Some(val) = read_env("GATEWAY_SHUTDOWN_TIMEOUT_SECS")? {
            config.shutdown_timeout_secs = val;
            found_any = true;
        }

        if let Ok(val) = env::var("GATEWAY_LOG_LEVEL") {
            config.log_level = val;
            found_any = true;
        }

        if let Some(val) = read_env("GATEWAY_VERIFY_ATTEMPTS")? {
            config.verify_attempts = val;
            found_any = true;
        }

        if let Some(val) = read_env("GATEWAY_VERIFY_INTERVAL_MS")? {
            config.verify_interval_ms = val;
            found_any = true;
        }

        if !found_any {
            return Ok(None);
        }

        config.validate()?;
        Ok(Some(config))
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.worker_count == 0 {
            return Err(crate::GatewayError::ConfigError(
                "Worker count must be greater than 0".to_string(),
            ));
        }

        if self.max_queue_size == 0 {
            return Err(crate::GatewayError::ConfigError(
                "Max queue size must be greater than 0".to_string(),
            ));
        }

        if self.verify_attempts == 0 {
            return Err(crate::GatewayError::ConfigError(
                "Verify attempts must be greater than 0".to_string(),
            ));
        }

        for mount in &self.mounts {
            if !mount.mount_path.starts_with('/') {
                return Err(crate::GatewayError::ConfigError(format!(
                    "Mount path must be absolute: {}",
                    mount.mount_path
                )));
            }
        }

        Ok(())
    }

    /// Settings of the transfer engine
    pub fn transfer(&self) -> TransferConfig {
        TransferConfig {
            verify_attempts: self.verify_attempts,
            verify_interval: Duration::from_millis(self.verify_interval_ms),
        }
    }
}

fn read_env<T>(key: &str) -> crate::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(val) => val.parse().map(Some).map_err(|e| {
            crate::GatewayError::ConfigError(format!(
                "Invalid {}: {}",
                key.trim_start_matches("GATEWAY_"),
                e
            ))
        }),
        Err(_) => Ok(None),
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
