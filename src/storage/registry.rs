//! Driver registry
//!
//! Drivers register a factory together with a declarative schema of their
//! settings. The registry validates a storage's `addition` map against that
//! schema (defaults, required fields, types, allowed choices) before the
//! factory ever sees it.

use crate::storage::local::{self, LocalStorage};
use crate::storage::memory::{self, MemoryOptions, MemoryStorage};
use crate::storage::{Backend, Capabilities, StorageInfo};
use crate::GatewayError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Semantic type of a configuration field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Single-line string
    String,
    /// Multi-line string
    Text,
    /// Boolean switch
    Bool,
    /// Integer
    Number,
    /// Floating point number
    Float,
    /// One of a fixed set of strings
    Select,
}

/// One declared driver setting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigField {
    /// Key in the `addition` map
    pub name: String,

    /// Semantic type
    pub kind: FieldType,

    /// Must be present after defaults are applied
    pub required: bool,

    /// Default, written in the field's textual form
    pub default: Option<String>,

    /// Allowed values for `Select` fields
    pub options: Vec<String>,

    /// Help text
    pub help: String,
}

impl ConfigField {
    /// Declare a field
    pub fn new(name: &str, kind: FieldType) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required: false,
            default: None,
            options: Vec::new(),
            help: String::new(),
        }
    }

    /// Mark the field as required
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Set the default value
    pub fn default_value(mut self, value: &str) -> Self {
        self.default = Some(value.to_string());
        self
    }

    /// Set the allowed choices
    pub fn options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|o| o.to_string()).collect();
        self
    }

    /// Set the help text
    pub fn help(mut self, help: &str) -> Self {
        self.help = help.to_string();
        self
    }

    fn parse_default(&self, raw: &str) -> crate::Result<Value> {
        let invalid = || {
            GatewayError::ConfigError(format!(
                "Invalid default '{}' for field {}",
                raw, self.name
            ))
        };
        Ok(match self.kind {
            FieldType::String | FieldType::Text | FieldType::Select => Value::from(raw),
            FieldType::Bool => Value::from(raw.parse::<bool>().map_err(|_| invalid())?),
            FieldType::Number => Value::from(raw.parse::<i64>().map_err(|_| invalid())?),
            FieldType::Float => Value::from(raw.parse::<f64>().map_err(|_| invalid())?),
        })
    }

    fn check(&self, value: &Value) -> crate::Result<()> {
        let type_ok = match self.kind {
            FieldType::String | FieldType::Text => value.is_string(),
            FieldType::Bool => value.is_boolean(),
            FieldType::Number => value.is_i64() || value.is_u64(),
            FieldType::Float => value.is_number(),
            FieldType::Select => value
                .as_str()
                .map(|v| self.options.iter().any(|o| o == v))
                .unwrap_or(false),
        };
        if type_ok {
            Ok(())
        } else if self.kind == FieldType::Select {
            Err(GatewayError::ConfigError(format!(
                "Field {} must be one of [{}], got {}",
                self.name,
                self.options.join(","),
                value
            )))
        } else {
            Err(GatewayError::ConfigError(format!(
                "Field {} expects {:?}, got {}",
                self.name, self.kind, value
            )))
        }
    }
}

/// A mounted storage's persisted configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage identity
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,

    /// Virtual path the storage is mounted at
    pub mount_path: String,

    /// Registered driver name
    pub driver: String,

    /// Driver-specific settings
    #[serde(default)]
    pub addition: Value,

    /// Skip this storage when mounting
    #[serde(default)]
    pub disabled: bool,
}

impl StorageConfig {
    /// Create a configuration with a fresh identity
    pub fn new(mount_path: &str, driver: &str, addition: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            mount_path: crate::mount::clean_path(mount_path),
            driver: driver.to_string(),
            addition,
            disabled: false,
        }
    }

    /// Storage identity derived from this configuration
    pub fn storage_info(&self) -> StorageInfo {
        StorageInfo {
            id: self.id,
            mount_path: crate::mount::clean_path(&self.mount_path),
            driver: self.driver.clone(),
        }
    }
}

/// Static description of a driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverInfo {
    /// Registry key
    pub name: String,

    /// Declared capabilities
    pub capabilities: Capabilities,

    /// Settings schema
    pub fields: Vec<ConfigField>,
}

impl DriverInfo {
    /// Apply defaults and check every declared field of `addition`
    pub fn validate(&self, addition: &mut Map<String, Value>) -> crate::Result<()> {
        for field in &self.fields {
            if !addition.contains_key(&field.name) {
                if let Some(raw) = &field.default {
                    addition.insert(field.name.clone(), field.parse_default(raw)?);
                }
            }
            match addition.get(&field.name) {
                Some(value) => field.check(value)?,
                None if field.required => {
                    return Err(GatewayError::ConfigError(format!(
                        "Driver {} requires field {}",
                        self.name, field.name
                    )));
                }
                None => {}
            }
        }
        Ok(())
    }
}

/// Builds a storage instance from a validated configuration
pub type DriverFactory =
    Arc<dyn Fn(&StorageConfig) -> crate::Result<Arc<dyn Backend>> + Send + Sync>;

struct RegisteredDriver {
    info: DriverInfo,
    factory: DriverFactory,
}

/// Registry of available drivers
#[derive(Default)]
pub struct DriverRegistry {
    drivers: HashMap<String, RegisteredDriver>,
}

impl DriverRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in `memory` and `local` drivers
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.insert(memory_driver_info(), |config| {
            let options: MemoryOptions = serde_json::from_value(config.addition.clone())?;
            Ok(Arc::new(MemoryStorage::from_info(config.storage_info(), options)) as Arc<dyn Backend>)
        });
        registry.insert(local_driver_info(), |config| {
            let root = config
                .addition
                .get("root_folder_path")
                .and_then(Value::as_str)
                .unwrap_or_default();
            Ok(Arc::new(LocalStorage::from_info(config.storage_info(), root)) as Arc<dyn Backend>)
        });
        registry
    }

    /// Register a driver; names must be unique
    pub fn register<F>(&mut self, info: DriverInfo, factory: F) -> crate::Result<()>
    where
        F: Fn(&StorageConfig) -> crate::Result<Arc<dyn Backend>> + Send + Sync + 'static,
    {
        if self.drivers.contains_key(&info.name) {
            return Err(GatewayError::ConfigError(format!(
                "Driver {} is already registered",
                info.name
            )));
        }
        self.insert(info, factory);
        Ok(())
    }

    fn insert<F>(&mut self, info: DriverInfo, factory: F)
    where
        F: Fn(&StorageConfig) -> crate::Result<Arc<dyn Backend>> + Send + Sync + 'static,
    {
        debug!("Registered driver {}", info.name);
        self.drivers.insert(
            info.name.clone(),
            RegisteredDriver {
                info,
                factory: Arc::new(factory),
            },
        );
    }

    /// Registered driver names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.drivers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Description of a driver
    pub fn info(&self, name: &str) -> Option<&DriverInfo> {
        self.drivers.get(name).map(|d| &d.info)
    }

    /// Validate a configuration and instantiate its storage
    pub fn create(&self, config: &StorageConfig) -> crate::Result<Arc<dyn Backend>> {
        let driver = self
            .drivers
            .get(&config.driver)
            .ok_or_else(|| GatewayError::DriverNotFound(config.driver.clone()))?;

        let mut addition = match &config.addition {
            Value::Null => Map::new(),
            Value::Object(map) => map.clone(),
            other => {
                return Err(GatewayError::ConfigError(format!(
                    "Addition for {} must be an object, got {}",
                    config.mount_path, other
                )))
            }
        };
        driver.info.validate(&mut addition)?;

        let mut validated = config.clone();
        validated.addition = Value::Object(addition);
        let storage = (driver.factory)(&validated)?;
        info!(
            "Created {} storage for mount path {}",
            config.driver, config.mount_path
        );
        Ok(storage)
    }
}

fn memory_driver_info() -> DriverInfo {
    DriverInfo {
        name: memory::DRIVER_NAME.to_string(),
        capabilities: MemoryStorage::declared_capabilities(false),
        fields: vec![
            ConfigField::new("no_upload", FieldType::Bool)
                .default_value("false")
                .help("refuse uploads and directory creation"),
            ConfigField::new("native_move", FieldType::Bool).default_value("true"),
            ConfigField::new("native_copy", FieldType::Bool).default_value("true"),
        ],
    }
}

fn local_driver_info() -> DriverInfo {
    DriverInfo {
        name: local::DRIVER_NAME.to_string(),
        capabilities: LocalStorage::declared_capabilities(),
        fields: vec![ConfigField::new("root_folder_path", FieldType::String)
            .required()
            .help("host directory exposed by this storage")],
    }
}
