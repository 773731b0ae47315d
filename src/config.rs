use std::{fs, path::Path, time::Duration};

use serde::Deserialize;

use crate::{EvflowError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// store config
    pub store: StoreConfig,
    /// message processor config
    pub processor: ProcessorConfig,
    /// workflow execution defaults
    pub workflow: WorkflowConfig,
    /// number of worker tasks per message queue, defaults to 16
    pub worker_number: u16,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    /// store type
    #[serde(default)]
    pub store_type: StoreType,
    /// postgres config
    pub postgres: Option<PostgresConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    #[default]
    Mem,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostgresConfig {
    /// postgres database url
    pub database_url: String,
    /// pool size, defaults to 50
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// how many times a message is handled before it is dropped
    pub max_attempt_count: u32,
    /// delay before a yielded message is redelivered, in milliseconds
    pub retry_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// timeout for workflows that do not declare one, in milliseconds
    pub default_timeout_ms: u64,
    /// lifetime of persisted entities, in milliseconds
    pub entity_ttl_ms: u64,
    /// interval of the expired entity sweep, in milliseconds. 0 disables it
    pub gc_interval_ms: u64,
}

fn default_max_connections() -> u32 {
    50
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            processor: ProcessorConfig::default(),
            workflow: WorkflowConfig::default(),
            worker_number: 16,
        }
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_attempt_count: 5,
            retry_interval_ms: 1000,
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 60 * 60 * 1000,
            entity_ttl_ms: 7 * 24 * 60 * 60 * 1000,
            gc_interval_ms: 60 * 1000,
        }
    }
}

impl ProcessorConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

impl WorkflowConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn entity_ttl(&self) -> Duration {
        Duration::from_millis(self.entity_ttl_ms)
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_millis(self.gc_interval_ms)
    }
}

impl Config {
    pub fn create<T: AsRef<Path>>(path: T) -> Result<Self> {
        let data = fs::read_to_string(path.as_ref())
            .map_err(|e| EvflowError::Config(format!("failed to load config file {:?}: {}", path.as_ref(), e)))?;

        Self::load_from_str(data.as_str())
    }

    pub fn load_from_str(toml_str: &str) -> Result<Self> {
        let config = toml::from_str::<Config>(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.worker_number == 0 {
            return Err(EvflowError::Config("worker_number must be at least 1".to_string()));
        }
        if self.processor.max_attempt_count == 0 {
            return Err(EvflowError::Config("processor.max_attempt_count must be at least 1".to_string()));
        }
        if self.workflow.entity_ttl_ms <= self.workflow.default_timeout_ms {
            return Err(EvflowError::Config(format!(
                "workflow.entity_ttl_ms ({}) must exceed workflow.default_timeout_ms ({}) so running executions are never expired",
                self.workflow.entity_ttl_ms, self.workflow.default_timeout_ms
            )));
        }
        if self.store.store_type == StoreType::Postgres && self.store.postgres.is_none() {
            return Err(EvflowError::Config("store.postgres is required when store_type is postgres".to_string()));
        }
        Ok(())
    }
}
