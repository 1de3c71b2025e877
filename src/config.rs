//! Configuration for the substrate components.
//!
//! Every struct deserializes from JSON with missing fields taking their defaults, so a
//! config file only needs to mention what it overrides:
//!
//! ```
//! use hearth::config::SubstrateConfig;
//!
//! let config = SubstrateConfig::from_json_str(r#"{ "thread_pool": { "workers": 2 } }"#).unwrap();
//! assert_eq!(config.thread_pool.resolved_workers(), 2);
//! assert_eq!(config.arena.block_size, 64 * 1024);
//! ```

use std::fs;
use std::num::NonZeroUsize;
use std::path::Path;
use std::thread;

use serde::{Deserialize, Serialize};

use crate::collections::hash::DEFAULT_MAX_LOAD_FACTOR;
use crate::error::ConfigError;

/// Environment variable overriding the default worker count.
pub const WORKERS_ENV: &str = "HEARTH_WORKERS";

/// Worker count used when neither configuration nor the platform supplies one.
pub const FALLBACK_WORKERS: usize = 4;

/// Worker count when none is configured: `HEARTH_WORKERS` if it parses to a non-zero
/// number, else the available parallelism, else [`FALLBACK_WORKERS`].
pub fn default_worker_count() -> usize {
    std::env::var(WORKERS_ENV)
        .ok()
        .and_then(|raw| raw.trim().parse::<NonZeroUsize>().ok())
        .or_else(|| thread::available_parallelism().ok())
        .map_or(FALLBACK_WORKERS, NonZeroUsize::get)
}

/// Arena configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArenaConfig {
    /// Minimum size of each reserved block, in bytes.
    #[serde(default = "default_block_size")]
    pub block_size: usize,
}

fn default_block_size() -> usize {
    crate::alloc::DEFAULT_BLOCK_SIZE
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            block_size: default_block_size(),
        }
    }
}

impl ArenaConfig {
    /// Sets the block size.
    pub fn block_size(mut self, bytes: usize) -> Self {
        self.block_size = bytes;
        self
    }
}

/// Thread pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThreadPoolConfig {
    /// Number of workers; `None` picks [`default_worker_count`].
    #[serde(default)]
    pub workers: Option<usize>,

    /// Prefix for worker thread names; workers are named `{thread_name}-{index}`.
    #[serde(default = "default_thread_name")]
    pub thread_name: String,

    /// Stack size for each worker, in bytes. `None` keeps the platform default.
    #[serde(default)]
    pub stack_size: Option<usize>,
}

fn default_thread_name() -> String {
    "hearth-worker".to_string()
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            workers: None,
            thread_name: default_thread_name(),
            stack_size: None,
        }
    }
}

impl ThreadPoolConfig {
    /// Sets an explicit worker count.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Sets the thread name prefix.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Sets the worker stack size.
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// The worker count this configuration yields.
    pub fn resolved_workers(&self) -> usize {
        self.workers.unwrap_or_else(default_worker_count)
    }
}

/// Hash map configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HashMapConfig {
    /// Number of entries the first table should hold without rehashing.
    #[serde(default)]
    pub initial_capacity: usize,

    /// Rehash threshold, in the open interval (0, 1).
    #[serde(default = "default_max_load_factor")]
    pub max_load_factor: f32,
}

fn default_max_load_factor() -> f32 {
    DEFAULT_MAX_LOAD_FACTOR
}

impl Default for HashMapConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 0,
            max_load_factor: default_max_load_factor(),
        }
    }
}

/// Configuration for a whole substrate: one section per component.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SubstrateConfig {
    /// Arena section.
    pub arena: ArenaConfig,
    /// Thread pool section.
    pub thread_pool: ThreadPoolConfig,
    /// Hash map section.
    pub hash_map: HashMapConfig,
}

impl SubstrateConfig {
    /// Parses and validates JSON text.
    ///
    /// # Errors
    /// [`ConfigError::Parse`] for malformed JSON or unknown fields, or the validation
    /// errors of [`validate`](Self::validate).
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    ///
    /// # Errors
    /// [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`from_json_str`](Self::from_json_str).
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Checks values serde cannot reject on its own.
    ///
    /// # Errors
    /// [`ConfigError::ZeroBlockSize`], [`ConfigError::ZeroWorkers`] or
    /// [`ConfigError::InvalidLoadFactor`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.arena.block_size == 0 {
            return Err(ConfigError::ZeroBlockSize);
        }
        if self.thread_pool.workers == Some(0) {
            return Err(ConfigError::ZeroWorkers);
        }
        let load = self.hash_map.max_load_factor;
        if !(load > 0.0 && load < 1.0) {
            return Err(ConfigError::InvalidLoadFactor(load));
        }
        Ok(())
    }

    /// Serializes to pretty-printed JSON.
    ///
    /// # Errors
    /// [`ConfigError::Parse`] if serialization fails.
    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
