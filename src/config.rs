//! Server Configuration
//!
//! YAML file layout:
//!
//! ```yaml
//! server:
//!   address: 0.0.0.0:9000
//!   metrics_address: 0.0.0.0:9090
//! storage:
//!   disks: [/data1, /data2, /data3, /data4]
//!   block_size: 1048576
//! cache:
//!   enabled: true
//!   capacity: 268435456
//!   fill_write_timeout_ms: 30000
//! ```
//!
//! Every section and field is optional. Command-line flags are applied on
//! top of the file by the binary.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cache::{
    CacheConfig, ObjectCache, DEFAULT_CACHE_CAPACITY, DEFAULT_FILL_WRITE_TIMEOUT_MS,
};
use crate::error::{Error, Result};
use crate::object_layer::ObjectStore;
use crate::storage::{
    BackendKind, FsBackend, StorageBackend, XlBackend, XlConfig, DEFAULT_BLOCK_SIZE, MIN_XL_DISKS,
};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub cache: CacheSection,
}

/// Listener settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// S3 API bind address
    pub address: String,
    /// Health and metrics bind address
    pub metrics_address: String,
    /// How long in-flight connections may drain on shutdown
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:9000".to_string(),
            metrics_address: "0.0.0.0:9090".to_string(),
            shutdown_grace_secs: 10,
        }
    }
}

impl ServerConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Disk layout. One disk selects the FS backend, 4 to 16 select XL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub disks: Vec<PathBuf>,
    /// Data shards per block; defaults to half the disks
    pub data_shards: Option<usize>,
    /// Parity shards per block; defaults to half the disks
    pub parity_shards: Option<usize>,
    /// Erasure block size in bytes
    pub block_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            disks: Vec::new(),
            data_shards: None,
            parity_shards: None,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl StorageConfig {
    pub fn backend_kind(&self) -> BackendKind {
        if self.disks.len() == 1 {
            BackendKind::Fs
        } else {
            BackendKind::Xl
        }
    }

    /// XL settings derived from the disk list
    pub fn xl_config(&self) -> XlConfig {
        let mut config = XlConfig::new(self.disks.clone()).with_block_size(self.block_size);
        let n = self.disks.len();
        match (self.data_shards, self.parity_shards) {
            (Some(data), Some(parity)) => {
                config.data_shards = data;
                config.parity_shards = parity;
            }
            (Some(data), None) => {
                config.data_shards = data;
                config.parity_shards = n.saturating_sub(data);
            }
            (None, Some(parity)) => {
                config.parity_shards = parity;
                config.data_shards = n.saturating_sub(parity);
            }
            (None, None) => {}
        }
        config
    }

    pub fn validate(&self) -> Result<()> {
        match self.disks.len() {
            0 => Err(Error::Config("no disks configured".into())),
            1 => Ok(()),
            n if n < MIN_XL_DISKS => Err(Error::Config(format!(
                "{} disks configured; use 1 for FS or at least {} for XL",
                n, MIN_XL_DISKS
            ))),
            _ => self.xl_config().validate(),
        }
    }

    /// Open the configured backend, creating disk roots as needed
    pub async fn open_backend(&self) -> Result<Arc<dyn StorageBackend>> {
        self.validate()?;
        let backend: Arc<dyn StorageBackend> = match self.backend_kind() {
            BackendKind::Fs => Arc::new(FsBackend::new(&self.disks[0]).await?),
            _ => Arc::new(XlBackend::new(self.xl_config()).await?),
        };
        info!(kind = %backend.kind(), disks = self.disks.len(), "Storage backend ready");
        Ok(backend)
    }
}

/// Object cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub enabled: bool,
    /// Byte budget
    pub capacity: u64,
    /// Largest cacheable object; defaults to half the capacity
    pub max_object_size: Option<u64>,
    /// How long a filling reader's sink may stall before the fill is purged
    pub fill_write_timeout_ms: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: DEFAULT_CACHE_CAPACITY,
            max_object_size: None,
            fill_write_timeout_ms: DEFAULT_FILL_WRITE_TIMEOUT_MS,
        }
    }
}

impl CacheSection {
    pub fn cache_config(&self) -> CacheConfig {
        let mut config = CacheConfig::with_capacity(self.capacity);
        if let Some(max) = self.max_object_size {
            config.max_object_size = max;
        }
        config.fill_write_timeout_ms = self.fill_write_timeout_ms;
        config
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&raw)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).map_err(|e| Error::Config(format!("invalid config: {}", e)))
    }

    pub fn validate(&self) -> Result<()> {
        self.storage.validate()?;
        if self.cache.enabled {
            self.cache.cache_config().validate()?;
        }
        Ok(())
    }

    /// Build the object store described by this configuration
    pub async fn build_store(&self) -> Result<ObjectStore> {
        self.validate()?;
        let backend = self.storage.open_backend().await?;

        if !self.cache.enabled {
            info!("Object cache disabled");
            return Ok(ObjectStore::new(backend));
        }

        let cache = ObjectCache::new(self.cache.cache_config())?;
        info!(
            capacity = cache.capacity(),
            max_object_size = cache.config().max_object_size,
            "Object cache enabled"
        );
        Ok(ObjectStore::with_cache(backend, Arc::new(cache)))
    }
}
