//! Configuration for shardkv nodes
//!
//! Node settings are layered: built-in defaults, an optional TOML file,
//! `SHARDKV_*` environment variables, then command-line flags (applied by
//! the binary). The shard list is a separate JSON or TOML document that
//! every node of a cluster must share verbatim.

use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Name of the shard this node serves (must appear in the shard list)
    #[serde(default)]
    pub shard: String,

    /// Bind address for the HTTP API
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Path of the on-disk store
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Reject client writes
    #[serde(default)]
    pub read_only: bool,

    /// Keep data in memory instead of on disk
    #[serde(default)]
    pub in_memory: bool,

    /// Master address to replicate from; makes this node a replica
    #[serde(default)]
    pub master: Option<String>,

    /// Shard list file (JSON or TOML)
    #[serde(default = "default_shards_file")]
    pub shards_file: PathBuf,

    /// Timeout for a forwarded request
    #[serde(default = "default_forward_timeout")]
    pub forward_timeout_ms: u64,

    /// Sleep after finding the master's queue empty
    #[serde(default = "default_replication_idle")]
    pub replication_idle_ms: u64,

    /// Sleep after a failed replication cycle
    #[serde(default = "default_replication_backoff")]
    pub replication_backoff_ms: u64,

    /// Maximum accepted request body
    #[serde(default = "default_max_value_bytes")]
    pub max_value_bytes: usize,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}
fn default_db_path() -> PathBuf {
    PathBuf::from("./shardkv-data")
}
fn default_shards_file() -> PathBuf {
    PathBuf::from("./shards.json")
}
fn default_forward_timeout() -> u64 {
    5_000
}
fn default_replication_idle() -> u64 {
    100
}
fn default_replication_backoff() -> u64 {
    1_000
}
fn default_max_value_bytes() -> usize {
    4 * 1024 * 1024
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            shard: String::new(),
            bind_addr: default_bind_addr(),
            db_path: default_db_path(),
            read_only: false,
            in_memory: false,
            master: None,
            shards_file: default_shards_file(),
            forward_timeout_ms: default_forward_timeout(),
            replication_idle_ms: default_replication_idle(),
            replication_backoff_ms: default_replication_backoff(),
            max_value_bytes: default_max_value_bytes(),
            log_level: default_log_level(),
        }
    }
}

impl NodeConfig {
    /// Load from an optional TOML file and `SHARDKV_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(config::Environment::with_prefix("SHARDKV").try_parsing(true))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Check the settings that cannot be defaulted.
    pub fn validate(&self) -> Result<()> {
        if self.shard.is_empty() {
            return Err(Error::InvalidConfig("shard name cannot be empty".into()));
        }
        if !self.in_memory && self.db_path.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("database path cannot be empty".into()));
        }
        if self.master.as_deref().is_some_and(str::is_empty) {
            return Err(Error::InvalidConfig("master address cannot be empty".into()));
        }
        Ok(())
    }

    /// A node replicating from a master never accepts client writes.
    pub fn effective_read_only(&self) -> bool {
        self.read_only || self.master.is_some()
    }

    pub fn forward_timeout(&self) -> Duration {
        Duration::from_millis(self.forward_timeout_ms)
    }

    pub fn replication_idle(&self) -> Duration {
        Duration::from_millis(self.replication_idle_ms)
    }

    pub fn replication_backoff(&self) -> Duration {
        Duration::from_millis(self.replication_backoff_ms)
    }
}

/// One entry of the shard list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardEntry {
    pub index: usize,
    pub name: String,
    pub address: String,
}

/// The shard list shared by every node of a cluster
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardsConfig {
    pub shards: Vec<ShardEntry>,
}

impl ShardsConfig {
    /// Parse a shard list file; the format follows the file extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(true))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}
