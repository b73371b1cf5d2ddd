//! Common utilities and types shared across shardkv

pub mod config;
pub mod error;
pub mod hash;
pub mod tracing_middleware;
pub mod utils;

pub use config::{NodeConfig, ShardEntry, ShardsConfig};
pub use error::{Error, Result};
pub use hash::{fnv1a_64, shard_key};
pub use tracing_middleware::{request_tracing_middleware, REQUEST_ID_HEADER};
pub use utils::{encode_key, key_path};
