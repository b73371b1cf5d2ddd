//! # shardkv
//!
//! A sharded, replicated key-value store:
//! - Bucket-namespaced storage engine on an ordered byte-keyed store (RocksDB)
//! - Deterministic FNV-1a sharding with transparent request forwarding
//! - Asynchronous single-master → replica synchronization through a
//!   replication queue, without a shared log or consensus
//!
//! ## Architecture
//!
//! ```text
//!   client ──► any node ──(key not owned)──► owning node
//!                 │                              │
//!                 ▼                              ▼
//!          Engine (shard 0)               Engine (shard 1)
//!           ├─ default bucket              ├─ default bucket
//!           └─ replication bucket ◄─┐      └─ replication bucket
//!                                   │ GET /next, /del-rep
//!                          replica of shard 0 (read-only)
//! ```
//!
//! ## Usage
//!
//! ### Shard list (shared by every node)
//! ```json
//! {"shards": [
//!   {"index": 0, "name": "sh1", "address": "localhost:8080"},
//!   {"index": 1, "name": "sh2", "address": "localhost:8081"}
//! ]}
//! ```
//!
//! ### Start nodes
//! ```bash
//! shardkv-node --shard sh1 --bind 127.0.0.1:8080 --db ./sh1 --shards shards.json
//! shardkv-node --shard sh2 --bind 127.0.0.1:8081 --db ./sh2 --shards shards.json
//!
//! # a replica of sh1
//! shardkv-node --shard sh1 --bind 127.0.0.1:9080 --db ./sh1-r \
//!   --shards shards.json --master 127.0.0.1:8080
//! ```
//!
//! ### Use the CLI
//! ```bash
//! shardkv --node localhost:8081 set alpha x
//! shardkv --node localhost:8080 get alpha
//! shardkv --node localhost:8080 purge
//! ```

pub mod cluster;
pub mod common;
pub mod node;
pub mod replica;
pub mod storage;

// Re-export commonly used types
pub use cluster::ShardTable;
pub use common::{Error, NodeConfig, Result, ShardsConfig};
pub use node::NodeServer;
pub use storage::Engine;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
