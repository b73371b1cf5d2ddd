//! Cluster topology
//!
//! - Shard table built from the shared shard list
//! - Forwarding of requests to the shard that owns their key

pub mod forward;
pub mod shards;

pub use forward::{base_url, Forwarder, FORWARDED_BY_HEADER};
pub use shards::ShardTable;
