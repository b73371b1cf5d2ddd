//! Local storage
//!
//! - Ordered byte-keyed backends (RocksDB, in-memory)
//! - Buckets: fixed-length key prefixes namespacing one store
//! - Engine: default bucket, replication queue, read-only mode, purge

pub mod bucket;
pub mod engine;
pub mod store;

pub use bucket::{Bucket, BucketId, BucketRegistry, DEFAULT_BUCKET, REPLICATION_BUCKET};
pub use engine::Engine;
pub use store::{BatchOp, MemStore, OrderedStore, RocksStore};
