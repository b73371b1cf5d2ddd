//! Storage engine
//!
//! Wraps an ordered byte-keyed store with bucket namespacing, a read-only
//! mode, the replication queue of a master node, and the bulk purge used
//! after topology changes. Knows nothing about shards or the network.

use crate::common::{Error, Result};
use crate::storage::bucket::{Bucket, BucketId, BucketRegistry};
use crate::storage::store::{BatchOp, MemStore, OrderedStore, RocksStore};
use std::path::Path;
use std::sync::Arc;

/// Storage engine shared by every request handler of a node
#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn OrderedStore>,
    read_only: bool,
    buckets: Arc<BucketRegistry>,
}

impl Engine {
    /// Open (or create) an on-disk engine
    pub fn open(path: impl AsRef<Path>, read_only: bool) -> Result<Self> {
        let store = RocksStore::open(path)?;
        Ok(Self::with_store(Arc::new(store), read_only))
    }

    /// An engine whose data lives only as long as the process
    pub fn in_memory(read_only: bool) -> Self {
        Self::with_store(Arc::new(MemStore::new()), read_only)
    }

    pub fn with_store(store: Arc<dyn OrderedStore>, read_only: bool) -> Self {
        Self {
            store,
            read_only,
            buckets: Arc::new(BucketRegistry::new()),
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Handle for a named bucket, registering the name on first use.
    pub fn bucket(&self, name: &str) -> Result<Bucket> {
        let id = self.buckets.get_or_create(name)?;
        Ok(self.bucket_by_id(id))
    }

    fn bucket_by_id(&self, id: BucketId) -> Bucket {
        Bucket::new(id, self.store.clone(), self.read_only)
    }

    fn default_bucket(&self) -> Bucket {
        self.bucket_by_id(BucketId::DEFAULT)
    }

    fn replication_bucket(&self) -> Bucket {
        self.bucket_by_id(BucketId::REPLICATION)
    }

    /// Read a key from the default bucket
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.default_bucket().get(key)
    }

    /// Write a key into the default bucket and queue it for replication.
    ///
    /// Both writes go through a single atomic batch, so a reader never sees
    /// the data write without its replication entry.
    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if self.read_only {
            return Err(Error::ReadOnly);
        }
        if key.is_empty() {
            return Err(Error::KeyLength);
        }

        self.store.write_batch(vec![
            BatchOp::Put {
                key: self.default_bucket().prefixed(key),
                value: value.to_vec(),
            },
            BatchOp::Put {
                key: self.replication_bucket().prefixed(key),
                value: value.to_vec(),
            },
        ])
    }

    /// Remove a key from the default bucket. The replication queue is left
    /// untouched.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        if self.read_only {
            return Err(Error::ReadOnly);
        }
        self.default_bucket().delete(key)
    }

    /// Delete every key of the default bucket matching `doesnt_belong`.
    ///
    /// Matching keys are collected first and then deleted one at a time.
    /// A failed delete stops the purge; earlier deletions stay applied.
    /// Returns the number of keys removed.
    pub fn delete_not_belonging<F>(&self, doesnt_belong: F) -> Result<usize>
    where
        F: Fn(&[u8]) -> bool,
    {
        if self.read_only {
            return Err(Error::ReadOnly);
        }

        let bucket = self.default_bucket();
        let keys: Vec<Vec<u8>> = bucket
            .keys()?
            .into_iter()
            .filter(|key| doesnt_belong(key))
            .collect();

        for key in &keys {
            tracing::debug!(key = %String::from_utf8_lossy(key), "deleting key not owned by this shard");
            bucket.delete(key)?;
        }

        Ok(keys.len())
    }

    /// The lowest-ordered pending replication entry. The entry stays queued.
    pub fn next_replica(&self) -> Result<(Vec<u8>, Vec<u8>)> {
        self.replication_bucket().first()?.ok_or(Error::NoFirstKey)
    }

    /// Retire a replication entry, but only if it still holds `expected`.
    ///
    /// A newer write for the same key replaces the queued value; that newer
    /// value must not be retired by a replica reporting the older one.
    pub fn delete_replication_key(&self, key: &[u8], expected: &[u8]) -> Result<()> {
        let bucket = self.replication_bucket();
        let value = bucket.get(key)?;
        if value != expected {
            return Err(Error::ValueMismatch);
        }
        bucket.delete(key)
    }

    /// Apply an update received from the master. Skips the replication queue
    /// and the read-only check.
    pub fn set_on_replica(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.default_bucket().apply(key, value)
    }

    /// Buckets known to this process, reserved ones included.
    pub fn bucket_count(&self) -> usize {
        self.buckets.registered_count()
    }

    /// Number of entries waiting in the replication queue.
    pub fn replication_backlog(&self) -> Result<usize> {
        Ok(self.replication_bucket().keys()?.len())
    }
}
