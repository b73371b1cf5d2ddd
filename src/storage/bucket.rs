//! Buckets: key namespaces inside one ordered store
//!
//! A bucket is a 2-byte id prepended to every key it touches. The
//! name → id registry belongs to the engine that created it and is shared
//! by all request handlers behind a reader/writer lock.

use crate::common::{Error, Result};
use crate::storage::store::OrderedStore;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Length of every bucket id in bytes
pub const BUCKET_ID_LEN: usize = 2;

/// Bucket holding application data
pub const DEFAULT_BUCKET: &str = "de";

/// Bucket holding writes not yet applied by the replica
pub const REPLICATION_BUCKET: &str = "re";

/// Ids at or above this value are never handed out to named buckets.
const FIRST_RESERVED_ID: u16 = 0xff00;

/// Fixed-length key prefix identifying a bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BucketId([u8; BUCKET_ID_LEN]);

impl BucketId {
    pub const DEFAULT: BucketId = BucketId(*b"de");
    pub const REPLICATION: BucketId = BucketId(*b"re");

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    fn from_u16(id: u16) -> Self {
        BucketId(id.to_be_bytes())
    }

    fn is_reserved(&self) -> bool {
        *self == Self::DEFAULT
            || *self == Self::REPLICATION
            || u16::from_be_bytes(self.0) >= FIRST_RESERVED_ID
    }
}

impl fmt::Display for BucketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}{:02x}", self.0[0], self.0[1])
    }
}

struct RegistryState {
    by_name: HashMap<String, BucketId>,
    next_id: u16,
}

/// Name → id mapping for the buckets of one engine
pub struct BucketRegistry {
    state: RwLock<RegistryState>,
}

impl BucketRegistry {
    /// A registry holding only the two reserved buckets.
    pub fn new() -> Self {
        let mut by_name = HashMap::new();
        by_name.insert(DEFAULT_BUCKET.to_string(), BucketId::DEFAULT);
        by_name.insert(REPLICATION_BUCKET.to_string(), BucketId::REPLICATION);
        Self {
            state: RwLock::new(RegistryState {
                by_name,
                next_id: 1,
            }),
        }
    }

    pub fn lookup(&self, name: &str) -> Option<BucketId> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.by_name.get(name).copied()
    }

    /// Return the id registered for `name`, allocating one on first use.
    pub fn get_or_create(&self, name: &str) -> Result<BucketId> {
        if name.is_empty() {
            return Err(Error::BucketName);
        }
        if let Some(id) = self.lookup(name) {
            return Ok(id);
        }

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        // Another task may have registered the name between the two locks.
        if let Some(id) = state.by_name.get(name) {
            return Ok(*id);
        }

        let id = loop {
            if state.next_id >= FIRST_RESERVED_ID {
                return Err(Error::BucketLimit);
            }
            let candidate = BucketId::from_u16(state.next_id);
            state.next_id += 1;
            if !candidate.is_reserved() {
                break candidate;
            }
        };

        state.by_name.insert(name.to_string(), id);
        tracing::debug!(bucket = name, id = %id, "registered bucket");
        Ok(id)
    }

    /// Number of registered names, reserved buckets included.
    pub fn registered_count(&self) -> usize {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.by_name.len()
    }
}

impl Default for BucketRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for the keys of one bucket
#[derive(Clone)]
pub struct Bucket {
    id: BucketId,
    store: Arc<dyn OrderedStore>,
    read_only: bool,
}

impl Bucket {
    pub(crate) fn new(id: BucketId, store: Arc<dyn OrderedStore>, read_only: bool) -> Self {
        Self {
            id,
            store,
            read_only,
        }
    }

    pub fn id(&self) -> BucketId {
        self.id
    }

    /// Place a key into the bucket
    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if self.read_only {
            return Err(Error::ReadOnly);
        }
        self.apply(key, value)
    }

    /// Get a key from the bucket
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        if key.is_empty() {
            return Err(Error::KeyLength);
        }
        self.store
            .get(&self.prefixed(key))?
            .ok_or_else(|| Error::NotFound(String::from_utf8_lossy(key).into_owned()))
    }

    /// Remove a key from the bucket; a missing key is not an error.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        if self.read_only {
            return Err(Error::ReadOnly);
        }
        if key.is_empty() {
            return Err(Error::KeyLength);
        }
        self.store.delete(&self.prefixed(key))
    }

    /// Every key in the bucket, without the prefix, in byte order.
    pub fn keys(&self) -> Result<Vec<Vec<u8>>> {
        Ok(self
            .store
            .keys_with_prefix(self.id.as_bytes())?
            .into_iter()
            .map(|k| k[BUCKET_ID_LEN..].to_vec())
            .collect())
    }

    /// The lowest-ordered entry of the bucket.
    pub fn first(&self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        Ok(self
            .store
            .first_with_prefix(self.id.as_bytes())?
            .map(|(k, v)| (k[BUCKET_ID_LEN..].to_vec(), v)))
    }

    /// Write without the read-only check. Replicas apply master updates
    /// through this path.
    pub(crate) fn apply(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::KeyLength);
        }
        self.store.put(&self.prefixed(key), value)
    }

    pub(crate) fn prefixed(&self, key: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(BUCKET_ID_LEN + key.len());
        buf.extend_from_slice(self.id.as_bytes());
        buf.extend_from_slice(key);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::store::MemStore;

    #[test]
    fn test_registry_is_idempotent() {
        let registry = BucketRegistry::new();
        let a = registry.get_or_create("test").unwrap();
        let b = registry.get_or_create("test").unwrap();
        assert_eq!(a, b);
        assert_eq!(registry.registered_count(), 3);

        let other = registry.get_or_create("other").unwrap();
        assert_ne!(a, other);
    }

    #[test]
    fn test_reserved_buckets() {
        let registry = BucketRegistry::new();
        assert_eq!(registry.lookup(DEFAULT_BUCKET), Some(BucketId::DEFAULT));
        assert_eq!(
            registry.get_or_create(REPLICATION_BUCKET).unwrap(),
            BucketId::REPLICATION
        );
    }

    #[test]
    fn test_empty_bucket_name() {
        let registry = BucketRegistry::new();
        assert!(matches!(registry.get_or_create(""), Err(Error::BucketName)));
    }

    #[test]
    fn test_concurrent_creation_yields_one_id() {
        let registry = Arc::new(BucketRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.get_or_create("shared").unwrap())
            })
            .collect();

        let ids: Vec<BucketId> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(registry.registered_count(), 3);
    }

    #[test]
    fn test_bucket_prefixes_keys() {
        let store: Arc<dyn OrderedStore> = Arc::new(MemStore::new());
        let bucket = Bucket::new(BucketId::DEFAULT, store.clone(), false);

        bucket.set(b"key", b"value").unwrap();
        assert_eq!(store.get(b"dekey").unwrap(), Some(b"value".to_vec()));
        assert_eq!(store.get(b"key").unwrap(), None);
        assert_eq!(bucket.keys().unwrap(), vec![b"key".to_vec()]);
    }

    #[test]
    fn test_bucket_key_length() {
        let store: Arc<dyn OrderedStore> = Arc::new(MemStore::new());
        let bucket = Bucket::new(BucketId::DEFAULT, store, false);

        assert!(matches!(bucket.set(b"", b"v"), Err(Error::KeyLength)));
        assert!(matches!(bucket.get(b""), Err(Error::KeyLength)));
        assert!(matches!(bucket.delete(b""), Err(Error::KeyLength)));
    }

    #[test]
    fn test_read_only_bucket() {
        let store: Arc<dyn OrderedStore> = Arc::new(MemStore::new());
        let bucket = Bucket::new(BucketId::DEFAULT, store, true);

        assert!(matches!(bucket.set(b"k", b"v"), Err(Error::ReadOnly)));
        assert!(matches!(bucket.delete(b"k"), Err(Error::ReadOnly)));
        bucket.apply(b"k", b"v").unwrap();
        assert_eq!(bucket.get(b"k").unwrap(), b"v");
    }
}
