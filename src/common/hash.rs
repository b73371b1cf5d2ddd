//! Hashing utilities for shardkv
//!
//! Shard placement must agree across every node of the cluster and across
//! restarts, so it uses FNV-1a (64-bit) instead of the randomly seeded
//! std hasher.

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a 64-bit hash of raw bytes.
pub fn fnv1a_64(data: &[u8]) -> u64 {
    data.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Compute the shard index owning a key.
pub fn shard_key(key: &[u8], num_shards: usize) -> usize {
    debug_assert!(num_shards > 0);
    (fnv1a_64(key) % num_shards as u64) as usize
}
