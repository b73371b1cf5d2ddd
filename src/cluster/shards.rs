//! Shard table: which node owns a key
//!
//! Keys are assigned to shards by FNV-1a modulo the shard count. The table
//! is built once at startup from the shard list and never changes, so every
//! node configured with the same list routes every key identically.

use crate::common::{shard_key, Error, Result, ShardsConfig};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardTable {
    self_index: usize,
    self_name: String,
    /// Address of shard `i` at position `i`
    addresses: Vec<String>,
}

impl ShardTable {
    /// Build the table for the node named `shard_name`.
    ///
    /// Fails on a duplicated index, on any index missing from `0..len`, and
    /// when `shard_name` is not in the list.
    pub fn from_config(config: &ShardsConfig, shard_name: &str) -> Result<Self> {
        let mut addresses = HashMap::new();
        let mut self_index = None;

        for shard in &config.shards {
            if addresses.contains_key(&shard.index) {
                return Err(Error::DuplicateShardIndex(shard.index));
            }
            addresses.insert(shard.index, shard.address.clone());
            if shard.name == shard_name {
                self_index = Some(shard.index);
            }
        }

        let addresses = contiguous(addresses)?;
        let self_index = self_index.ok_or_else(|| Error::ShardNotFound(shard_name.to_string()))?;

        Ok(Self {
            self_index,
            self_name: shard_name.to_string(),
            addresses,
        })
    }

    /// Build a table directly from an index → address map.
    pub fn new(self_index: usize, addresses: HashMap<usize, String>) -> Result<Self> {
        let addresses = contiguous(addresses)?;
        if self_index >= addresses.len() {
            return Err(Error::ShardNotFound(self_index.to_string()));
        }
        Ok(Self {
            self_index,
            self_name: format!("shard-{}", self_index),
            addresses,
        })
    }

    /// The shard owning `key`.
    pub fn shard_index_of(&self, key: &[u8]) -> usize {
        shard_key(key, self.addresses.len())
    }

    pub fn owns(&self, key: &[u8]) -> bool {
        self.shard_index_of(key) == self.self_index
    }

    pub fn self_index(&self) -> usize {
        self.self_index
    }

    pub fn self_name(&self) -> &str {
        &self.self_name
    }

    pub fn shard_count(&self) -> usize {
        self.addresses.len()
    }

    pub fn address(&self, index: usize) -> Option<&str> {
        self.addresses.get(index).map(String::as_str)
    }
}

fn contiguous(mut addresses: HashMap<usize, String>) -> Result<Vec<String>> {
    (0..addresses.len())
        .map(|i| addresses.remove(&i).ok_or(Error::MissingShardIndex(i)))
        .collect()
}
