//! Replication loop run by replica nodes
//!
//! Each cycle polls the master for its lowest pending entry, applies it to
//! the local default bucket, then asks the master to retire it. Entries are
//! drained in key order, not write order. Errors at any step, including a
//! refused retire, never stop the loop; it backs off and polls again until
//! cancelled.

use crate::common::Result;
use crate::replica::client::MasterClient;
use crate::storage::Engine;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of one replication cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The master had nothing queued
    Idle,
    /// An entry was applied locally; `retired` is false when the master
    /// kept it because its value changed meanwhile
    Applied { key: String, retired: bool },
}

pub struct Replicator {
    engine: Engine,
    client: MasterClient,
    idle_interval: Duration,
    backoff_interval: Duration,
}

impl Replicator {
    pub fn new(
        engine: Engine,
        client: MasterClient,
        idle_interval: Duration,
        backoff_interval: Duration,
    ) -> Self {
        Self {
            engine,
            client,
            idle_interval,
            backoff_interval,
        }
    }

    /// Poll, apply and retire a single entry.
    pub async fn sync_once(&self) -> Result<SyncOutcome> {
        let entry = match self.client.fetch_next().await? {
            Some(entry) => entry,
            None => return Ok(SyncOutcome::Idle),
        };

        self.engine
            .set_on_replica(entry.key.as_bytes(), entry.value.as_bytes())?;
        debug!(key = %entry.key, "applied replicated write");

        // A refused retire fails the cycle; the master offers the entry again.
        let retired = self.client.retire(&entry).await?;
        if !retired {
            debug!(key = %entry.key, "replication entry changed on master, not retired");
        }

        Ok(SyncOutcome::Applied {
            key: entry.key,
            retired,
        })
    }

    /// Run until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            master = %self.client.master(),
            idle_ms = self.idle_interval.as_millis() as u64,
            backoff_ms = self.backoff_interval.as_millis() as u64,
            "replication loop started"
        );

        loop {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => break,
                outcome = self.sync_once() => outcome,
            };

            let pause = match outcome {
                Ok(SyncOutcome::Applied { retired: true, .. }) => continue,
                Ok(SyncOutcome::Applied { retired: false, .. }) => self.idle_interval,
                Ok(SyncOutcome::Idle) => self.idle_interval,
                Err(e) => {
                    warn!(master = %self.client.master(), error = %e, "replication cycle failed");
                    self.backoff_interval
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        info!("replication loop stopped");
    }

    /// Run the loop on its own task.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}
