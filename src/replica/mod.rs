//! Master → replica synchronization
//!
//! A master queues every write in its replication bucket and serves the
//! queue over HTTP. A replica runs one background loop that pulls entries,
//! applies them, and retires them on the master.

pub mod client;
pub mod protocol;
pub mod sync;

pub use client::MasterClient;
pub use protocol::{NextEntry, RetireParams};
pub use sync::{Replicator, SyncOutcome};
