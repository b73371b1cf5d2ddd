//! Node implementation
//!
//! A node owns one shard of the key space. It:
//! - Serves the HTTP API and dispatches each key to its owner
//! - Serves its replication queue when acting as a master
//! - Runs the replication loop when started with a master address

pub mod http;
pub mod server;

pub use http::{create_router, NodeState};
pub use server::NodeServer;
