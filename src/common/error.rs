//! Error types for shardkv

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Storage Errors ===
    #[error("cannot make changes to the database, it is in read-only mode")]
    ReadOnly,

    #[error("the key length cannot be 0")]
    KeyLength,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("the bucket name cannot be empty")]
    BucketName,

    #[error("no free bucket ids left")]
    BucketLimit,

    #[error("there are no keys in the replication queue")]
    NoFirstKey,

    #[error("replication value does not match the stored value")]
    ValueMismatch,

    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    // === Shard Table Errors ===
    #[error("duplicated shard index: {0}")]
    DuplicateShardIndex(usize),

    #[error("shard with index {0} was not found")]
    MissingShardIndex(usize),

    #[error("shard {0} was not found in the shard list")]
    ShardNotFound(String),

    // === Network Errors ===
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("forwarding to {addr} failed: {reason}")]
    Forward { addr: String, reason: String },

    #[error("key forwarded by shard {from} is not owned by shard {shard}")]
    Misrouted { from: String, shard: usize },

    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    // === Config Errors ===
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // === Generic ===
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Errors that should prevent a node from starting.
    pub fn is_fatal_at_startup(&self) -> bool {
        matches!(
            self,
            Error::DuplicateShardIndex(_)
                | Error::MissingShardIndex(_)
                | Error::ShardNotFound(_)
                | Error::Config(_)
                | Error::InvalidConfig(_)
        )
    }

    /// Convert to HTTP status code
    pub fn to_http_status(&self) -> StatusCode {
        match self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::KeyLength | Error::BucketName | Error::InvalidValue(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::Forward { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.to_http_status();
        if status.is_server_error() {
            tracing::warn!(error = %self, status = status.as_u16(), "request failed");
        }
        (status, self.to_string()).into_response()
    }
}
