//! HTTP API of a node: the request dispatcher
//!
//! Key operations consult the shard table first. Keys owned by another
//! shard are forwarded to its address untouched; owned keys run against
//! the local engine. Purge, the replication endpoints and health are
//! always local.

use crate::cluster::{Forwarder, ShardTable, FORWARDED_BY_HEADER};
use crate::common::{request_tracing_middleware, Error, Result};
use crate::replica::{NextEntry, RetireParams};
use crate::storage::Engine;
use axum::{
    async_trait,
    body::Bytes,
    extract::{DefaultBodyLimit, FromRequest, Path, Query, Request, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;

/// Shared node state for HTTP handlers.
#[derive(Clone)]
pub struct NodeState {
    pub engine: Engine,
    pub shards: Arc<ShardTable>,
    pub forwarder: Forwarder,
}

impl NodeState {
    pub fn new(engine: Engine, shards: Arc<ShardTable>, forwarder: Forwarder) -> Self {
        Self {
            engine,
            shards,
            forwarder,
        }
    }

    /// Run `local` when this shard owns `key`, forward `inbound` otherwise.
    async fn dispatch<F>(&self, key: &str, inbound: Inbound, local: F) -> Response
    where
        F: FnOnce(&Engine) -> Result<Response>,
    {
        if key.is_empty() {
            return Error::KeyLength.into_response();
        }

        let owner = self.shards.shard_index_of(key.as_bytes());
        let result = if owner == self.shards.self_index() {
            local(&self.engine)
        } else {
            self.forward(owner, inbound).await
        };

        result.unwrap_or_else(IntoResponse::into_response)
    }

    async fn forward(&self, owner: usize, inbound: Inbound) -> Result<Response> {
        // A peer already routed this request here; forwarding again would
        // mean the two nodes disagree about the shard list.
        if let Some(from) = inbound.headers.get(FORWARDED_BY_HEADER) {
            return Err(Error::Misrouted {
                from: String::from_utf8_lossy(from.as_bytes()).into_owned(),
                shard: self.shards.self_index(),
            });
        }

        let addr = self
            .shards
            .address(owner)
            .ok_or_else(|| Error::Internal(format!("no address for shard {}", owner)))?;

        self.forwarder
            .forward(
                addr,
                self.shards.self_index(),
                inbound.method,
                &inbound.uri,
                &inbound.headers,
                inbound.body,
            )
            .await
    }
}

/// The parts of a request needed to forward it verbatim
pub struct Inbound {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
}

#[async_trait]
impl<S> FromRequest<S> for Inbound
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        let method = req.method().clone();
        let uri = req.uri().clone();
        let headers = req.headers().clone();
        let body = Bytes::from_request(req, state)
            .await
            .map_err(IntoResponse::into_response)?;

        Ok(Self {
            method,
            uri,
            headers,
            body,
        })
    }
}

#[derive(Debug, Deserialize)]
struct KeyParams {
    #[serde(default)]
    key: String,
}

#[derive(Debug, Deserialize)]
struct SetParams {
    #[serde(default)]
    key: String,
    value: Option<String>,
}

fn utf8_value(body: &[u8]) -> Result<&str> {
    std::str::from_utf8(body).map_err(|e| Error::InvalidValue(format!("value is not UTF-8: {}", e)))
}

/// Creates the HTTP router with all public endpoints.
pub fn create_router(state: NodeState, max_body_bytes: usize) -> Router {
    Router::new()
        // Key operations, REST style
        .route("/v1/:key", get(get_key).put(put_key).delete(delete_key))
        // Key operations, query style
        .route("/get", get(get_query))
        .route("/set", get(set_query).post(set_query))
        .route("/del", get(delete_query).delete(delete_query))
        // Local-only administration
        .route("/purge", get(purge).post(purge))
        .route("/next", get(next_replication_entry))
        .route(
            "/del-rep",
            get(retire_replication_entry)
                .post(retire_replication_entry)
                .delete(retire_replication_entry),
        )
        .route("/health", get(health))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(request_tracing_middleware))
                // max_body_bytes is the only limit; drop axum's 2 MiB default.
                .layer(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(max_body_bytes)),
        )
        .with_state(state)
}

async fn get_key(
    State(state): State<NodeState>,
    Path(key): Path<String>,
    inbound: Inbound,
) -> Response {
    state
        .dispatch(&key, inbound, |engine| {
            let value = engine.get(key.as_bytes())?;
            Ok((StatusCode::OK, value).into_response())
        })
        .await
}

async fn put_key(
    State(state): State<NodeState>,
    Path(key): Path<String>,
    inbound: Inbound,
) -> Response {
    let body = inbound.body.clone();
    state
        .dispatch(&key, inbound, |engine| {
            engine.set(key.as_bytes(), utf8_value(&body)?.as_bytes())?;
            Ok(StatusCode::CREATED.into_response())
        })
        .await
}

async fn delete_key(
    State(state): State<NodeState>,
    Path(key): Path<String>,
    inbound: Inbound,
) -> Response {
    state
        .dispatch(&key, inbound, |engine| {
            engine.delete(key.as_bytes())?;
            Ok(StatusCode::NO_CONTENT.into_response())
        })
        .await
}

async fn get_query(
    State(state): State<NodeState>,
    Query(params): Query<KeyParams>,
    inbound: Inbound,
) -> Response {
    state
        .dispatch(&params.key, inbound, |engine| {
            let value = engine.get(params.key.as_bytes())?;
            Ok((StatusCode::OK, value).into_response())
        })
        .await
}

/// `value` comes from the query string, or from the body when absent.
async fn set_query(
    State(state): State<NodeState>,
    Query(params): Query<SetParams>,
    inbound: Inbound,
) -> Response {
    let body = inbound.body.clone();
    let shard = state.shards.self_index();
    state
        .dispatch(&params.key, inbound, |engine| {
            let value = match params.value.as_deref() {
                Some(value) => value,
                None => utf8_value(&body)?,
            };
            engine.set(params.key.as_bytes(), value.as_bytes())?;
            Ok((StatusCode::OK, format!("stored on shard {}", shard)).into_response())
        })
        .await
}

async fn delete_query(
    State(state): State<NodeState>,
    Query(params): Query<KeyParams>,
    inbound: Inbound,
) -> Response {
    state
        .dispatch(&params.key, inbound, |engine| {
            engine.delete(params.key.as_bytes())?;
            Ok(StatusCode::NO_CONTENT.into_response())
        })
        .await
}

/// Delete every local key that hashes to another shard.
async fn purge(State(state): State<NodeState>) -> Response {
    let engine = state.engine.clone();
    let shards = state.shards.clone();

    let result =
        tokio::task::spawn_blocking(move || engine.delete_not_belonging(|key| !shards.owns(key)))
            .await;

    match result {
        Ok(Ok(removed)) => {
            tracing::info!(removed, "purged keys owned by other shards");
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(Err(e)) => e.into_response(),
        Err(e) => Error::Internal(format!("purge task failed: {}", e)).into_response(),
    }
}

/// Serve the lowest pending replication entry; empty strings when none.
async fn next_replication_entry(State(state): State<NodeState>) -> Response {
    match state.engine.next_replica() {
        Ok((key, value)) => Json(NextEntry::new(
            String::from_utf8_lossy(&key),
            String::from_utf8_lossy(&value),
        ))
        .into_response(),
        Err(Error::NoFirstKey) => Json(NextEntry::default()).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Retire a replication entry if its queued value still matches.
async fn retire_replication_entry(
    State(state): State<NodeState>,
    Query(params): Query<RetireParams>,
) -> Response {
    match state
        .engine
        .delete_replication_key(params.key.as_bytes(), params.value.as_bytes())
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            tracing::debug!(key = %params.key, error = %e, "replication entry not retired");
            e.into_response()
        }
    }
}

async fn health(State(state): State<NodeState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "shard": state.shards.self_name(),
        "shard_index": state.shards.self_index(),
        "shard_count": state.shards.shard_count(),
        "read_only": state.engine.is_read_only(),
        "replication_backlog": state.engine.replication_backlog().ok(),
        "buckets": state.engine.bucket_count(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
