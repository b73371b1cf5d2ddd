#![allow(dead_code)]

use shardkv::cluster::{Forwarder, ShardTable};
use shardkv::node::{create_router, NodeState};
use shardkv::Engine;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

pub const MAX_BODY: usize = 1024 * 1024;

/// Bind an ephemeral port on localhost.
pub async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    (listener, addr)
}

/// Index → address map for a list of node addresses.
pub fn address_map(addrs: &[String]) -> HashMap<usize, String> {
    addrs.iter().cloned().enumerate().collect()
}

/// Serve a node's router on `listener` in the background.
pub fn spawn_node(listener: TcpListener, engine: Engine, shards: ShardTable) {
    spawn_node_with(listener, engine, shards, Duration::from_secs(2), MAX_BODY);
}

/// Like `spawn_node`, with an explicit forward timeout and body limit.
pub fn spawn_node_with(
    listener: TcpListener,
    engine: Engine,
    shards: ShardTable,
    forward_timeout: Duration,
    max_body: usize,
) {
    let forwarder = Forwarder::new(forward_timeout).unwrap();
    let state = NodeState::new(engine, Arc::new(shards), forwarder);
    let router = create_router(state, max_body);
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
}

/// Start an n-shard cluster with in-memory engines.
pub async fn start_cluster(n: usize) -> Vec<(String, Engine)> {
    let mut listeners = Vec::new();
    let mut addrs = Vec::new();
    for _ in 0..n {
        let (listener, addr) = bind().await;
        listeners.push(listener);
        addrs.push(addr);
    }

    let mut nodes = Vec::new();
    for (index, listener) in listeners.into_iter().enumerate() {
        let engine = Engine::in_memory(false);
        let shards = ShardTable::new(index, address_map(&addrs)).unwrap();
        spawn_node(listener, engine.clone(), shards);
        nodes.push((addrs[index].clone(), engine));
    }
    nodes
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn eventually<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
