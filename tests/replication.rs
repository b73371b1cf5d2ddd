//! Master → replica synchronization

mod common;

use common::{address_map, bind, client, eventually, spawn_node};
use reqwest::StatusCode;
use shardkv::cluster::ShardTable;
use shardkv::replica::{MasterClient, NextEntry, Replicator, SyncOutcome};
use shardkv::storage::MemStore;
use shardkv::{Engine, Error, NodeConfig, NodeServer};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Serve a single-shard master and return its address and engine.
async fn start_master() -> (String, Engine) {
    let (listener, addr) = bind().await;
    let engine = Engine::in_memory(false);
    let shards = ShardTable::new(0, address_map(&[addr.clone()])).unwrap();
    spawn_node(listener, engine.clone(), shards);
    (addr, engine)
}

fn replicator(master: &str, replica: &Engine) -> Replicator {
    let client = MasterClient::new(master, Duration::from_secs(2)).unwrap();
    Replicator::new(
        replica.clone(),
        client,
        Duration::from_millis(10),
        Duration::from_millis(50),
    )
}

#[tokio::test]
async fn test_sync_once_applies_and_retires() {
    let (master_addr, master) = start_master().await;
    let replica = Engine::in_memory(true);
    let replicator = replicator(&master_addr, &replica);

    master.set(b"k1", b"v1").unwrap();

    let outcome = replicator.sync_once().await.unwrap();
    assert_eq!(
        outcome,
        SyncOutcome::Applied {
            key: "k1".to_string(),
            retired: true
        }
    );

    assert_eq!(replica.get(b"k1").unwrap(), b"v1");
    assert!(matches!(master.next_replica(), Err(Error::NoFirstKey)));

    assert_eq!(replicator.sync_once().await.unwrap(), SyncOutcome::Idle);
}

#[tokio::test]
async fn test_overwritten_entry_is_not_retired() {
    let (master_addr, master) = start_master().await;
    let replica = Engine::in_memory(true);
    let client = MasterClient::new(&master_addr, Duration::from_secs(2)).unwrap();

    master.set(b"k1", b"v1").unwrap();
    let entry = client.fetch_next().await.unwrap().unwrap();
    assert_eq!(entry.value, "v1");

    // a newer write lands between fetch and retire
    master.set(b"k1", b"v2").unwrap();
    assert!(!client.retire(&entry).await.unwrap());

    let (_, queued) = master.next_replica().unwrap();
    assert_eq!(queued, b"v2");

    let replicator = replicator(&master_addr, &replica);
    let outcome = replicator.sync_once().await.unwrap();
    assert_eq!(
        outcome,
        SyncOutcome::Applied {
            key: "k1".to_string(),
            retired: true
        }
    );
    assert_eq!(replica.get(b"k1").unwrap(), b"v2");
}

#[tokio::test]
async fn test_sync_once_reports_unreachable_master() {
    let (dead, addr) = bind().await;
    drop(dead);

    let replica = Engine::in_memory(true);
    let replicator = replicator(&addr, &replica);
    assert!(replicator.sync_once().await.is_err());
}

#[tokio::test]
async fn test_refused_retire_is_an_error() {
    // A master reopened read-only still serves its persisted queue but
    // cannot retire from it.
    let store = Arc::new(MemStore::new());
    Engine::with_store(store.clone(), false)
        .set(b"k1", b"v1")
        .unwrap();

    let (listener, master_addr) = bind().await;
    let shards = ShardTable::new(0, address_map(&[master_addr.clone()])).unwrap();
    let master = Engine::with_store(store, true);
    spawn_node(listener, master.clone(), shards);

    let replica = Engine::in_memory(true);
    let replicator = replicator(&master_addr, &replica);
    assert!(replicator.sync_once().await.is_err());

    // applied locally, still queued on the master
    assert_eq!(replica.get(b"k1").unwrap(), b"v1");
    assert_eq!(master.replication_backlog().unwrap(), 1);
}

/// A master that always offers `k1` and refuses every retire.
async fn start_refusing_master(polls: Arc<AtomicUsize>) -> String {
    use axum::{http::StatusCode as Status, routing::get, Json, Router};

    let router = Router::new()
        .route(
            "/next",
            get(move || {
                let polls = polls.clone();
                async move {
                    polls.fetch_add(1, Ordering::SeqCst);
                    Json(NextEntry::new("k1", "v1"))
                }
            }),
        )
        .route(
            "/del-rep",
            get(|| async { (Status::INTERNAL_SERVER_ERROR, Error::ReadOnly.to_string()) }),
        );

    let (listener, addr) = bind().await;
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn test_loop_backs_off_when_retire_is_refused() {
    let polls = Arc::new(AtomicUsize::new(0));
    let master_addr = start_refusing_master(polls.clone()).await;

    let replica = Engine::in_memory(true);
    let client = MasterClient::new(&master_addr, Duration::from_secs(2)).unwrap();
    let replicator = Replicator::new(
        replica.clone(),
        client,
        Duration::from_millis(10),
        Duration::from_millis(200),
    );

    let cancel = CancellationToken::new();
    let handle = replicator.spawn(cancel.clone());
    tokio::time::sleep(Duration::from_millis(700)).await;
    cancel.cancel();
    handle.await.unwrap();

    // roughly one poll per backoff interval
    let polls = polls.load(Ordering::SeqCst);
    assert!(polls >= 1, "loop never polled");
    assert!(polls <= 6, "loop polled {} times without backing off", polls);
    assert_eq!(replica.get(b"k1").unwrap(), b"v1");
}

#[tokio::test]
async fn test_replication_loop_drains_queue() {
    let (master_addr, master) = start_master().await;
    let replica = Engine::in_memory(true);

    for i in 0..20 {
        master
            .set(format!("key-{:02}", i).as_bytes(), format!("v{}", i).as_bytes())
            .unwrap();
    }

    let cancel = CancellationToken::new();
    let handle = replicator(&master_addr, &replica).spawn(cancel.clone());

    let drained = eventually(Duration::from_secs(5), || {
        master.replication_backlog().unwrap() == 0
    })
    .await;
    assert!(drained, "replication queue not drained");

    for i in 0..20 {
        let value = replica.get(format!("key-{:02}", i).as_bytes()).unwrap();
        assert_eq!(value, format!("v{}", i).as_bytes());
    }

    // writes made while the loop is idle are picked up too
    master.set(b"late", b"arrival").unwrap();
    assert!(eventually(Duration::from_secs(5), || replica.get(b"late").is_ok()).await);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("replication loop did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_replica_node_serves_reads_and_rejects_writes() {
    let (master_addr, master) = start_master().await;
    master.set(b"alpha", b"x").unwrap();

    let (listener, replica_addr) = bind().await;
    let config = NodeConfig {
        shard: "sh1".to_string(),
        in_memory: true,
        master: Some(master_addr.clone()),
        replication_idle_ms: 10,
        replication_backoff_ms: 50,
        ..NodeConfig::default()
    };
    assert!(config.effective_read_only());

    let shards = ShardTable::new(0, address_map(&[replica_addr.clone()])).unwrap();
    let cancel = CancellationToken::new();
    let server = tokio::spawn(NodeServer::new(config, shards).run(listener, cancel.clone()));

    let client = client();
    let url = format!("http://{}/v1/alpha", replica_addr);

    let mut replicated = false;
    for _ in 0..100 {
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status() == StatusCode::OK {
                assert_eq!(resp.text().await.unwrap(), "x");
                replicated = true;
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(replicated, "replica never served the key");

    let resp = client.put(&url).body("y").send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("node did not shut down")
        .unwrap()
        .unwrap();
}
