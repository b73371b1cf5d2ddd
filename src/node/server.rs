//! Node server

use crate::cluster::{Forwarder, ShardTable};
use crate::common::{NodeConfig, Result};
use crate::node::http::{create_router, NodeState};
use crate::replica::{MasterClient, Replicator};
use crate::storage::Engine;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub struct NodeServer {
    config: NodeConfig,
    shards: ShardTable,
}

impl NodeServer {
    pub fn new(config: NodeConfig, shards: ShardTable) -> Self {
        Self { config, shards }
    }

    fn open_engine(&self) -> Result<Engine> {
        let read_only = self.config.effective_read_only();
        if self.config.in_memory {
            Ok(Engine::in_memory(read_only))
        } else {
            Engine::open(&self.config.db_path, read_only)
        }
    }

    /// Bind the configured address and serve until ctrl-c.
    pub async fn serve(self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;

        let cancel = CancellationToken::new();
        let on_signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received");
                on_signal.cancel();
            }
        });

        self.run(listener, cancel).await
    }

    /// Serve on `listener` until `cancel` fires.
    pub async fn run(self, listener: TcpListener, cancel: CancellationToken) -> Result<()> {
        let local_addr = listener.local_addr()?;
        tracing::info!("Starting node: {}", self.shards.self_name());
        tracing::info!("  HTTP API: {}", local_addr);
        tracing::info!(
            "  Shard: {} of {}",
            self.shards.self_index(),
            self.shards.shard_count()
        );
        if self.config.in_memory {
            tracing::info!("  Storage: in memory");
        } else {
            tracing::info!("  DB path: {}", self.config.db_path.display());
        }
        tracing::info!("  Read-only: {}", self.config.effective_read_only());

        let engine = self.open_engine()?;
        let forwarder = Forwarder::new(self.config.forward_timeout())?;
        tracing::info!("  Forward timeout: {:?}", forwarder.timeout());

        let replication = match &self.config.master {
            Some(master) => {
                tracing::info!("  Replicating from: {}", master);
                let client = MasterClient::new(master, self.config.forward_timeout())?;
                let replicator = Replicator::new(
                    engine.clone(),
                    client,
                    self.config.replication_idle(),
                    self.config.replication_backoff(),
                );
                Some(replicator.spawn(cancel.child_token()))
            }
            None => None,
        };

        let state = NodeState::new(engine, Arc::new(self.shards), forwarder);
        let router = create_router(state, self.config.max_value_bytes);

        tracing::info!("✓ Node ready");

        let shutdown = cancel.clone();
        let served = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await;

        cancel.cancel();
        if let Some(handle) = replication {
            if let Err(e) = handle.await {
                tracing::error!("replication task failed: {}", e);
            }
        }

        served?;
        tracing::info!("Node stopped");
        Ok(())
    }
}
