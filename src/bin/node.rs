//! Node binary

use clap::Parser;
use shardkv::{NodeConfig, NodeServer, ShardTable, ShardsConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "shardkv-node")]
#[command(about = "shardkv node: one shard of a sharded key-value store")]
#[command(version)]
struct Args {
    /// Node config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Name of the shard this node serves
    #[arg(short, long)]
    shard: Option<String>,

    /// Bind address for HTTP
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Database directory
    #[arg(long)]
    db: Option<PathBuf>,

    /// Shard list file (JSON or TOML)
    #[arg(long)]
    shards: Option<PathBuf>,

    /// Reject client writes
    #[arg(long)]
    read_only: bool,

    /// Keep data in memory only
    #[arg(long)]
    in_memory: bool,

    /// Master address to replicate from (implies read-only)
    #[arg(long)]
    master: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    /// CLI flags have priority over file and environment settings.
    fn apply(self, config: &mut NodeConfig) {
        if let Some(shard) = self.shard {
            config.shard = shard;
        }
        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        if let Some(db) = self.db {
            config.db_path = db;
        }
        if let Some(shards) = self.shards {
            config.shards_file = shards;
        }
        if self.read_only {
            config.read_only = true;
        }
        if self.in_memory {
            config.in_memory = true;
        }
        if self.master.is_some() {
            config.master = self.master;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = NodeConfig::load(args.config.as_deref())?;
    args.apply(&mut config);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    config.validate()?;

    // A bad shard list must stop the node before it serves anything.
    let shards = ShardsConfig::load(&config.shards_file)
        .and_then(|list| ShardTable::from_config(&list, &config.shard))
        .inspect_err(|e| {
            if e.is_fatal_at_startup() {
                tracing::error!("refusing to start: {}", e);
            }
        })?;

    NodeServer::new(config, shards).serve().await?;

    Ok(())
}
