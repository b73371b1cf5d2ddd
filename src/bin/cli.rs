//! CLI for talking to a shardkv cluster

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use futures_util::{stream, StreamExt};
use rand::distributions::Alphanumeric;
use rand::Rng;
use shardkv::cluster::base_url;
use shardkv::common::key_path;
use shardkv::replica::NextEntry;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "shardkv")]
#[command(about = "shardkv sharded key-value store CLI")]
#[command(version)]
struct Cli {
    /// Any node of the cluster; keys are forwarded to their owner
    #[arg(long, default_value = "localhost:8080")]
    node: String,

    /// Request timeout in milliseconds
    #[arg(long, default_value = "5000")]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read a key
    Get { key: String },

    /// Write a key
    Set { key: String, value: String },

    /// Delete a key
    Del { key: String },

    /// Drop keys the node no longer owns
    Purge,

    /// Show the node's next pending replication entry
    Next,

    /// Measure write and read throughput
    Bench {
        /// Number of keys to write and read back
        #[arg(long, default_value = "1000")]
        iters: usize,

        /// Concurrent requests in flight
        #[arg(long, default_value = "1")]
        concurrency: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(cli.timeout_ms))
        .build()?;
    let base = base_url(&cli.node);

    match cli.command {
        Commands::Get { key } => {
            let response = client.get(format!("{}{}", base, key_path(&key))).send().await?;
            let status = response.status();
            let body = response.text().await?;
            if !status.is_success() {
                bail!("get {} failed ({}): {}", key, status, body.trim());
            }
            println!("{}", body);
        }

        Commands::Set { key, value } => {
            let response = client
                .put(format!("{}{}", base, key_path(&key)))
                .body(value)
                .send()
                .await?;
            let status = response.status();
            if !status.is_success() {
                bail!("set {} failed ({}): {}", key, status, response.text().await?.trim());
            }
            println!("OK");
        }

        Commands::Del { key } => {
            let response = client.delete(format!("{}{}", base, key_path(&key))).send().await?;
            let status = response.status();
            if !status.is_success() {
                bail!("del {} failed ({}): {}", key, status, response.text().await?.trim());
            }
            println!("OK");
        }

        Commands::Purge => {
            let response = client.post(format!("{}/purge", base)).send().await?;
            let status = response.status();
            if !status.is_success() {
                bail!("purge failed ({}): {}", status, response.text().await?.trim());
            }
            println!("OK");
        }

        Commands::Next => {
            let body = client
                .get(format!("{}/next", base))
                .send()
                .await?
                .error_for_status()?
                .bytes()
                .await?;
            let entry: NextEntry =
                serde_json::from_slice(&body).context("decoding replication entry")?;
            if entry.is_empty() {
                println!("replication queue is empty");
            } else {
                println!("{} = {}", entry.key, entry.value);
            }
        }

        Commands::Bench { iters, concurrency } => {
            let keys: Vec<String> = (0..iters).map(|_| random_string(16)).collect();
            let concurrency = concurrency.max(1);

            let write = run_phase(&keys, concurrency, |key| {
                client
                    .put(format!("{}{}", base, key_path(&key)))
                    .body(format!("value-{}", key))
                    .send()
            })
            .await;
            report("set", iters, &write);

            let read = run_phase(&keys, concurrency, |key| {
                client.get(format!("{}{}", base, key_path(&key))).send()
            })
            .await;
            report("get", iters, &read);
        }
    }

    Ok(())
}

fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

struct PhaseStats {
    elapsed: Duration,
    /// Mean of per-request latencies
    avg: Duration,
    max: Duration,
    min: Duration,
    failures: usize,
}

async fn run_phase<'a, F, Fut>(keys: &'a [String], concurrency: usize, request: F) -> PhaseStats
where
    F: Fn(&'a str) -> Fut,
    Fut: std::future::Future<Output = reqwest::Result<reqwest::Response>>,
{
    let start = Instant::now();
    let timings: Vec<(Duration, bool)> = stream::iter(keys)
        .map(|key| {
            let pending = request(key.as_str());
            async move {
                let started = Instant::now();
                let ok = matches!(pending.await, Ok(r) if r.status().is_success());
                (started.elapsed(), ok)
            }
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    PhaseStats::from_timings(start.elapsed(), &timings)
}

impl PhaseStats {
    /// `timings` holds one (latency, succeeded) pair per request.
    fn from_timings(elapsed: Duration, timings: &[(Duration, bool)]) -> Self {
        let total: Duration = timings.iter().map(|(d, _)| *d).sum();
        Self {
            elapsed,
            avg: total / timings.len().max(1) as u32,
            max: timings.iter().map(|(d, _)| *d).max().unwrap_or_default(),
            min: timings.iter().map(|(d, _)| *d).min().unwrap_or_default(),
            failures: timings.iter().filter(|(_, ok)| !ok).count(),
        }
    }
}

fn report(name: &str, iters: usize, stats: &PhaseStats) {
    let qps = iters as f64 / stats.elapsed.as_secs_f64().max(f64::EPSILON);
    println!(
        "{}: {:?} avg, {:.1} QPS, {:?} max, {:?} min, {} failed",
        name, stats.avg, qps, stats.max, stats.min, stats.failures
    );
}
