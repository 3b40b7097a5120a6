use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

use spool_core::impls::{LocalTokenGate, SimulatedExecutor};
use spool_core::ports::TokenGate;
use spool_core::{PoolConfig, TaskPool};
use spool_redis::RedisTokenGate;
use spool_server::api::{self, AppState};
use spool_server::ratelimit::RateLimiter;
use spool_sqlite::SqliteTaskStore;

#[derive(Debug, Parser)]
#[command(name = "spool-server", version, about = "Task pool HTTP server")]
struct Cli {
    /// Where the HTTP API will listen, e.g. 127.0.0.1:8080
    #[arg(long, env = "SPOOL_LISTEN", default_value = "127.0.0.1:8080")]
    listen: String,

    /// SQLite database path, created if missing.
    #[arg(long, env = "SPOOL_DB_PATH", default_value = "spool.db")]
    db_path: String,

    /// Number of worker loops draining the dispatch queue.
    #[arg(long, env = "SPOOL_WORKERS", default_value_t = 4)]
    workers: usize,

    /// Dispatch queue capacity.
    #[arg(long, env = "SPOOL_QUEUE_SIZE", default_value_t = 64)]
    queue_size: usize,

    /// Maximum tasks alive at once (pending plus in progress).
    #[arg(long, env = "SPOOL_ADMISSION_CAPACITY", default_value_t = 128)]
    admission_capacity: usize,

    /// Redis URL for a token pool shared across instances, e.g.
    /// redis://127.0.0.1/. Without it the admission gate is process-local.
    #[arg(long, env = "SPOOL_REDIS_URL")]
    redis_url: Option<String>,

    /// Redis list holding the shared tokens.
    #[arg(long, env = "SPOOL_REDIS_TOKEN_KEY", default_value = "spool:tokens")]
    redis_token_key: String,

    /// Recovery poll interval in seconds.
    #[arg(long, env = "SPOOL_POLL_INTERVAL_SECONDS", default_value_t = 5)]
    poll_interval_seconds: u64,

    /// Maximum pending rows claimed per recovery cycle.
    #[arg(long, env = "SPOOL_POLL_BATCH_SIZE", default_value_t = 10)]
    poll_batch_size: usize,

    /// Requests allowed per client per minute.
    #[arg(long, env = "SPOOL_RATE_LIMIT_PER_MINUTE", default_value_t = 60)]
    rate_limit_per_minute: usize,

    /// How long to wait for in-flight work on shutdown.
    #[arg(long, env = "SPOOL_SHUTDOWN_TIMEOUT_SECONDS", default_value_t = 10)]
    shutdown_timeout_seconds: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_target(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    anyhow::ensure!(cli.workers > 0, "--workers must be at least 1");
    anyhow::ensure!(cli.queue_size > 0, "--queue-size must be at least 1");
    anyhow::ensure!(
        cli.admission_capacity > 0,
        "--admission-capacity must be at least 1"
    );
    anyhow::ensure!(
        cli.poll_interval_seconds > 0,
        "--poll-interval-seconds must be at least 1"
    );
    anyhow::ensure!(
        cli.poll_batch_size > 0,
        "--poll-batch-size must be at least 1"
    );
    anyhow::ensure!(
        cli.rate_limit_per_minute > 0,
        "--rate-limit-per-minute must be at least 1"
    );
    info!(?cli, "starting task pool server");

    let store = Arc::new(
        SqliteTaskStore::connect(&cli.db_path)
            .await
            .map_err(|e| anyhow::anyhow!("opening {}: {e}", cli.db_path))?,
    );
    let gate: Arc<dyn TokenGate> = match &cli.redis_url {
        Some(url) => {
            let gate = RedisTokenGate::connect(url, cli.redis_token_key.clone())
                .await
                .map_err(|e| anyhow::anyhow!("connecting to {url}: {e}"))?;
            gate.initialize(cli.admission_capacity).await;
            Arc::new(gate)
        }
        None => Arc::new(LocalTokenGate::new(cli.admission_capacity)),
    };
    let executor = Arc::new(SimulatedExecutor::new());

    let pool = TaskPool::start(
        PoolConfig {
            workers: cli.workers,
            queue_capacity: cli.queue_size,
            poll_interval: Duration::from_secs(cli.poll_interval_seconds),
            poll_batch_size: cli.poll_batch_size,
        },
        store,
        gate,
        executor,
    );

    let app = api::router(
        AppState {
            ingress: pool.ingress(),
        },
        Arc::new(RateLimiter::per_minute(cli.rate_limit_per_minute)),
    );

    let addr: SocketAddr = cli.listen.parse()?;
    info!("listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // No new requests past this point; drain what is already dispatched.
    let outcome = pool
        .shutdown(Duration::from_secs(cli.shutdown_timeout_seconds))
        .await;
    info!(?outcome, "server stopped");

    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    info!("shutdown requested");
}
