//! Murmur live ingestion daemon.
//!
//! Subscribes to the post feed, persists authors, originals and posts to
//! SQLite, and reopens the subscription whenever the feed closes it.
//!
//! # Usage
//!
//! ```bash
//! # Run with default settings (track "http,RT", language "en")
//! MURMUR_FEED_AUTH="Bearer ..." murmur-ingest
//!
//! # Run with custom paths and filter
//! murmur-ingest \
//!     --db-path /data/murmur.sqlite \
//!     --track rust,tokio \
//!     --language en
//! ```
//!
//! # Graceful Shutdown
//!
//! The daemon handles SIGINT (Ctrl+C) and SIGTERM:
//! 1. Cancels any pending reconnect and closes the live subscription
//! 2. Lets the ingestion worker drain posts already received
//! 3. Logs a summary and exits
//!
//! An unavailable store stops the daemon with a non-zero exit code.

use anyhow::{Context, Result};
use clap::Parser;
use murmur_core::metrics::register_descriptions;
use murmur_ingest::{
    FeedParams, HttpConfig, HttpTransport, IngestionPipeline, PipelineConfig, PipelineStats,
    ReconnectSupervisor, SqliteStore, StatusReporter, StreamConnector, SupervisorStats,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing_subscriber::EnvFilter;

/// Murmur live ingestion daemon.
#[derive(Parser, Debug)]
#[command(name = "murmur-ingest")]
#[command(about = "Live post feed ingestion daemon")]
#[command(version)]
struct Args {
    /// SQLite database path
    #[arg(long, env = "MURMUR_DB_PATH", default_value = "./data/murmur.sqlite")]
    db_path: PathBuf,

    /// Feed filter endpoint
    #[arg(
        long,
        env = "MURMUR_STREAM_URL",
        default_value = "https://stream.twitter.com/1.1/statuses/filter.json"
    )]
    stream_url: String,

    /// Keywords to track (comma-separated)
    #[arg(long, env = "MURMUR_TRACK", value_delimiter = ',', default_value = "http,RT")]
    track: Vec<String>,

    /// Language filter
    #[arg(long, env = "MURMUR_LANGUAGE", default_value = "en")]
    language: String,

    /// Authorization header value sent with the subscription request
    #[arg(long, env = "MURMUR_FEED_AUTH", hide_env_values = true)]
    feed_auth: Option<String>,

    /// Seconds without any data (including keep-alives) before the feed
    /// connection is considered dead
    #[arg(long, default_value = "90")]
    stall_timeout_secs: u64,

    /// Seconds to wait before reopening a closed subscription
    #[arg(long, default_value = "30")]
    reconnect_delay_secs: u64,

    /// Seconds between status lines
    #[arg(long, default_value = "10")]
    report_interval_secs: u64,

    /// Attempts per store operation before giving up
    #[arg(long, default_value = "3")]
    store_retry_attempts: u32,

    /// Pause between store attempts, in milliseconds
    #[arg(long, default_value = "500")]
    store_retry_delay_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("info".parse()?)
                .add_directive("murmur_ingest=debug".parse()?),
        )
        .init();

    let args = Args::parse();

    tracing::info!("Murmur live ingestion daemon starting...");
    register_descriptions();

    // Set up graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    let handler_tx = Arc::clone(&shutdown_tx);

    ctrlc::set_handler(move || {
        tracing::info!("Shutdown signal received, stopping gracefully...");
        handler_tx.send_replace(true);
    })
    .context("Failed to set Ctrl+C handler")?;

    tracing::info!("Configuration:");
    tracing::info!("  Database: {}", args.db_path.display());
    tracing::info!("  Stream: {}", args.stream_url);
    tracing::info!("  Track: {}", args.track.join(","));
    tracing::info!("  Language: {}", args.language);
    tracing::info!("  Reconnect delay: {}s", args.reconnect_delay_secs);

    let store = Arc::new(
        SqliteStore::open(&args.db_path)
            .with_context(|| format!("Failed to open database at {:?}", args.db_path))?,
    );

    let transport = Arc::new(
        HttpTransport::new(HttpConfig {
            url: args.stream_url.clone(),
            authorization: args.feed_auth.clone(),
            stall_timeout: Duration::from_secs(args.stall_timeout_secs),
            ..Default::default()
        })
        .context("Failed to create feed transport")?,
    );

    let pipeline = IngestionPipeline::new(
        Arc::clone(&store),
        PipelineConfig {
            store_retry_attempts: args.store_retry_attempts,
            store_retry_delay: Duration::from_millis(args.store_retry_delay_ms),
        },
    );

    let reporter = StatusReporter::new(
        pipeline.received_counter(),
        Duration::from_secs(args.report_interval_secs),
    );

    let (post_tx, post_rx) = mpsc::unbounded_channel();
    let (signal_tx, signal_rx) = mpsc::unbounded_channel();

    let params = FeedParams {
        track: args.track.clone(),
        language: args.language.clone(),
    };
    let connector = StreamConnector::new(transport, params, post_tx, signal_tx);
    let supervisor = ReconnectSupervisor::new(
        connector,
        signal_rx,
        Duration::from_secs(args.reconnect_delay_secs),
    );

    tracing::info!("Starting live ingestion...");

    let reporter_handle = tokio::spawn(reporter.run(shutdown_rx.clone()));
    let mut supervisor_handle = tokio::spawn(supervisor.run(shutdown_rx));
    let mut pipeline_handle = tokio::spawn(async move { pipeline.run(post_rx).await });

    // The pipeline only returns early on a fatal store error; in that case the
    // supervisor is told to stop. Otherwise the supervisor stops on shutdown,
    // which drops the post sender and lets the pipeline drain and finish.
    let (supervisor_stats, pipeline_result) = tokio::select! {
        supervisor = &mut supervisor_handle => {
            let supervisor = supervisor.context("Feed supervisor task failed")?;
            let pipeline = pipeline_handle.await.context("Ingestion task failed")?;
            (supervisor, pipeline)
        }
        pipeline = &mut pipeline_handle => {
            let pipeline = pipeline.context("Ingestion task failed")?;
            shutdown_tx.send_replace(true);
            let supervisor = supervisor_handle.await.context("Feed supervisor task failed")?;
            (supervisor, pipeline)
        }
    };

    shutdown_tx.send_replace(true);
    let reported = reporter_handle.await.context("Status reporter task failed")?;

    tracing::info!("Shutting down...");

    let pipeline_stats = match pipeline_result {
        Ok(stats) => stats,
        Err(e) => {
            tracing::error!("Ingestion stopped: {}", e);
            log_summary(&store, &supervisor_stats, None, reported);
            return Err(e).context("Store unavailable");
        }
    };

    log_summary(&store, &supervisor_stats, Some(&pipeline_stats), reported);

    Ok(())
}

/// Print the shutdown summary.
fn log_summary(
    store: &SqliteStore,
    supervisor: &SupervisorStats,
    pipeline: Option<&PipelineStats>,
    reported: u64,
) {
    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("SHUTDOWN COMPLETE");
    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("Subscriptions opened: {}", supervisor.subscriptions);
    tracing::info!("Posts reported:       {}", reported);
    if let Some(stats) = pipeline {
        tracing::info!("Posts received:       {}", stats.posts_received);
        tracing::info!("Posts failed:         {}", stats.posts_failed);
        tracing::info!("Users inserted:       {}", stats.users_inserted);
        tracing::info!("Posts inserted:       {}", stats.posts_inserted);
        tracing::info!("Duplicates skipped:   {}", stats.duplicates);
    }

    match (store.count_users(), store.count_posts()) {
        (Ok(users), Ok(posts)) => {
            tracing::info!("Users stored:         {}", users);
            tracing::info!("Posts stored:         {}", posts);
        }
        (Err(e), _) | (_, Err(e)) => tracing::warn!("Failed to count stored rows: {}", e),
    }
}
