//! remember-workers: consumes `link_crawling` jobs and stores link details.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use remember_core::defaults;
use remember_db::{Database, PoolConfig};
use remember_jobs::{
    CrawlLinkHandler, CrawlPipeline, FetchConfig, HtmlMetadataExtractor, HttpFetcher,
    JobWorker, WorkerConfig,
};

const DEFAULT_LOG_FILTER: &str = "remember_workers=info,remember_jobs=info,remember_db=info";

/// Install the global subscriber.
///
/// Environment variables:
///   LOG_FORMAT  - "json" or "text" (default: "text")
///   LOG_FILE    - path to log file (optional, enables daily-rotated file logging)
///   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
///   RUST_LOG    - standard env filter
///
/// The returned guard must live as long as file logging should flush.
fn init_tracing() -> Option<WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    let registry = tracing_subscriber::registry().with(env_filter);

    let guard = if let Some(ref path) = log_file {
        let path = std::path::Path::new(path);
        let file_dir = path.parent().unwrap_or(std::path::Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("remember-workers.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let _log_guard = init_tracing();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| defaults::DATABASE_URL.to_string());
    let run_migrations = std::env::var("RUN_MIGRATIONS")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);

    let db = Database::connect_with_config(&database_url, PoolConfig::from_env())
        .await
        .context("failed to connect to database")?;

    if run_migrations {
        db.migrate().await.context("failed to run migrations")?;
        info!(subsystem = "db", "Migrations applied");
    }

    let fetch_config = FetchConfig::from_env();
    info!(
        subsystem = "crawler",
        timeout_secs = fetch_config.timeout.as_secs(),
        max_redirects = fetch_config.max_redirects,
        max_body_bytes = fetch_config.max_body_bytes,
        user_agent = %fetch_config.user_agent,
        "Crawler configured"
    );
    let fetcher = HttpFetcher::new(fetch_config).context("failed to build HTTP client")?;

    let pipeline = CrawlPipeline::new(
        Arc::new(fetcher),
        Arc::new(HtmlMetadataExtractor::new()),
        Arc::new(db.link_details.clone()),
    );

    let handle = JobWorker::new(
        Arc::new(db.jobs.clone()),
        Arc::new(CrawlLinkHandler::new(Arc::new(pipeline))),
        WorkerConfig::from_env(),
    )
    .start();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown signal received, draining in-flight jobs");

    handle.shutdown().await?;
    info!("Shutdown complete");
    Ok(())
}
