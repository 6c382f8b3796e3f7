use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use pricewatch::config::{LoggingConfig, MetricsConfig};
use pricewatch::notifiers::build_dispatcher;
use pricewatch::web::{self, AppState};
use pricewatch::{
    AppConfig, HttpPageFetcher, PageFetcher, PriceExtractor, RecheckScheduler, WatchManager,
    WatchStore,
};

#[derive(Debug, Parser)]
#[command(name = "pricewatch", version, about = "Watches product pages and sends a WhatsApp alert when the price drops")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP service and the recurring recheck loop (default)
    Serve,
    /// Fetch a page and print the price it would be tracked at
    Extract { url: String },
    /// Run one recheck cycle over all stored watches and exit
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::from_env().context("failed to load configuration")?;
    let _guard = init_tracing(&config.logging)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Extract { url } => extract(&config, &url).await,
        Command::Check => check(config).await,
    }
}

fn env_filter(level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => Ok(EnvFilter::new("warn")
            .add_directive(format!("pricewatch={}", level).parse()?)
            .add_directive("tower_http=info".parse()?)),
    }
}

/// Console logging, plus a daily rolling file when a directory is set. The
/// returned guard flushes the file writer on drop.
fn init_tracing(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let console_layer = fmt::layer()
        .with_target(true)
        .with_filter(env_filter(&config.level)?);

    let (file_layer, guard) = match &config.directory {
        Some(directory) => {
            std::fs::create_dir_all(directory)?;
            let appender = tracing_appender::rolling::daily(directory, "pricewatch.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(env_filter(&config.level)?);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

fn init_metrics(config: &MetricsConfig) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }

    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], config.port))
        .install()
        .context("failed to install Prometheus exporter")?;

    info!(port = config.port, "Prometheus metrics exporter listening");
    Ok(())
}

/// Creates the parent directory of a file-backed SQLite URL.
fn ensure_database_dir(url: &str) -> Result<()> {
    let path = url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() || path.starts_with(":memory:") {
        return Ok(());
    }

    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create database directory {}", parent.display()))?;
    }
    Ok(())
}

async fn build_scheduler(config: &AppConfig) -> Result<Arc<RecheckScheduler>> {
    ensure_database_dir(&config.database.url)?;
    let store = WatchStore::connect(&config.database.url, config.database.max_connections)
        .await
        .context("failed to open watch store")?;

    let fetcher = Arc::new(HttpPageFetcher::new(&config.scraper)?);
    let dispatcher = build_dispatcher(&config.notifications)?;
    info!(dispatcher = dispatcher.name(), "Alert dispatcher ready");

    let manager = Arc::new(WatchManager::new(store, fetcher, dispatcher, config));
    Ok(Arc::new(RecheckScheduler::new(manager, &config.scheduler)))
}

async fn serve(config: AppConfig) -> Result<()> {
    info!("Starting PriceWatch v{}", env!("CARGO_PKG_VERSION"));
    init_metrics(&config.metrics)?;

    let scheduler = build_scheduler(&config).await?;
    scheduler.start().await?;

    let state = AppState {
        manager: Arc::clone(scheduler.manager()),
        scheduler: Arc::clone(&scheduler),
        config: config.clone(),
    };

    web::serve(&config, state, shutdown_signal()).await?;

    info!("Shutting down...");
    scheduler
        .shutdown(Duration::from_secs(config.server.shutdown_timeout))
        .await;
    Ok(())
}

async fn extract(config: &AppConfig, url: &str) -> Result<()> {
    let fetcher = HttpPageFetcher::new(&config.scraper)?;
    let extractor = PriceExtractor::new(config.scraper.price_bounds());

    let html = fetcher
        .fetch(url)
        .await
        .with_context(|| format!("failed to fetch {}", url))?;

    match extractor.extract(&html) {
        Ok(extraction) => {
            println!("price:    {}", extraction.price);
            println!("strategy: {}", extraction.strategy);
            println!("raw:      {}", extraction.raw.trim());
            Ok(())
        }
        Err(kind) => anyhow::bail!("no price extracted from {}: {}", url, kind),
    }
}

async fn check(config: AppConfig) -> Result<()> {
    let scheduler = build_scheduler(&config).await?;
    let report = scheduler.run_cycle().await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
