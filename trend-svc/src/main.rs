//! trend-svc - trend keyword pipeline service
//!
//! Polls the crawler once per tick, maintains minute-bucket scores, ranks
//! and burst-checks the recent window, and serves the results over HTTP/SSE.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trend_common::config::{load_toml_config, render_toml_config, resolve_config_path, StoreKind, TomlConfig};
use trend_common::db::init_database;
use trend_common::{Clock, SystemClock};
use trend_svc::build_router;
use trend_svc::channel::LogSink;
use trend_svc::observer::{HttpObserver, Observer, StaticObserver};
use trend_svc::repository::SqliteTrendRepository;
use trend_svc::service::{ServiceParts, TrendService};
use trend_svc::store::{MemoryScoreStore, ScoreStore, SqliteScoreStore};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StoreArg {
    Memory,
    Sqlite,
}

impl From<StoreArg> for StoreKind {
    fn from(arg: StoreArg) -> Self {
        match arg {
            StoreArg::Memory => StoreKind::Memory,
            StoreArg::Sqlite => StoreKind::Sqlite,
        }
    }
}

/// Command-line arguments for trend-svc
#[derive(Parser, Debug)]
#[command(name = "trend-svc")]
#[command(about = "Trend keyword aggregation and burst detection service")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "TREND_SVC_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP listen address
    #[arg(short, long, env = "TREND_BIND_ADDR")]
    bind: Option<String>,

    /// SQLite database file
    #[arg(long, env = "TREND_DATABASE_PATH")]
    database: Option<PathBuf>,

    /// Score store backend
    #[arg(long, value_enum, env = "TREND_STORE")]
    store: Option<StoreArg>,

    /// Crawler sidecar endpoint
    #[arg(long, env = "TREND_OBSERVER_URL")]
    observer_url: Option<String>,

    /// Seconds between scheduler ticks
    #[arg(long, env = "TREND_TICK_INTERVAL_SECS")]
    tick_interval_secs: Option<u64>,

    /// Print the built-in default configuration and exit
    #[arg(long)]
    print_default_config: bool,
}

impl Args {
    /// Overlay CLI/environment values on the file configuration
    fn apply(&self, config: &mut TomlConfig) {
        if let Some(bind) = &self.bind {
            config.bind_addr = bind.clone();
        }
        if let Some(database) = &self.database {
            config.database_path = Some(database.clone());
        }
        if let Some(store) = self.store {
            config.store = store.into();
        }
        if let Some(url) = &self.observer_url {
            config.observer_url = Some(url.clone());
        }
        if let Some(secs) = self.tick_interval_secs {
            config.pipeline.tick_interval_secs = secs;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_default_config {
        print!("{}", render_toml_config(&TomlConfig::default())?);
        return Ok(());
    }

    let config_path = resolve_config_path(args.config.as_deref());
    let mut config = load_toml_config(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let default_filter = format!(
        "trend_svc={level},trend_common={level},tower_http={level}",
        level = config.logging.level
    );
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting trend-svc v{}", env!("CARGO_PKG_VERSION"));
    if config_path.exists() {
        info!("Configuration: {}", config_path.display());
    } else {
        warn!("Config file {} not found, using built-in defaults", config_path.display());
    }

    let db_path = config.database_path();
    info!("Database path: {}", db_path.display());
    let pool = init_database(&db_path).await.context("Failed to initialize database")?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let score_store: Arc<dyn ScoreStore> = match config.store {
        StoreKind::Memory => {
            info!("Score store: in-process (single instance only)");
            Arc::new(MemoryScoreStore::new(clock.clone()))
        }
        StoreKind::Sqlite => {
            info!("Score store: shared SQLite");
            Arc::new(SqliteScoreStore::new(pool.clone(), clock.clone()))
        }
    };

    let observer: Arc<dyn Observer> = match &config.observer_url {
        Some(url) => {
            info!("Observer: {}", url);
            Arc::new(
                HttpObserver::new(
                    url.clone(),
                    std::time::Duration::from_secs(config.observer_timeout_secs),
                    clock.clone(),
                )
                .context("Failed to build observer client")?,
            )
        }
        None => {
            warn!("No observer_url configured; cycles will see no observations");
            Arc::new(StaticObserver::empty())
        }
    };

    let service = TrendService::assemble(
        &config,
        ServiceParts {
            score_store,
            repository: Arc::new(SqliteTrendRepository::new(pool)),
            observer,
            sink: Arc::new(LogSink),
            clock,
        },
    )
    .context("Failed to assemble trend service")?;

    let scheduler_handle = service.scheduler.clone().spawn();
    let app = build_router(service.state.clone());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;
    info!("trend-svc listening on http://{}", config.bind_addr);
    info!("Health check: http://{}/health", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    scheduler_handle.abort();
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
