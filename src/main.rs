mod assembler;
mod cache;
mod cli;
mod config;
mod db;
mod handlers;
mod models;
mod packager;
mod router;
mod services;
mod utils;

use anyhow::Context;
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use assembler::Assembler;
use cache::ArtifactCache;
use cli::{Cli, Command};
use config::{Config, OperatorConfig};
use db::Store;
use packager::Packager;

/// Application state shared across handlers and CLI commands
pub struct AppState {
    pub store: Store,
    pub config: Config,
    pub cache: ArtifactCache,
    pub assembler: Assembler,
    pub packager: Packager,
}

impl AppState {
    /// Open the catalog, load operator configuration and wire the pipeline
    pub async fn init(cfg: Config) -> anyhow::Result<Self> {
        let store = Store::with_pool_size(&cfg.db_path, cfg.db_max_connections).await?;
        tracing::info!("Database initialized (pool_size={})", cfg.db_max_connections);

        match store.import_directory(Path::new(&cfg.import_dir)).await {
            Ok(count) if count > 0 => tracing::info!("Imported {} templates from {}", count, cfg.import_dir),
            Ok(_) => {}
            Err(e) => tracing::warn!("Template import from {} failed: {:#}", cfg.import_dir, e),
        }

        let operator = OperatorConfig::load(&cfg.conf_dir)
            .with_context(|| format!("Failed to load configuration from {}", cfg.conf_dir))?;
        tracing::info!("Artifacts served from {}", operator.settings.base_url);

        let cache = ArtifactCache::new(Duration::from_secs(cfg.cache_ttl_secs), cfg.cache_threshold);
        let assembler = Assembler::new(cache.clone(), Arc::new(operator));
        let packager = Packager::new(cache.clone(), &cfg.archive_dir, &cfg.content_dir);

        Ok(Self {
            store,
            config: cfg,
            cache,
            assembler,
            packager,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bootstrapper=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cfg = Config::load();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(cfg).await,
        command => {
            let code = cli::run(command, cfg).await;
            std::process::exit(code);
        }
    }
}

async fn serve(cfg: Config) -> anyhow::Result<()> {
    tracing::info!("Starting Bootstrapper Server");
    tracing::info!("Database: {}", cfg.db_path);
    tracing::info!("Archive Dir: {}", cfg.archive_dir);
    tracing::info!("Listen: {}", cfg.listen_addr);

    let state = Arc::new(AppState::init(cfg).await?);

    // Sweep expired artifacts once a minute
    state.cache.start_sweeper(Duration::from_secs(60));

    let listener = tokio::net::TcpListener::bind(&state.config.listen_addr).await?;
    tracing::info!("Bootstrapper listening on {}", state.config.listen_addr);

    let app = router::build(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Bootstrapper shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => { sig.recv().await; }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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
