//! PROSO server - Main entry point
//!
//! Serves the configuration, A/B experiment and subscription APIs over one
//! SQLite database in the root folder.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use proso_common::config::bootstrap::{default_config_path, DATABASE_FILE};
use proso_common::config::{resolve_root_folder, ServerConfig, Settings};
use proso_common::db::init::init_database;
use proso_server::{build_router, AppState};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for proso-server
#[derive(Parser, Debug)]
#[command(name = "proso-server")]
#[command(about = "Adaptive practice platform API server")]
#[command(version)]
struct Args {
    /// Root folder holding the database and settings file
    #[arg(short, long, env = "PROSO_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Server config file (TOML)
    #[arg(short, long, env = "PROSO_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "PROSO_PORT")]
    port: Option<u16>,

    /// Address to bind (overrides the config file)
    #[arg(short, long, env = "PROSO_BIND")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let (config, config_source) =
        ServerConfig::load(&config_path).context("Failed to load server config")?;

    // Initialize tracing; RUST_LOG wins over the config file
    let default_filter = format!(
        "proso_server={level},proso_common={level},proso_configab={level},proso_subscription={level},tower_http={level}",
        level = config.logging.level
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting PROSO server v{}", env!("CARGO_PKG_VERSION"));
    config_source.log();

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &config);
    info!("Root folder: {}", root_folder.display());

    let db = init_database(&root_folder.join(DATABASE_FILE))
        .await
        .context("Failed to initialize database")?;

    let settings_path = config.settings_path(&root_folder);
    let settings = Settings::load_or_default(&settings_path)
        .with_context(|| format!("Failed to load settings {}", settings_path.display()))?;

    let state = AppState::new(db, settings).context("Failed to build application state")?;
    let app = build_router(state);

    let bind = args.bind.unwrap_or(config.bind_address);
    let port = args.port.unwrap_or(config.port);
    let addr: SocketAddr = format!("{}:{}", bind, port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", bind, port))?;

    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
                error!("Failed to install terminate handler: {}", e);
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
