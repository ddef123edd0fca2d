use std::env;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use rbac_admin::cache::spawn_sweeper;
use rbac_admin::{db, routes, AppState, Config};

const DEFAULT_ADDR: &str = "0.0.0.0:8040";
const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    if args.iter().any(|arg| arg == "-help" || arg == "--help") {
        println!("Usage: rbac-admin [OPTIONS]");
        println!("Options:");
        println!("  -config <path>  Path to configuration file (default: ./etc/config.toml)");
        println!("  -help, --help   Print this help message");
        return Ok(());
    }

    let config_path = args
        .iter()
        .skip_while(|arg| arg.as_str() != "-config")
        .nth(1)
        .map(|s| s.to_string())
        .unwrap_or_else(|| "./etc/config.toml".to_string());

    // Load configuration first (before logging init)
    let config = Config::load(&config_path).unwrap_or_else(|e| {
        eprintln!("Could not load config file: {}, using defaults", e);
        Config::default()
    });

    // Initialize logging
    // Priority: RUST_LOG env var > config file > default "info"
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log.level));

    fmt::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    info!("Starting RBAC admin server...");
    info!("Loading configuration from: {}", config_path);
    if config.root.password.is_empty() {
        tracing::warn!("Root password is empty, root login is disabled");
    }

    let db_conn = db::init_database(&config.database).await.map_err(|e| {
        tracing::error!("Database initialization failed: {}", e);
        anyhow::anyhow!("Database initialization failed: {}", e)
    })?;

    let addr: SocketAddr = config.addr.parse().or_else(|_| {
        tracing::warn!("Invalid address '{}', using default {}", config.addr, DEFAULT_ADDR);
        DEFAULT_ADDR.parse()
    })?;

    let state = AppState::new(config, db_conn).await.map_err(|e| {
        tracing::error!("Service initialization failed: {}", e);
        anyhow::anyhow!("Service initialization failed: {}", e)
    })?;

    // Background policy reload
    let shutdown = CancellationToken::new();
    let auto_load = state.casbinx.auto_load(shutdown.clone());
    let sweeper = spawn_sweeper(state.cache.clone(), CACHE_SWEEP_INTERVAL, shutdown.clone());

    let app = routes::create_router(state.clone());

    info!("Server listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Err(e) = auto_load.await {
        tracing::error!("Policy auto-load task failed: {}", e);
    }
    if let Err(e) = sweeper.await {
        tracing::error!("Cache sweeper task failed: {}", e);
    }
    state.auth.release().await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
    shutdown.cancel();
}
