use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sessions_api::auth::{SessionStore, UserStore};
use sessions_api::config::{ConfigStore, DEFAULT_SESSION_SECRET};
use sessions_api::state::AppState;
use sessions_api::web;

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// sessions-api command line arguments
#[derive(Parser, Debug)]
#[command(name = "sessions-api")]
#[command(version, about = "Users API with cookie-keyed server-side sessions", long_about = None)]
struct CliArgs {
    /// Listen address (overrides database config)
    #[arg(short = 'a', long, value_name = "ADDRESS")]
    address: Option<String>,

    /// HTTP port (overrides database config)
    #[arg(short = 'p', long, value_name = "PORT")]
    port: Option<u16>,

    /// Data directory path (default: ./data)
    #[arg(short = 'd', long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Only send the session cookie over HTTPS (overrides database config)
    #[arg(long)]
    secure_cookie: bool,

    /// Secret signing the session cookie (overrides database config)
    #[arg(long, value_name = "SECRET", env = "SESSIONS_API_SECRET")]
    session_secret: Option<String>,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    init_logging(args.log_level, args.verbose);

    tracing::info!("Starting sessions-api v{}", env!("CARGO_PKG_VERSION"));

    let data_dir = args.data_dir.unwrap_or_else(get_data_dir);
    tracing::info!("Data directory: {}", data_dir.display());
    tokio::fs::create_dir_all(&data_dir).await?;

    let db_path = data_dir.join("sessions-api.db");
    let config_store = ConfigStore::new(&db_path).await?;
    let mut config = (*config_store.get()).clone();

    // CLI overrides apply to this run only
    if let Some(addr) = args.address {
        config.web.bind_address = addr;
    }
    if let Some(port) = args.port {
        config.web.http_port = port;
    }
    if args.secure_cookie {
        config.session.secure = true;
    }
    if let Some(secret) = args.session_secret {
        config.session.secret = secret;
    }
    config_store.set_runtime(config.clone())?;

    if config.session.secret == DEFAULT_SESSION_SECRET {
        tracing::warn!("Session cookies are signed with the default secret; set --session-secret");
    }
    if !config.session.secure {
        tracing::warn!("Session cookie is not restricted to HTTPS");
    }

    let ip: IpAddr = config
        .web
        .bind_address
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid bind address: {}", config.web.bind_address))?;
    let addr = SocketAddr::new(ip, config.web.http_port);

    let session_store = SessionStore::new(config_store.pool().clone(), &config.session);
    if config.session.create_table {
        session_store.init_schema().await?;
    }

    let user_store = UserStore::new(config_store.pool().clone());

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let state = AppState::new(
        config_store.clone(),
        session_store.clone(),
        user_store,
        shutdown_tx.clone(),
    )?;

    let sweeper = session_store.spawn_sweeper(
        Duration::from_secs(config.session.sweep_interval_secs),
        state.shutdown_signal(),
    );
    tracing::info!(
        "Session sweeper started (every {}s)",
        config.session.sweep_interval_secs
    );

    let app = web::create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Starting HTTP server on {}", listener.local_addr()?);

    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    if let Err(e) = sweeper.await {
        tracing::warn!("Session sweeper ended abnormally: {}", e);
    }
    config_store.pool().close().await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Initialize logging with tracing
fn init_logging(level: LogLevel, verbose_count: u8) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "sessions_api=error,tower_http=error",
        LogLevel::Warn => "sessions_api=warn,tower_http=warn",
        LogLevel::Info => "sessions_api=info,tower_http=info",
        LogLevel::Verbose => "sessions_api=debug,tower_http=info",
        LogLevel::Debug => "sessions_api=debug,tower_http=debug,sqlx=info",
        LogLevel::Trace => "sessions_api=trace,tower_http=debug,sqlx=debug",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}

/// Get the application data directory
fn get_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var("SESSIONS_API_DATA_DIR") {
        return PathBuf::from(path);
    }

    PathBuf::from("data")
}
