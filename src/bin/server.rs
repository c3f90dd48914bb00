use chatdesk::db;
use chatdesk::server::config::ServerConfig;
use chatdesk::server::lifecycle::spawn_lifecycle_tasks;
use chatdesk::web::{AppState, create_axum_router};

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,
}

/// The returned guard flushes the file writer on drop; keep it alive for the process lifetime.
fn init_logging(log_dir: &str) -> WorkerGuard {
    // Log to a file: JSON format, daily rotation
    let (file_writer, guard) = tracing_appender::non_blocking(rolling::daily(log_dir, "server.log"));
    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .json();

    // Log to stdout: human-readable format
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sea_orm=warn,sqlx::query=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    // Config comes first because it names the log directory.
    let server_config = match ServerConfig::load(args.config.as_deref()) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("Failed to load server configuration: {e}");
            return Err(e.into());
        }
    };

    let _log_guard = init_logging(&server_config.log_dir);
    info!(version = env!("CARGO_PKG_VERSION"), "Starting chatdesk server...");

    let db_pool = match db::connect_and_prepare(&server_config.database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            error!(error = %e, "Failed to connect to the database.");
            return Err(e.into());
        }
    };
    info!("Database connection established and schema is up to date.");

    let app_state = Arc::new(AppState::new(db_pool.clone(), server_config.clone())?);
    let lifecycle_handle = spawn_lifecycle_tasks(
        db_pool,
        app_state.chat_limiter.clone(),
        app_state.login_tracker.clone(),
    );

    let app = create_axum_router(app_state);
    let listener = tokio::net::TcpListener::bind(&server_config.listen_addr).await?;
    info!(addr = %server_config.listen_addr, base_domain = %server_config.base_domain, "HTTP server listening.");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    lifecycle_handle.abort();
    info!("Server shut down.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for the shutdown signal.");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received.");
}
