use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use stl_upload_service::{
    build_state, config_types::LoggingConfig, create_router, UploadServiceConfig,
};

/// Command line arguments for the upload service
#[derive(Parser, Debug)]
#[command(name = "stl-upload")]
#[command(about = "STL model upload service")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<String>,

    /// Service host address
    #[arg(long)]
    host: Option<String>,

    /// Service port
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory uploaded files are written to
    #[arg(long)]
    upload_dir: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Load configuration
    let port = std::env::var("PORT").ok();
    let mut config = UploadServiceConfig::load(args.config.as_deref(), port)?;
    override_config_from_args(&mut config, args);

    init_tracing(&config.logging);

    info!(
        "Starting STL upload service v{}",
        env!("CARGO_PKG_VERSION")
    );

    let state = build_state(config).await?;
    let addr = state.config.bind_address();
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Upload server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Upload server shutting down");
    Ok(())
}

fn override_config_from_args(config: &mut UploadServiceConfig, args: Args) {
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(upload_dir) = args.upload_dir {
        config.storage.upload_dir = upload_dir;
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if logging.json_format {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
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
