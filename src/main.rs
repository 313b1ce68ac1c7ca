use anyhow::{Context, Result};
use authd::core::config::Config;
use authd::core::startup::open_backend;
use authd::core::state::AppState;
use authd::core::tracing_init::init_tracing;
use authd::server::{Acceptor, Shutdown, Sweeper};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    let config_path = if args.len() > 1 {
        PathBuf::from(&args[1])
    } else {
        PathBuf::from("config.toml")
    };

    // Load and validate configuration
    let config = Config::from_file(&config_path).context(format!(
        "Failed to load configuration from '{}'. \
        If this is your first time running the server, copy config.example.toml to config.toml and adjust the values.",
        config_path.display()
    ))?;

    init_tracing(&config.logging)?;

    // Build Tokio runtime with configured number of threads
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.num_threads)
        .enable_all()
        .build()
        .context("Failed to build Tokio runtime")?;

    runtime.block_on(async_main(config, config_path))
}

async fn async_main(config: Config, config_path: PathBuf) -> Result<()> {
    info!(
        config_path = %config_path.display(),
        address = %config.bind_address(),
        num_threads = config.server.num_threads,
        session_ttl_seconds = config.sessions.ttl_seconds,
        log_level = %config.logging.level,
        log_format = %config.logging.format,
        "Auth server starting"
    );

    let backend = open_backend(&config).await?;
    let state = Arc::new(AppState::new(backend.clone(), config.session_ttl()));

    let sweeper = Sweeper::spawn(Arc::clone(&state.authority), config.sweep_interval());
    info!(
        sweep_interval_seconds = config.sessions.sweep_interval_seconds,
        "Session sweeper started"
    );

    tokio::spawn(watch_signals(state.shutdown.clone()));

    let mut acceptor = Acceptor::bind(&config.bind_address(), Arc::clone(&state), config.accept_timeout()).await?;
    info!(
        address = %acceptor.local_addr()?,
        users = backend.user_count(),
        "Listener bound, accepting connections"
    );

    acceptor.run().await;

    info!("Shutting down gracefully");
    sweeper.stop().await;
    backend.disconnect();
    info!("Shutdown complete");

    Ok(())
}

/// Trigger the shutdown flag on Ctrl+C or SIGTERM
async fn watch_signals(shutdown: Shutdown) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }

    shutdown.trigger();
}
