mod config;
mod monitor;
mod server;
mod tasks;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use podwatch_k8s::KubeClusterApi;
use podwatch_notify::NotificationDispatcher;

use crate::config::{Args, Config};
use crate::monitor::Monitor;
use crate::server::AppState;
use crate::tasks::TaskRegistry;

/// How often expired task records are swept
const REAPER_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .with_writer(std::io::stderr)
        .init();

    let result = run(args).await;

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

/// Filter from `RUST_LOG` directives, or `info` when unset or unparsable
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

async fn run(args: Args) -> Result<()> {
    let config = Config::load(&args)?;
    info!(
        listen = %config.listen,
        max_concurrent_tasks = config.max_concurrent_tasks,
        tail_lines = config.tail_lines,
        "Starting podwatch"
    );

    let dispatcher = NotificationDispatcher::new(config.notify_timeout())?;
    let registry = TaskRegistry::new(config.task_retention());
    let monitor = Monitor::new(
        Arc::new(KubeClusterApi::new()),
        dispatcher,
        registry.clone(),
        &config,
    );

    let shutdown = CancellationToken::new();
    let reaper = registry.spawn_reaper(REAPER_INTERVAL, shutdown.clone());
    tokio::spawn(wait_for_signal(shutdown.clone()));

    let state = AppState {
        monitor: monitor.clone(),
    };
    server::run_server(state, config.listen, shutdown.clone()).await?;

    monitor.close();
    shutdown.cancel();
    let _ = reaper.await;
    info!("Podwatch stopped");

    Ok(())
}

/// Cancel `shutdown` on Ctrl-C or SIGTERM
async fn wait_for_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
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
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
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

    info!("Shutdown signal received");
    shutdown.cancel();
}
