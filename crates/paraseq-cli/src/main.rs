#![doc = include_str!("../README.md")]

mod walk;

use std::sync::Arc;

use clap::Parser;
use paraseq::HookRegistry;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use walk::config::{CliArgs, WalkConfig};
use walk::WalkInfo;
use walk::telemetry::{init_telemetry, subscribe_logging};

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = WalkConfig::try_from(args)?;

    init_telemetry()?;
    log_startup_info(&config);

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let registry = Arc::new(HookRegistry::<u64, WalkInfo>::new());
    subscribe_logging(&registry);

    let summary = walk::run(&config, registry, &cancel).await?;
    tracing::info!(
        passes = summary.passes,
        items = summary.items,
        cancelled = cancel.is_cancelled(),
        "walk finished"
    );
    println!("{summary}");
    Ok(())
}

fn log_startup_info(config: &WalkConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting walk with full config: {:#?}", config);
    } else {
        tracing::info!(
            "Starting walk over {} items with {} workers",
            config.items,
            config.workers
        );
    }
}

/// Cancels `cancel` on Ctrl+C or SIGTERM. Workers stop advancing and the
/// current pass is terminated abruptly.
async fn shutdown_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::warn!("failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::warn!("failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }

    tracing::info!("Shutdown signal received, stopping workers...");
    cancel.cancel();
}
