//! Summit Processor - Main entry point

use anyhow::{Context, Result};
use std::sync::Arc;
use summit_common::logging::{init_logging, LogConfig};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

use summit_processor::{
    config::Config,
    db,
    faults::{FaultManager, StalenessMonitor},
    ingest::{daily::DailyProcessor, methane::MethaneProcessor, picarro::PicarroProcessor, voc::VocProcessor},
    notify,
    pipeline::{LogPlotSink, PlotSink, Scheduler},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Environment variables take precedence over the built-in defaults
    let log_config = LogConfig::builder()
        .log_file_prefix("summit-processor")
        .filter_directives("summit_processor=debug,sqlx=warn")
        .build()
        .merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    info!("Starting Summit processor");

    let config = Config::load()?;
    info!(
        database = %config.database.url,
        cycle_secs = config.schedule.cycle_interval_secs,
        "Configuration loaded"
    );

    let pool = db::create_pool(&config.database).await?;
    db::run_migrations(&pool).await?;
    db::health_check(&pool).await?;

    let notifier = notify::from_config(&config.notify).context("Failed to build notifier")?;
    let plot_sink: Arc<dyn PlotSink> = Arc::new(LogPlotSink);

    let faults = Arc::new(FaultManager::new(notifier.clone()));
    let monitor = Arc::new(StalenessMonitor::new(pool.clone(), config.faults.clone(), faults));

    let scheduler = Scheduler::new(config.schedule.clone(), notifier.clone())
        .with_processor(Arc::new(MethaneProcessor::new(
            pool.clone(),
            config.methane.clone(),
            plot_sink.clone(),
        )))
        .with_processor(Arc::new(VocProcessor::new(
            pool.clone(),
            config.voc.clone(),
            notifier.clone(),
            plot_sink.clone(),
        )))
        .with_processor(Arc::new(DailyProcessor::new(
            pool.clone(),
            config.voc.daily_dir.clone(),
            plot_sink.clone(),
        )))
        .with_processor(Arc::new(PicarroProcessor::new(
            pool.clone(),
            config.picarro.clone(),
            plot_sink,
        )))
        .with_monitor(monitor);

    let token = CancellationToken::new();
    let handle = scheduler.start(token.clone());
    info!("Processors started");

    shutdown_signal().await;
    token.cancel();
    handle.join().await;

    pool.close().await;
    info!("Summit processor shut down gracefully");

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }
}
