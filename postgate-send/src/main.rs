//! postgate-send - Background daemon for due upload runs
//!
//! Polls the run queue and uploads each due run to Twitter/X and LinkedIn.

use anyhow::{Context, Result};
use clap::Parser;
use libpostgate::dispatcher::Dispatcher;
use libpostgate::logging::LoggingConfig;
use libpostgate::{Config, PostgateError, PostgateService};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "postgate-send")]
#[command(version)]
#[command(about = "Background daemon that uploads due runs")]
#[command(long_about = "\
postgate-send - Background daemon that uploads due runs

DESCRIPTION:
    postgate-send is a long-running daemon that watches the Postgate run
    queue and uploads each run once it is due.

    Both providers are attempted for every run. A failure on one provider
    is reported to the Slack channel (when configured) and does not stop
    the other. The run ends as posted, partial or failed; use
    `postgate-inbox retry <RUN_ID>` to try the failed providers again.

USAGE:
    # Run in foreground (logs to stderr)
    postgate-send

    # Poll every 15 seconds
    postgate-send --poll-interval 15

    # Process due runs once and exit (cron-friendly)
    postgate-send --once

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes the current run)

CONFIGURATION:
    Configuration file: ~/.config/postgate/config.toml
    Override with POSTGATE_CONFIG.

    [dispatch]
    poll_interval = 60  # seconds between polls

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Configuration error
")]
struct Cli {
    /// Poll interval in seconds (overrides config)
    #[arg(long, value_name = "SECONDS")]
    poll_interval: Option<u64>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Process due runs once and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::for_binary(cli.verbose, "info").init();

    if let Err(e) = run(cli).await {
        error!("postgate-send failed: {:#}", e);
        eprintln!("Error: {:#}", e);
        let code = e
            .downcast_ref::<PostgateError>()
            .map(PostgateError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let poll_interval = cli.poll_interval.unwrap_or(config.dispatch.poll_interval);
    if poll_interval == 0 {
        return Err(PostgateError::InvalidInput(
            "--poll-interval must be at least 1 second".to_string(),
        )
        .into());
    }

    let service = PostgateService::from_config(config).await?;
    info!(
        "postgate-send daemon starting ({} credentials)",
        service.credentials_mode()
    );

    if cli.once {
        process_due_runs(service.dispatcher()).await?;
        info!("postgate-send: processed due runs once, exiting");
    } else {
        let shutdown = Arc::new(AtomicBool::new(false));
        setup_signal_handlers(shutdown.clone())?;
        info!("Poll interval: {}s", poll_interval);
        run_daemon_loop(service.dispatcher(), poll_interval, shutdown).await;
    }

    info!("postgate-send daemon stopped");
    Ok(())
}

#[cfg(unix)]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("Failed to install signal handlers")?;

    std::thread::spawn(move || {
        if signals.forever().next().is_some() {
            info!("Received shutdown signal, stopping gracefully...");
            shutdown.store(true, Ordering::Relaxed);
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handlers(_shutdown: Arc<AtomicBool>) -> Result<()> {
    Ok(())
}

async fn run_daemon_loop(dispatcher: &Dispatcher, poll_interval: u64, shutdown: Arc<AtomicBool>) {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            info!("Shutdown requested, stopping daemon loop");
            break;
        }

        if let Err(e) = process_due_runs(dispatcher).await {
            error!("Error processing runs: {}", e);
        }

        // Sleep until next poll (check shutdown every second)
        for _ in 0..poll_interval {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            sleep(Duration::from_secs(1)).await;
        }
    }
}

async fn process_due_runs(dispatcher: &Dispatcher) -> Result<()> {
    let summary = dispatcher
        .dispatch_due(chrono::Utc::now().timestamp())
        .await?;

    if summary.total() > 0 || summary.skipped > 0 {
        info!(
            "Dispatched {} run(s): {} posted, {} partial, {} failed, {} skipped",
            summary.total(),
            summary.posted,
            summary.partial,
            summary.failed,
            summary.skipped
        );
    }
    Ok(())
}
