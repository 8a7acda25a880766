//! skypost-send - Background daemon for crossposting
//!
//! Reads post ids from stdin, one per line, and publishes each to Bluesky in
//! arrival order. A timer refreshes the session on a schedule so it stays
//! valid between posts.

use clap::Parser;
use libskypost::scheduling::{parse_interval, spawn_refresh_timer};
use libskypost::service::events::EventReceiver;
use libskypost::service::SkypostService;
use libskypost::{Config, Result, SkypostError};
use std::future::Future;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "skypost-send")]
#[command(version)]
#[command(about = "Background daemon that crossposts published posts to Bluesky")]
#[command(long_about = "\
skypost-send - Background daemon for crossposting

DESCRIPTION:
    skypost-send reads post ids from stdin, one per line, and publishes each
    one to Bluesky. Posts are handled one at a time: the session is refreshed,
    then the record is created. Nothing is retried; every attempt is written
    to the history database (see skypost-history).

    Blank lines and lines starting with '#' are ignored. Only the first
    whitespace-separated word of a line is used.

    A timer refreshes the stored session every scheduling.refresh_interval
    (default 7days) even when no posts arrive.

USAGE:
    # Feed ids from the CMS hook
    cms-publish-hook | skypost-send

    # Process a batch and exit
    printf '5\\n6\\n' | skypost-send --once

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes queued posts)

CONFIGURATION:
    Configuration file: ~/.config/skypost/config.toml (or $SKYPOST_CONFIG)

    [scheduling]
    refresh_interval = \"7days\"

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime or configuration error
    3 - Invalid arguments
")]
struct Cli {
    /// Session refresh interval (overrides config), e.g. "12h"
    #[arg(long, value_name = "DURATION")]
    refresh_interval: Option<String>,

    /// Enable verbose logging to stderr, including every progress event
    #[arg(short, long)]
    verbose: bool,

    /// Exit once stdin is exhausted and the queue is empty; no refresh timer
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    libskypost::logging::init("info", cli.verbose);

    match run(cli).await {
        // A pending stdin read would otherwise hold the runtime open
        Ok(()) => std::process::exit(0),
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;

    let refresh_interval = match &cli.refresh_interval {
        Some(input) => parse_interval(input).map_err(|reason| {
            SkypostError::InvalidInput(format!("--refresh-interval '{}': {}", input, reason))
        })?,
        None => config.scheduling.refresh_interval()?,
    };

    let service = SkypostService::from_config(config).await?;
    let event_log = cli.verbose.then(|| tokio::spawn(log_events(service.subscribe())));
    let (queue, worker) = service.work_queue();
    let worker = tokio::spawn(worker.run());

    let timer = if cli.once {
        None
    } else {
        Some(spawn_refresh_timer(queue.sender(), refresh_interval))
    };

    let shutdown = shutdown_signal()?;
    tokio::pin!(shutdown);

    info!("skypost-send daemon starting");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut reading = true;

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Received shutdown signal, stopping gracefully...");
                break;
            }
            line = lines.next_line(), if reading => match line {
                Ok(Some(line)) => {
                    let Some(post_id) = parse_line(&line) else {
                        continue;
                    };
                    debug!("Queueing post {}", post_id);
                    if !queue.post_published(post_id).await {
                        warn!("Worker stopped, no longer accepting posts");
                        break;
                    }
                }
                Ok(None) => {
                    debug!("stdin closed");
                    if cli.once {
                        break;
                    }
                    reading = false;
                }
                Err(e) => {
                    error!("Failed to read stdin: {}", e);
                    if cli.once {
                        break;
                    }
                    reading = false;
                }
            },
        }
    }

    if let Some(timer) = timer {
        timer.abort();
        // The timer holds a queue sender; wait for it to drop
        let _ = timer.await;
    }
    drop(queue);

    match worker.await {
        Ok(stats) => info!(
            "skypost-send stopped: {} sent, {} not sent, {} refreshes ({} failed)",
            stats.sent, stats.unsent, stats.refreshes, stats.refresh_failures
        ),
        Err(e) => error!("Worker task ended abnormally: {}", e),
    }

    // Closes the event bus so the logger sees the last events and stops
    drop(service);
    if let Some(event_log) = event_log {
        let _ = event_log.await;
    }

    Ok(())
}

/// Log every progress event as one JSON object at debug level
async fn log_events(mut events: EventReceiver) {
    loop {
        match events.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => debug!("event {}", json),
                Err(e) => warn!("Failed to encode event {:?}: {}", event, e),
            },
            Err(RecvError::Lagged(skipped)) => warn!("Event log skipped {} events", skipped),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Post id on a stdin line, if any
fn parse_line(line: &str) -> Option<&str> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    line.split_whitespace().next()
}

#[cfg(unix)]
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    use futures::stream::StreamExt;
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook_tokio::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])
        .map_err(|e| SkypostError::InvalidInput(format!("Signal setup failed: {}", e)))?;

    Ok(async move {
        if let Some(signal) = signals.next().await {
            debug!("Caught signal {}", signal);
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    Ok(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Ctrl-C handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    })
}
