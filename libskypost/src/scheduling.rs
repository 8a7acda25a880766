//! Session refresh timing
//!
//! Bluesky refresh tokens expire, so an idle daemon still has to refresh on a
//! schedule. The timer does not refresh anything itself; it pushes
//! [`WorkItem::RefreshTick`] onto the work queue so refreshes are serialized
//! with publishes.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::service::queue::WorkItem;

/// Parse a humantime interval such as `"7days"` or `"12h"`
///
/// Zero-length intervals are rejected; the error is a human-readable reason.
pub fn parse_interval(input: &str) -> std::result::Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("interval cannot be empty".to_string());
    }

    let interval = humantime::parse_duration(input).map_err(|e| e.to_string())?;
    if interval.is_zero() {
        return Err("interval must be greater than zero".to_string());
    }
    Ok(interval)
}

/// Spawn a task that enqueues a refresh every `interval`
///
/// The first tick fires one full interval after start. The task ends when the
/// queue's receiving side is dropped.
pub fn spawn_refresh_timer(
    sender: mpsc::Sender<WorkItem>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            "Session refresh every {}",
            humantime::format_duration(interval)
        );

        loop {
            ticker.tick().await;
            tracing::debug!("Refresh timer fired");
            if sender.send(WorkItem::RefreshTick).await.is_err() {
                tracing::debug!("Work queue closed, stopping refresh timer");
                break;
            }
        }
    })
}
