//! Periodic dedup sweep of the partition files.
//!
//! Repairs the duplicates a crash or a concurrent view change can leave
//! behind, and normalizes single-box regions. Runs on a fixed interval using
//! `tokio::time::interval`; the first tick fires immediately, so a restart
//! after a crash is repaired straight away.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::service::AnnotationService;

/// Run the sweep loop until `cancel` is triggered.
pub async fn run(service: Arc<AnnotationService>, interval: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = interval.as_secs(), "Dedup sweep job started");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Dedup sweep job stopping");
                break;
            }
            _ = ticker.tick() => {
                match service.sweep().await {
                    Ok(report) if report.changed() => {
                        tracing::info!(
                            duplicates_removed = report.duplicates_removed(),
                            cross_partition_removed = report.cross_partition_removed,
                            "Dedup sweep: repaired partition files"
                        );
                    }
                    Ok(_) => tracing::debug!("Dedup sweep: nothing to repair"),
                    Err(e) => tracing::error!(error = %e, "Dedup sweep failed"),
                }
            }
        }
    }
}
