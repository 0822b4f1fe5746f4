use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::formatter::format_status;
use super::webhook::WebhookNotifier;
use crate::pipeline::Statistics;

/// Log a statistics snapshot every `interval` (and post it when a notifier is given) until
/// `cancel` fires.
pub fn spawn_status_reporter(
    stats: Arc<Statistics>,
    interval: Duration,
    notifier: Option<WebhookNotifier>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if interval.is_zero() {
            return;
        }
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let snapshot = stats.snapshot();
            info!(status = %snapshot.render(), "Status update");
            if let Some(notifier) = &notifier {
                if let Err(e) = notifier.send(&format_status(&snapshot)).await {
                    warn!(error = %e, "Failed to deliver status update");
                }
            }
        }
    })
}
