use std::sync::Arc;
use std::time::Duration;

use service::Scheduler;
use tokio_util::sync::CancellationToken;

const REPORT_INTERVAL: Duration = Duration::from_secs(30);

/// Periodically logs scheduler depth and liveness until shutdown.
pub async fn report_status(scheduler: Arc<Scheduler>, shutdown: CancellationToken) {
    let mut tick = tokio::time::interval(REPORT_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tick.tick() => {}
        }
        tracing::info!(
            queue_depth = scheduler.queue_size(),
            running = scheduler.is_running(),
            "scheduler status"
        );
    }
}
