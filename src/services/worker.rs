use crate::services::upload_service::UploadService;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};

/// Shortest sweep period; `tokio::time::interval` panics on zero.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Runs the staging garbage collector on a fixed interval until shutdown.
pub struct BackgroundWorker {
    uploads: UploadService,
    period: Duration,
    shutdown: watch::Receiver<bool>,
}

impl BackgroundWorker {
    pub fn new(uploads: UploadService, period: Duration, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            uploads,
            period: period.max(MIN_PERIOD),
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("🚀 Background worker started (sweep every {:?})", self.period);

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so startup is not a sweep.
        ticker.tick().await;

        loop {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        tracing::info!("🛑 Background worker shutting down");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.perform_cleanup().await;
                }
            }
        }
    }

    async fn perform_cleanup(&self) {
        tracing::info!("🧹 Running staging cleanup...");
        match self.uploads.sweep_expired().await {
            Ok(report) => tracing::info!(
                scanned = report.scanned,
                removed = report.removed,
                skipped_busy = report.skipped_busy,
                failed = report.failed,
                "✅ Staging cleanup completed"
            ),
            Err(e) => tracing::error!("Staging cleanup failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UploadConfig;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_worker_stops_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let uploads = UploadService::new(UploadConfig::development(dir.path()));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(BackgroundWorker::new(uploads, Duration::from_millis(10), rx).run());
        tokio::time::sleep(Duration::from_millis(35)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_zero_period_is_floored() {
        let dir = TempDir::new().unwrap();
        let uploads = UploadService::new(UploadConfig::development(dir.path()));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(BackgroundWorker::new(uploads, Duration::ZERO, rx).run());
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker did not stop")
            .unwrap();
    }
}
