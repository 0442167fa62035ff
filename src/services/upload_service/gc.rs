use super::UploadService;
use crate::models::SessionState;
use crate::services::error::TransferResult;
use serde::Serialize;
use std::sync::atomic::Ordering;
use std::time::{Duration, SystemTime};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub removed: usize,
    pub skipped_busy: usize,
    pub failed: usize,
}

impl UploadService {
    /// Sweep with the configured retention window.
    pub async fn sweep_expired(&self) -> TransferResult<SweepReport> {
        self.sweep(self.config.staging_retention).await
    }

    /// Deletes staging areas idle for longer than `retention`.
    ///
    /// Sessions that are reassembling, or whose lock is currently held, are
    /// skipped regardless of age. Only one sweep runs at a time; a concurrent
    /// call returns an empty report.
    pub async fn sweep(&self, retention: Duration) -> TransferResult<SweepReport> {
        if self.sweeping.swap(true, Ordering::AcqRel) {
            tracing::debug!("Staging sweep already running");
            return Ok(SweepReport::default());
        }
        let result = self.sweep_inner(retention).await;
        self.sweeping.store(false, Ordering::Release);
        self.locks.cleanup();
        result
    }

    async fn sweep_inner(&self, retention: Duration) -> TransferResult<SweepReport> {
        let mut report = SweepReport::default();
        let now = SystemTime::now();

        for session_id in self.repo.list_ids().await? {
            report.scanned += 1;

            let Some(_guard) = self.locks.try_lock(&session_id) else {
                report.skipped_busy += 1;
                continue;
            };

            match self.repo.get(&session_id).await {
                Ok(Some(session)) if session.state == SessionState::Reassembling => {
                    report.skipped_busy += 1;
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    // Unreadable metadata still ages out by mtime.
                    tracing::warn!(session_id = %session_id, "Unreadable session metadata: {}", e);
                }
            }

            let last_modified = match self.staging.last_modified(&session_id).await {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(session_id = %session_id, "Cannot stat staging area: {}", e);
                    report.failed += 1;
                    continue;
                }
            };
            let idle = now.duration_since(last_modified).unwrap_or(Duration::ZERO);
            if idle <= retention {
                continue;
            }

            match self.staging.remove_session(&session_id).await {
                Ok(()) => {
                    report.removed += 1;
                    tracing::info!(
                        session_id = %session_id,
                        idle_secs = idle.as_secs(),
                        "🧹 Removed abandoned staging area"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(session_id = %session_id, "Failed to remove staging area: {}", e);
                }
            }
        }

        Ok(report)
    }
}
