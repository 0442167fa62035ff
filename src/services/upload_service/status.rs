use super::UploadService;
use crate::models::{SessionState, UploadStatus};
use crate::services::error::{TransferError, TransferResult};
use crate::utils::validation::validate_session_id;

impl UploadService {
    /// Read-only progress snapshot. Never takes the session lock.
    pub async fn upload_status(&self, session_id: &str) -> TransferResult<UploadStatus> {
        validate_session_id(session_id)?;
        Ok(match self.repo.get(session_id).await? {
            Some(session) => UploadStatus::from(&session),
            None => UploadStatus::not_found(),
        })
    }

    /// Discards a session that has not started reassembling.
    pub async fn abort_upload(&self, session_id: &str) -> TransferResult<()> {
        validate_session_id(session_id)?;
        let _guard = self.locks.lock(session_id).await;

        let session = self
            .repo
            .get(session_id)
            .await?
            .ok_or_else(|| TransferError::SessionNotFound(session_id.to_string()))?;
        if session.state == SessionState::Reassembling {
            return Err(TransferError::SessionBusy(session_id.to_string()));
        }

        self.repo.delete(session_id).await?;
        tracing::info!(
            session_id = %session_id,
            received = session.received_count(),
            total = session.total_chunks,
            "🛑 Upload aborted"
        );
        Ok(())
    }
}
