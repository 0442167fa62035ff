use crate::models::{SessionState, UploadSession};
use crate::services::error::TransferResult;
use crate::services::staging::StagingArea;
use crate::utils::atomic_write::atomic_write;
use async_trait::async_trait;

/// Persistence for upload sessions.
///
/// Implementations do not lock; callers serialise read-modify-write cycles
/// per session with [`crate::utils::keyed_mutex::KeyedMutex`].
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn get(&self, session_id: &str) -> TransferResult<Option<UploadSession>>;
    async fn upsert(&self, session: &UploadSession) -> TransferResult<()>;
    /// Returns false if there was nothing to delete.
    async fn delete(&self, session_id: &str) -> TransferResult<bool>;
    async fn list_ids(&self) -> TransferResult<Vec<String>>;
}

/// Sessions stored as `metadata.json` inside each staging directory
#[derive(Debug, Clone)]
pub struct FsSessionStore {
    staging: StagingArea,
}

impl FsSessionStore {
    pub fn new(staging: StagingArea) -> Self {
        Self { staging }
    }

    /// Resets sessions left in `Reassembling` by a process that died mid-completion.
    ///
    /// Only call this before the server starts accepting requests.
    pub async fn recover_interrupted(&self) -> TransferResult<usize> {
        let mut recovered = 0;
        for id in self.list_ids().await? {
            let Ok(Some(mut session)) = self.get(&id).await else {
                continue;
            };
            if session.state == SessionState::Reassembling {
                session.state = SessionState::Receiving;
                self.upsert(&session).await?;
                tracing::warn!(session_id = %id, "Reset interrupted reassembly");
                recovered += 1;
            }
        }
        Ok(recovered)
    }
}

#[async_trait]
impl SessionRepository for FsSessionStore {
    async fn get(&self, session_id: &str) -> TransferResult<Option<UploadSession>> {
        match tokio::fs::read(self.staging.metadata_path(session_id)).await {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn upsert(&self, session: &UploadSession) -> TransferResult<()> {
        self.staging.create_session_dir(&session.session_id).await?;
        let raw = serde_json::to_vec(session)?;
        atomic_write(&self.staging.metadata_path(&session.session_id), &raw).await?;
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> TransferResult<bool> {
        if !self.staging.session_exists(session_id).await {
            return Ok(false);
        }
        self.staging.remove_session(session_id).await?;
        Ok(true)
    }

    async fn list_ids(&self) -> TransferResult<Vec<String>> {
        Ok(self.staging.list_sessions().await?)
    }
}
