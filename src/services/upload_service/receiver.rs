use super::UploadService;
use crate::models::{ChunkAck, IncomingChunk, SessionState, UploadSession};
use crate::services::error::{TransferError, TransferResult};
use crate::utils::validation::{
    validate_chunk_index, validate_chunk_size, validate_file_name, validate_session_id,
};
use rand::Rng;

impl UploadService {
    /// Accepts one chunk: validate, stage the bytes, record the index.
    ///
    /// The payload is written to a temp file outside the session lock; making it
    /// visible and recording the index happen under the lock, after checking
    /// that no reassembly has started.
    pub async fn receive_chunk(&self, chunk: IncomingChunk) -> TransferResult<ChunkAck> {
        self.validate_chunk(&chunk)?;
        let session_id = chunk.session_id.as_str();

        {
            let _guard = self.locks.lock(session_id).await;
            match self.repo.get(session_id).await? {
                Some(session) => {
                    ensure_consistent(&session, &chunk)?;
                    if session.state == SessionState::Reassembling {
                        return Err(TransferError::SessionBusy(session_id.to_string()));
                    }
                }
                None => {
                    let session = UploadSession::new(
                        session_id,
                        &chunk.file_name,
                        chunk.file_size,
                        chunk.total_chunks,
                    );
                    self.repo.upsert(&session).await?;
                    tracing::info!(
                        session_id = %session_id,
                        file_name = %chunk.file_name,
                        total_chunks = chunk.total_chunks,
                        file_size = chunk.file_size,
                        "🆕 Upload session created"
                    );
                }
            }
        }

        let staged = self
            .staging
            .stage_chunk(session_id, chunk.index, &chunk.payload)
            .await?;

        let ack = {
            let _guard = self.locks.lock(session_id).await;
            let mut session = match self.still_receiving(session_id).await {
                Ok(session) => session,
                Err(e) => {
                    let _ = self.staging.discard_staged(&staged).await;
                    return Err(e);
                }
            };
            self.staging
                .commit_chunk(session_id, chunk.index, &staged)
                .await?;

            if !session.mark_received(chunk.index) {
                tracing::debug!(session_id = %session_id, index = chunk.index, "Duplicate chunk replaced");
            }
            self.repo.upsert(&session).await?;

            ChunkAck {
                accepted: true,
                chunk_index: chunk.index,
                received_count: session.received_count(),
                total_chunks: session.total_chunks,
                progress_percent: session.progress_percent(),
            }
        };

        tracing::debug!(
            session_id = %session_id,
            index = chunk.index,
            received = ack.received_count,
            total = ack.total_chunks,
            "Chunk stored"
        );

        self.maybe_collect_garbage();
        Ok(ack)
    }

    /// Re-reads the session under its lock before a staged chunk goes live.
    async fn still_receiving(&self, session_id: &str) -> TransferResult<UploadSession> {
        match self.repo.get(session_id).await? {
            // Completed or aborted while the payload was being written.
            None => Err(TransferError::SessionNotFound(session_id.to_string())),
            // A completion started meanwhile; its chunk files must not change.
            Some(session) if session.state == SessionState::Reassembling => {
                Err(TransferError::SessionBusy(session_id.to_string()))
            }
            Some(session) => Ok(session),
        }
    }

    fn validate_chunk(&self, chunk: &IncomingChunk) -> TransferResult<()> {
        validate_session_id(&chunk.session_id)?;
        validate_chunk_index(chunk.index, chunk.total_chunks)?;
        if chunk.file_size == 0 {
            return Err(TransferError::InvalidFileSize);
        }
        validate_file_name(&chunk.file_name, &self.config.allowed_extensions)?;
        validate_chunk_size(chunk.payload.len(), self.config.max_chunk_size)?;
        Ok(())
    }

    /// Kicks off a background sweep with probability `gc_probability`.
    fn maybe_collect_garbage(&self) {
        let p = self.config.gc_probability;
        if p <= 0.0 || !rand::thread_rng().gen_bool(p.min(1.0)) {
            return;
        }
        let service = self.clone();
        tokio::spawn(async move {
            if let Err(e) = service.sweep_expired().await {
                tracing::warn!("Opportunistic staging sweep failed: {}", e);
            }
        });
    }
}

/// A session id must keep describing the same file for its whole life.
fn ensure_consistent(session: &UploadSession, chunk: &IncomingChunk) -> TransferResult<()> {
    let detail = if session.total_chunks != chunk.total_chunks {
        format!("total_chunks {} != {}", chunk.total_chunks, session.total_chunks)
    } else if session.declared_size != chunk.file_size {
        format!("file_size {} != {}", chunk.file_size, session.declared_size)
    } else if session.file_name != chunk.file_name {
        format!("file_name '{}' != '{}'", chunk.file_name, session.file_name)
    } else {
        return Ok(());
    };

    Err(TransferError::SessionMismatch {
        session_id: session.session_id.clone(),
        detail,
    })
}
