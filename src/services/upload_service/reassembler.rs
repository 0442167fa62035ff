use super::UploadService;
use crate::models::{CompletedUpload, SessionState, UploadSession};
use crate::services::error::{TransferError, TransferResult};
use crate::utils::atomic_write::remove_file_if_exists;
use crate::utils::hash::digests_match;
use crate::utils::validation::{validate_destination_id, validate_session_id};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Copy buffer for streaming chunks into the final file.
/// Peak memory per reassembly is this, regardless of file size.
const COPY_BUFFER_SIZE: usize = 64 * 1024;

impl UploadService {
    /// Concatenates all staged chunks of `session_id` into the final artifact.
    ///
    /// The session is marked `Reassembling` for the duration so neither the
    /// garbage collector nor a second completion can touch it. The work runs on
    /// its own task and settles the session even if the caller goes away. On
    /// failure the staged chunks stay put and completion can be retried.
    pub async fn complete_upload(
        &self,
        session_id: &str,
        destination_id: &str,
        expected_sha256: Option<&str>,
    ) -> TransferResult<CompletedUpload> {
        validate_session_id(session_id)?;
        validate_destination_id(destination_id)?;

        // Detached: a dropped request must not strand the session in `Reassembling`.
        let service = self.clone();
        let session_id = session_id.to_string();
        let destination_id = destination_id.to_string();
        let expected_sha256 = expected_sha256.map(str::to_string);
        tokio::spawn(async move {
            let session = service.begin_reassembly(&session_id).await?;
            service
                .finish_reassembly(session, &destination_id, expected_sha256.as_deref())
                .await
        })
        .await
        .map_err(|e| TransferError::Storage(std::io::Error::other(e)))?
    }

    /// Checks the session is complete and marks it `Reassembling`.
    async fn begin_reassembly(&self, session_id: &str) -> TransferResult<UploadSession> {
        let _guard = self.locks.lock(session_id).await;
        let mut session = self
            .repo
            .get(session_id)
            .await?
            .ok_or_else(|| TransferError::SessionNotFound(session_id.to_string()))?;

        if session.state == SessionState::Reassembling {
            return Err(TransferError::SessionBusy(session_id.to_string()));
        }
        if !session.is_complete() {
            return Err(TransferError::Incomplete {
                received: session.received_count(),
                total: session.total_chunks,
            });
        }

        session.state = SessionState::Reassembling;
        self.repo.upsert(&session).await?;
        Ok(session)
    }

    /// Assembles, commits and settles a session already marked `Reassembling`.
    /// Success deletes the session; failure puts it back to `Receiving`.
    async fn finish_reassembly(
        &self,
        session: UploadSession,
        destination_id: &str,
        expected_sha256: Option<&str>,
    ) -> TransferResult<CompletedUpload> {
        let session_id = session.session_id.as_str();
        tracing::info!(
            session_id = %session_id,
            chunks = session.total_chunks,
            "🔄 Assembling chunks"
        );
        let started = Instant::now();
        let final_path = self
            .storage
            .destination_path(destination_id, &session.file_name);

        let outcome = match self.assemble(&session, &final_path, expected_sha256).await {
            Ok(digest) => match self.storage.commit(destination_id, &final_path).await {
                Ok(()) => Ok(digest),
                Err(e) => {
                    let _ = remove_file_if_exists(&final_path).await;
                    Err(TransferError::Commit(e.to_string()))
                }
            },
            Err(e) => Err(e),
        };

        let _guard = self.locks.lock(session_id).await;
        match outcome {
            Ok(sha256) => {
                self.repo.delete(session_id).await?;

                let elapsed_ms = (Utc::now() - session.created_at).num_milliseconds().max(0) as u64;
                let throughput = if elapsed_ms > 0 {
                    session.declared_size as f64 / (elapsed_ms as f64 / 1000.0)
                } else {
                    0.0
                };
                tracing::info!(
                    session_id = %session_id,
                    path = %final_path.display(),
                    size = session.declared_size,
                    reassembly_ms = started.elapsed().as_millis() as u64,
                    "✅ Upload completed"
                );

                Ok(CompletedUpload {
                    file_name: final_path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    file_size: session.declared_size,
                    destination_path: final_path.to_string_lossy().into_owned(),
                    chunk_count: session.total_chunks,
                    elapsed_ms,
                    throughput_bytes_per_sec: throughput,
                    sha256,
                })
            }
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "❌ Reassembly failed");
                if let Some(mut current) = self.repo.get(session_id).await? {
                    current.state = SessionState::Receiving;
                    if let TransferError::MissingChunk { index } = e {
                        // Let the sender see the gap and resend it.
                        current.received_chunks.remove(&index);
                    }
                    self.repo.upsert(&current).await?;
                }
                Err(e)
            }
        }
    }

    /// Streams chunks into `<final>.part`, checks size and digest, then renames.
    async fn assemble(
        &self,
        session: &UploadSession,
        final_path: &Path,
        expected_sha256: Option<&str>,
    ) -> TransferResult<String> {
        if let Some(parent) = final_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let part_path = part_path(final_path);

        let digest = match self.concatenate(session, &part_path).await {
            Ok(digest) => digest,
            Err(e) => {
                let _ = remove_file_if_exists(&part_path).await;
                return Err(e);
            }
        };

        let actual = tokio::fs::metadata(&part_path).await?.len();
        if actual != session.declared_size {
            remove_file_if_exists(&part_path).await?;
            return Err(TransferError::SizeMismatch {
                expected: session.declared_size,
                actual,
            });
        }

        if let Some(expected) = expected_sha256 {
            if !digests_match(expected, &digest) {
                remove_file_if_exists(&part_path).await?;
                return Err(TransferError::DigestMismatch {
                    expected: expected.to_ascii_lowercase(),
                    actual: digest,
                });
            }
        }

        tokio::fs::rename(&part_path, final_path).await?;
        Ok(digest)
    }

    async fn concatenate(&self, session: &UploadSession, part_path: &Path) -> TransferResult<String> {
        let mut output = tokio::fs::File::create(part_path).await?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];

        for index in 0..session.total_chunks {
            let chunk_path = self.staging.chunk_path(&session.session_id, index);
            let mut chunk = match tokio::fs::File::open(&chunk_path).await {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(TransferError::MissingChunk { index });
                }
                Err(e) => return Err(e.into()),
            };

            loop {
                let n = chunk.read(&mut buffer).await?;
                if n == 0 {
                    break;
                }
                hasher.update(&buffer[..n]);
                output.write_all(&buffer[..n]).await?;
            }
        }

        output.flush().await?;
        output.sync_all().await?;
        Ok(hex::encode(hasher.finalize()))
    }
}

fn part_path(final_path: &Path) -> PathBuf {
    let mut name = final_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    final_path.with_file_name(name)
}
