use super::compression::{CompressionPool, compressed_name, is_compressed_container};
use super::error::UploadError;
use crate::utils::hash::calculate_hash;
use crate::utils::validation::{MAX_TOTAL_CHUNKS, is_valid_token};
use bytes::Bytes;
use rand::seq::SliceRandom;
use std::path::Path;

/// One indexed slice of the transfer payload.
#[derive(Debug, Clone)]
pub struct PlannedChunk {
    pub index: u32,
    pub payload: Bytes,
}

/// Everything needed to send one file.
///
/// Sizes, indices and the digest describe the transfer payload, which is
/// the compressed bytes when `compressed` is set.
#[derive(Debug, Clone)]
pub struct TransferPlan {
    pub session_id: String,
    pub file_name: String,
    pub original_size: u64,
    pub file_size: u64,
    pub chunk_size: usize,
    pub total_chunks: u32,
    pub sha256: String,
    pub compressed: bool,
    /// In index order
    pub chunks: Vec<PlannedChunk>,
    /// Shuffled queue order
    pub upload_order: Vec<u32>,
}

impl TransferPlan {
    pub fn chunk(&self, index: u32) -> Option<&PlannedChunk> {
        self.chunks.get(index as usize)
    }
}

/// Fresh session id in the receiver's accepted alphabet
pub fn new_session_id() -> String {
    format!("upload_{}", uuid::Uuid::new_v4().simple())
}

pub struct ChunkPlanner {
    chunk_size: usize,
    compression: Option<CompressionPool>,
}

impl ChunkPlanner {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            compression: None,
        }
    }

    pub fn with_compression(mut self, pool: CompressionPool) -> Self {
        self.compression = Some(pool);
        self
    }

    pub async fn plan_file(&self, path: &Path, session_id: String) -> Result<TransferPlan, UploadError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| UploadError::Planning(format!("no usable file name in {}", path.display())))?
            .to_string();
        let data = tokio::fs::read(path).await?;
        self.plan(session_id, file_name, Bytes::from(data)).await
    }

    pub async fn plan(
        &self,
        session_id: String,
        file_name: String,
        data: Bytes,
    ) -> Result<TransferPlan, UploadError> {
        if !is_valid_token(&session_id) {
            return Err(UploadError::Planning(format!("invalid session id '{}'", session_id)));
        }
        if self.chunk_size == 0 {
            return Err(UploadError::Planning("chunk size must be positive".to_string()));
        }
        if data.is_empty() {
            return Err(UploadError::Planning(format!("{} is empty", file_name)));
        }

        let original_size = data.len() as u64;
        let (payload, file_name, compressed) = self.maybe_compress(data, file_name).await;

        let chunks = split(&payload, self.chunk_size);
        if chunks.len() > MAX_TOTAL_CHUNKS as usize {
            return Err(UploadError::Planning(format!(
                "{} chunks exceeds the limit of {}; use a larger chunk size",
                chunks.len(),
                MAX_TOTAL_CHUNKS
            )));
        }
        let total_chunks = chunks.len() as u32;

        let mut upload_order: Vec<u32> = (0..total_chunks).collect();
        upload_order.shuffle(&mut rand::thread_rng());

        let sha256 = calculate_hash(&payload);

        tracing::debug!(
            session_id = %session_id,
            file_name = %file_name,
            total_chunks,
            chunk_size = self.chunk_size,
            compressed,
            "Transfer planned"
        );

        Ok(TransferPlan {
            session_id,
            file_name,
            original_size,
            file_size: payload.len() as u64,
            chunk_size: self.chunk_size,
            total_chunks,
            sha256,
            compressed,
            chunks,
            upload_order,
        })
    }

    async fn maybe_compress(&self, data: Bytes, file_name: String) -> (Bytes, String, bool) {
        let Some(pool) = &self.compression else {
            return (data, file_name, false);
        };
        if is_compressed_container(&file_name) {
            return (data, file_name, false);
        }

        match pool.compress(data.clone()).await {
            Ok(compressed) if compressed.len() < data.len() => {
                tracing::info!(
                    "🗜️  Compressed {}: {} -> {} bytes",
                    file_name,
                    data.len(),
                    compressed.len()
                );
                (compressed, compressed_name(&file_name), true)
            }
            Ok(_) => (data, file_name, false),
            Err(e) => {
                tracing::warn!("Compression of {} failed, sending uncompressed: {}", file_name, e);
                (data, file_name, false)
            }
        }
    }
}

/// Gap-free zero-copy slices of `chunk_size` bytes; the last one may be shorter.
pub fn split(payload: &Bytes, chunk_size: usize) -> Vec<PlannedChunk> {
    (0..payload.len())
        .step_by(chunk_size)
        .enumerate()
        .map(|(index, start)| PlannedChunk {
            index: index as u32,
            payload: payload.slice(start..(start + chunk_size).min(payload.len())),
        })
        .collect()
}
