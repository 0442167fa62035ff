use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use utoipa::ToSchema;
use validator::Validate;

/// Lifecycle marker persisted with the session metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Receiving,
    Reassembling,
}

/// Receiver-side bookkeeping for one transfer, stored as `metadata.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadSession {
    pub session_id: String,
    pub file_name: String,
    pub declared_size: u64,
    pub total_chunks: u32,
    pub received_chunks: BTreeSet<u32>,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl UploadSession {
    pub fn new(session_id: &str, file_name: &str, declared_size: u64, total_chunks: u32) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.to_string(),
            file_name: file_name.to_string(),
            declared_size,
            total_chunks,
            received_chunks: BTreeSet::new(),
            state: SessionState::Receiving,
            created_at: now,
            last_activity_at: now,
        }
    }

    /// Adds `index` to the received set. Returns false if it was already there.
    pub fn mark_received(&mut self, index: u32) -> bool {
        self.last_activity_at = Utc::now();
        if index >= self.total_chunks {
            return false;
        }
        self.received_chunks.insert(index)
    }

    pub fn received_count(&self) -> u32 {
        self.received_chunks.len() as u32
    }

    pub fn is_complete(&self) -> bool {
        self.received_count() == self.total_chunks
    }

    pub fn missing_chunks(&self) -> Vec<u32> {
        (0..self.total_chunks)
            .filter(|i| !self.received_chunks.contains(i))
            .collect()
    }

    pub fn progress_percent(&self) -> f64 {
        if self.total_chunks == 0 {
            return 0.0;
        }
        self.received_count() as f64 / self.total_chunks as f64 * 100.0
    }
}

/// One chunk as it arrives at the receiver
#[derive(Debug, Clone)]
pub struct IncomingChunk {
    pub session_id: String,
    pub index: u32,
    pub total_chunks: u32,
    pub file_name: String,
    pub file_size: u64,
    pub payload: bytes::Bytes,
}

/// Multipart form accepted by `POST /upload/chunk` (documentation only)
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct ChunkUploadForm {
    pub session_id: String,
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub file_name: String,
    pub file_size: u64,
    #[schema(value_type = String, format = Binary)]
    pub chunk: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChunkAck {
    pub accepted: bool,
    pub chunk_index: u32,
    pub received_count: u32,
    pub total_chunks: u32,
    pub progress_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct CompleteUploadRequest {
    #[validate(length(min = 1, max = 128, message = "Invalid session id"))]
    pub session_id: String,
    #[validate(length(min = 1, max = 128, message = "Invalid destination id"))]
    pub destination_id: String,
    /// Hex SHA-256 of the whole transfer payload, checked during reassembly
    #[validate(length(equal = 64, message = "Invalid sha256 digest"))]
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CompletedUpload {
    pub file_name: String,
    pub file_size: u64,
    pub destination_path: String,
    pub chunk_count: u32,
    pub elapsed_ms: u64,
    pub throughput_bytes_per_sec: f64,
    pub sha256: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    NotFound,
    InProgress,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadStatus {
    pub state: UploadState,
    pub received_count: u32,
    pub total_chunks: u32,
    pub file_name: Option<String>,
    pub declared_size: Option<u64>,
    pub progress_percent: f64,
    pub missing_chunks: Vec<u32>,
}

impl UploadStatus {
    pub fn not_found() -> Self {
        Self {
            state: UploadState::NotFound,
            received_count: 0,
            total_chunks: 0,
            file_name: None,
            declared_size: None,
            progress_percent: 0.0,
            missing_chunks: Vec::new(),
        }
    }
}

impl From<&UploadSession> for UploadStatus {
    fn from(session: &UploadSession) -> Self {
        Self {
            // A session mid-reassembly is still in progress to pollers.
            state: UploadState::InProgress,
            received_count: session.received_count(),
            total_chunks: session.total_chunks,
            file_name: Some(session.file_name.clone()),
            declared_size: Some(session.declared_size),
            progress_percent: session.progress_percent(),
            missing_chunks: session.missing_chunks(),
        }
    }
}
