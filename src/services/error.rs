use thiserror::Error;

/// Errors raised by the receiving side of a chunked transfer
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Invalid session id")]
    InvalidSessionId,

    #[error("Invalid destination id")]
    InvalidDestination,

    #[error("Invalid file name")]
    InvalidFileName,

    #[error("Unsupported file type '{file_name}'. Allowed: {allowed}")]
    UnsupportedExtension { file_name: String, allowed: String },

    #[error("Chunk index {index} out of range for {total} chunks")]
    ChunkIndexOutOfRange { index: u32, total: u32 },

    #[error("Chunk of {size} bytes exceeds the {max} byte limit")]
    ChunkTooLarge { size: usize, max: usize },

    #[error("Empty chunk")]
    EmptyChunk,

    #[error("Declared file size must be positive")]
    InvalidFileSize,

    #[error("Chunk parameters do not match session {session_id}: {detail}")]
    SessionMismatch { session_id: String, detail: String },

    #[error("Upload session {0} not found")]
    SessionNotFound(String),

    #[error("Upload session {0} is being reassembled")]
    SessionBusy(String),

    #[error("Incomplete upload. Chunks: {received}/{total}")]
    Incomplete { received: u32, total: u32 },

    #[error("Chunk {index} missing from staging area")]
    MissingChunk { index: u32 },

    #[error("File size mismatch. Expected: {expected}, got: {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("Content digest mismatch. Expected: {expected}, got: {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("Final storage rejected the artifact: {0}")]
    Commit(String),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Corrupt session metadata: {0}")]
    Metadata(#[from] serde_json::Error),
}

impl TransferError {
    /// Stable machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::InvalidSessionId => "INVALID_SESSION_ID",
            TransferError::InvalidDestination => "INVALID_DESTINATION",
            TransferError::InvalidFileName => "INVALID_FILE_NAME",
            TransferError::UnsupportedExtension { .. } => "UNSUPPORTED_EXTENSION",
            TransferError::ChunkIndexOutOfRange { .. } => "CHUNK_INDEX_OUT_OF_RANGE",
            TransferError::ChunkTooLarge { .. } => "CHUNK_TOO_LARGE",
            TransferError::EmptyChunk => "EMPTY_CHUNK",
            TransferError::InvalidFileSize => "INVALID_FILE_SIZE",
            TransferError::SessionMismatch { .. } => "SESSION_MISMATCH",
            TransferError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            TransferError::SessionBusy(_) => "SESSION_BUSY",
            TransferError::Incomplete { .. } => "INCOMPLETE_UPLOAD",
            TransferError::MissingChunk { .. } => "MISSING_CHUNK",
            TransferError::SizeMismatch { .. } => "SIZE_MISMATCH",
            TransferError::DigestMismatch { .. } => "DIGEST_MISMATCH",
            TransferError::Commit(_) => "COMMIT_FAILED",
            TransferError::Storage(_) => "STORAGE_ERROR",
            TransferError::Metadata(_) => "METADATA_ERROR",
        }
    }

    /// Rejections caused by the request itself; resending it unchanged cannot succeed.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            TransferError::InvalidSessionId
                | TransferError::InvalidDestination
                | TransferError::InvalidFileName
                | TransferError::UnsupportedExtension { .. }
                | TransferError::ChunkIndexOutOfRange { .. }
                | TransferError::ChunkTooLarge { .. }
                | TransferError::EmptyChunk
                | TransferError::InvalidFileSize
                | TransferError::SessionMismatch { .. }
        )
    }
}

pub type TransferResult<T> = Result<T, TransferError>;
