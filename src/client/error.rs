use thiserror::Error;

/// Outcome of one failed request to the receiver.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Network failure, timeout or a status worth retrying
    #[error("{0}")]
    Transient(String),

    /// The receiver refused the request; repeating it cannot help
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Terminal failure of an upload.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload aborted by user")]
    Aborted,

    #[error("chunk {index} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        index: u32,
        attempts: u32,
        last_error: String,
    },

    #[error("chunk {index} rejected: {reason}")]
    Rejected { index: u32, reason: String },

    #[error("completion failed after {attempts} attempts: {last_error}")]
    CompletionFailed { attempts: u32, last_error: String },

    #[error("staged session does not match this file: {0}")]
    SessionMismatch(String),

    #[error("planning failed: {0}")]
    Planning(String),

    #[error("upload worker crashed: {0}")]
    Worker(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
