//! Sender side of the chunked transfer protocol.
//!
//! [`Uploader`] ties the pieces together: the [`planner`] splits a payload
//! (optionally gzip-compressed by the [`compression`] pool), the
//! [`orchestrator`] drains the chunk queue through a [`ChunkTransport`] and
//! the [`adaptive`] sizer feeds observed throughput back into later plans.

pub mod adaptive;
pub mod compression;
pub mod error;
pub mod orchestrator;
pub mod planner;
pub mod transport;
pub mod uploader;

pub use adaptive::{AdaptiveConfig, AdaptiveSizer};
pub use error::{TransportError, UploadError};
pub use orchestrator::{AbortHandle, ProgressCallback, ProgressEvent, UploadOrchestrator};
pub use planner::{ChunkPlanner, PlannedChunk, TransferPlan};
pub use transport::{ChunkTransport, HttpTransport};
pub use uploader::Uploader;

use std::time::Duration;

/// Sender-side tuning knobs
#[derive(Debug, Clone)]
pub struct UploaderConfig {
    /// Planned chunk size in bytes when adaptive sizing has no samples yet (default: 5 MB)
    pub chunk_size: usize,

    /// Simultaneous chunk transfers (default: 3)
    pub concurrency: usize,

    /// Tries per chunk before the whole upload fails (default: 3)
    pub max_attempts: u32,

    /// Timeout of a single chunk or completion request (default: 60s)
    pub attempt_timeout: Duration,

    /// Tries of the final "complete" request (default: 3)
    pub completion_attempts: u32,

    /// Pause between completion attempts, multiplied by the attempt number (default: 1s)
    pub retry_backoff: Duration,

    /// Gzip the payload before planning when it is not already compressed
    pub compress: bool,

    /// Gzip level, 0-9 (default: 6)
    pub compression_level: u32,

    /// Background compression workers (default: 2)
    pub compression_workers: usize,

    /// Payloads at or above this size are compressed off the caller's task (default: 500 KB)
    pub compression_threshold: usize,

    /// Throughput-driven chunk sizing; `None` keeps `chunk_size` fixed
    pub adaptive: Option<AdaptiveConfig>,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            chunk_size: 5 * 1024 * 1024, // 5 MB
            concurrency: 3,
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(60),
            completion_attempts: 3,
            retry_backoff: Duration::from_secs(1),
            compress: true,
            compression_level: 6,
            compression_workers: 2,
            compression_threshold: 500 * 1024, // 500 KB
            adaptive: Some(AdaptiveConfig::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = UploaderConfig::default();
        assert_eq!(config.chunk_size, 5 * 1024 * 1024);
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.compression_level, 6);
        assert!(config.adaptive.is_some());
    }
}
