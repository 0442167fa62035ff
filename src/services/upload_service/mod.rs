mod gc;
mod reassembler;
mod receiver;
mod status;

pub use gc::SweepReport;

use crate::config::UploadConfig;
use crate::services::session_store::{FsSessionStore, SessionRepository};
use crate::services::staging::StagingArea;
use crate::services::storage::{FinalStorage, LocalFinalStorage};
use crate::utils::keyed_mutex::KeyedMutex;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Receiver side of the chunked transfer protocol.
///
/// Cheap to clone; every clone shares the same locks and repository.
#[derive(Clone)]
pub struct UploadService {
    repo: Arc<dyn SessionRepository>,
    staging: StagingArea,
    storage: Arc<dyn FinalStorage>,
    locks: KeyedMutex,
    config: Arc<UploadConfig>,
    sweeping: Arc<AtomicBool>,
}

impl UploadService {
    /// Filesystem-backed service using the directories named in `config`.
    pub fn new(config: UploadConfig) -> Self {
        let staging = StagingArea::new(&config.staging_dir);
        let repo = Arc::new(FsSessionStore::new(staging.clone()));
        let storage = Arc::new(LocalFinalStorage::new(&config.final_dir));
        Self::with_parts(config, repo, storage)
    }

    pub fn with_parts(
        config: UploadConfig,
        repo: Arc<dyn SessionRepository>,
        storage: Arc<dyn FinalStorage>,
    ) -> Self {
        Self {
            repo,
            staging: StagingArea::new(&config.staging_dir),
            storage,
            locks: KeyedMutex::new(),
            config: Arc::new(config),
            sweeping: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }
}
