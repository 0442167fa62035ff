use super::UploaderConfig;
use super::adaptive::AdaptiveSizer;
use super::compression::CompressionPool;
use super::error::UploadError;
use super::orchestrator::{AbortHandle, ProgressCallback, UploadOrchestrator};
use super::planner::{ChunkPlanner, TransferPlan, new_session_id};
use super::transport::ChunkTransport;
use crate::models::CompletedUpload;
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;

/// Long-lived sender.
///
/// The adaptive sizer survives across transfers, so what one upload learns
/// about throughput shapes the chunk size of the next one.
pub struct Uploader {
    config: UploaderConfig,
    transport: Arc<dyn ChunkTransport>,
    compression: CompressionPool,
    sizer: Option<Arc<AdaptiveSizer>>,
    abort: AbortHandle,
}

impl Uploader {
    pub fn new(config: UploaderConfig, transport: Arc<dyn ChunkTransport>) -> Self {
        let compression = CompressionPool::new(
            config.compression_workers,
            config.compression_level,
            config.compression_threshold,
        );
        let sizer = config
            .adaptive
            .clone()
            .map(|adaptive| Arc::new(AdaptiveSizer::new(adaptive, config.chunk_size)));
        Self {
            config,
            transport,
            compression,
            sizer,
            abort: AbortHandle::new(),
        }
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn next_chunk_size(&self) -> usize {
        self.sizer
            .as_ref()
            .map(|s| s.next_chunk_size())
            .unwrap_or(self.config.chunk_size)
    }

    fn planner(&self, chunk_size: usize) -> ChunkPlanner {
        let planner = ChunkPlanner::new(chunk_size);
        if self.config.compress {
            planner.with_compression(self.compression.clone())
        } else {
            planner
        }
    }

    fn orchestrator(&self, progress: Option<ProgressCallback>) -> UploadOrchestrator {
        let mut orchestrator = UploadOrchestrator::new(self.transport.clone(), &self.config)
            .with_abort(self.abort.clone());
        if let Some(sizer) = &self.sizer {
            orchestrator = orchestrator.with_sizer(sizer.clone());
        }
        if let Some(progress) = progress {
            orchestrator = orchestrator.with_progress(progress);
        }
        orchestrator
    }

    /// Plans with the current adaptive size and uploads under a new session id.
    pub async fn upload_bytes(
        &self,
        file_name: &str,
        data: Bytes,
        destination_id: &str,
        progress: Option<ProgressCallback>,
    ) -> Result<CompletedUpload, UploadError> {
        let plan = self
            .planner(self.next_chunk_size())
            .plan(new_session_id(), file_name.to_string(), data)
            .await?;
        self.send(&plan, destination_id, progress).await
    }

    pub async fn upload_file(
        &self,
        path: &Path,
        destination_id: &str,
        progress: Option<ProgressCallback>,
    ) -> Result<CompletedUpload, UploadError> {
        let plan = self
            .planner(self.next_chunk_size())
            .plan_file(path, new_session_id())
            .await?;
        self.send(&plan, destination_id, progress).await
    }

    /// Continues a staged session.
    ///
    /// Uses the fixed configured chunk size: the layout has to match what the
    /// receiver already holds, so adaptive sizing does not apply here.
    pub async fn resume_file(
        &self,
        path: &Path,
        session_id: &str,
        destination_id: &str,
        progress: Option<ProgressCallback>,
    ) -> Result<CompletedUpload, UploadError> {
        let plan = self
            .planner(self.config.chunk_size)
            .plan_file(path, session_id.to_string())
            .await?;
        self.orchestrator(progress).resume(&plan, destination_id).await
    }

    async fn send(
        &self,
        plan: &TransferPlan,
        destination_id: &str,
        progress: Option<ProgressCallback>,
    ) -> Result<CompletedUpload, UploadError> {
        tracing::info!(
            session_id = %plan.session_id,
            file_name = %plan.file_name,
            size = plan.file_size,
            chunks = plan.total_chunks,
            chunk_size = plan.chunk_size,
            "🚀 Starting upload"
        );
        self.orchestrator(progress).upload(plan, destination_id).await
    }
}
