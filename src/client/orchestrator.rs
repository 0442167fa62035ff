use super::adaptive::AdaptiveSizer;
use super::error::{TransportError, UploadError};
use super::planner::TransferPlan;
use super::transport::ChunkTransport;
use super::UploaderConfig;
use crate::models::{CompleteUploadRequest, CompletedUpload, IncomingChunk, UploadState};
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinSet;

/// Progress notifications. Chunks complete in no particular order.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    ChunkCompleted {
        completed_count: u32,
        total_chunks: u32,
        just_completed_index: u32,
    },
    ChunkRetrying {
        index: u32,
        attempt: u32,
        error: String,
    },
    Completing,
}

pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Cooperative cancellation flag shared with every worker.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct ChunkTask {
    index: u32,
    payload: Bytes,
    attempts: u32,
}

/// Fields every chunk of one transfer repeats
struct TransferHeader {
    session_id: String,
    file_name: String,
    file_size: u64,
    total_chunks: u32,
}

struct Shared {
    header: TransferHeader,
    queue: Mutex<VecDeque<ChunkTask>>,
    completed: AtomicU32,
    failed: AtomicBool,
    failure: Mutex<Option<UploadError>>,
}

impl Shared {
    /// First fatal error wins; the queue is emptied so idle workers exit.
    async fn fail(&self, error: UploadError) {
        self.failed.store(true, Ordering::SeqCst);
        let mut failure = self.failure.lock().await;
        if failure.is_none() {
            *failure = Some(error);
        }
        drop(failure);
        self.queue.lock().await.clear();
    }
}

/// Pushes a plan's chunks through a fixed pool of workers.
///
/// All workers pop from one FIFO queue. A failed chunk goes back on the tail
/// until it has used `max_attempts` tries, after which every worker stops.
#[derive(Clone)]
pub struct UploadOrchestrator {
    transport: Arc<dyn ChunkTransport>,
    concurrency: usize,
    max_attempts: u32,
    attempt_timeout: Duration,
    completion_attempts: u32,
    retry_backoff: Duration,
    abort: AbortHandle,
    sizer: Option<Arc<AdaptiveSizer>>,
    progress: Option<ProgressCallback>,
}

impl UploadOrchestrator {
    pub fn new(transport: Arc<dyn ChunkTransport>, config: &UploaderConfig) -> Self {
        Self {
            transport,
            concurrency: config.concurrency.max(1),
            max_attempts: config.max_attempts.max(1),
            attempt_timeout: config.attempt_timeout,
            completion_attempts: config.completion_attempts.max(1),
            retry_backoff: config.retry_backoff,
            abort: AbortHandle::new(),
            sizer: None,
            progress: None,
        }
    }

    pub fn with_abort(mut self, abort: AbortHandle) -> Self {
        self.abort = abort;
        self
    }

    pub fn with_sizer(mut self, sizer: Arc<AdaptiveSizer>) -> Self {
        self.sizer = Some(sizer);
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Sends every chunk of `plan`, then completes the upload.
    pub async fn upload(
        &self,
        plan: &TransferPlan,
        destination_id: &str,
    ) -> Result<CompletedUpload, UploadError> {
        self.transfer(plan, &plan.upload_order).await?;
        self.complete(plan, destination_id).await
    }

    /// Like [`upload`](Self::upload), but only sends the chunks the receiver
    /// reports as missing for `plan.session_id`.
    pub async fn resume(
        &self,
        plan: &TransferPlan,
        destination_id: &str,
    ) -> Result<CompletedUpload, UploadError> {
        let status = match self.call(self.transport.status(&plan.session_id)).await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(session_id = %plan.session_id, "Status unavailable, sending everything: {}", e);
                return self.upload(plan, destination_id).await;
            }
        };

        if status.state == UploadState::NotFound {
            return self.upload(plan, destination_id).await;
        }
        if status.total_chunks != plan.total_chunks || status.declared_size != Some(plan.file_size) {
            return Err(UploadError::SessionMismatch(format!(
                "receiver has {} chunks / {:?} bytes, plan has {} chunks / {} bytes",
                status.total_chunks, status.declared_size, plan.total_chunks, plan.file_size
            )));
        }

        let missing: Vec<u32> = plan
            .upload_order
            .iter()
            .copied()
            .filter(|i| status.missing_chunks.contains(i))
            .collect();
        tracing::info!(
            session_id = %plan.session_id,
            received = status.received_count,
            missing = missing.len(),
            "♻️  Resuming upload"
        );

        self.transfer(plan, &missing).await?;
        self.complete(plan, destination_id).await
    }

    /// Uploads the chunks named by `order` and waits for every worker.
    pub async fn transfer(&self, plan: &TransferPlan, order: &[u32]) -> Result<u32, UploadError> {
        let queue: VecDeque<ChunkTask> = order
            .iter()
            .filter_map(|&i| plan.chunk(i))
            .map(|c| ChunkTask {
                index: c.index,
                payload: c.payload.clone(),
                attempts: 0,
            })
            .collect();
        let already_done = plan.total_chunks.saturating_sub(queue.len() as u32);

        let shared = Arc::new(Shared {
            header: TransferHeader {
                session_id: plan.session_id.clone(),
                file_name: plan.file_name.clone(),
                file_size: plan.file_size,
                total_chunks: plan.total_chunks,
            },
            queue: Mutex::new(queue),
            completed: AtomicU32::new(already_done),
            failed: AtomicBool::new(false),
            failure: Mutex::new(None),
        });

        let mut workers = JoinSet::new();
        for worker_id in 0..self.concurrency {
            let this = self.clone();
            let shared = shared.clone();
            workers.spawn(async move { this.worker_loop(worker_id, shared).await });
        }
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                shared.fail(UploadError::Worker(e.to_string())).await;
            }
        }

        if let Some(error) = shared.failure.lock().await.take() {
            return Err(error);
        }
        if self.abort.is_aborted() {
            return Err(UploadError::Aborted);
        }
        Ok(shared.completed.load(Ordering::SeqCst))
    }

    async fn worker_loop(&self, worker_id: usize, shared: Arc<Shared>) {
        loop {
            if self.abort.is_aborted() {
                shared.queue.lock().await.clear();
                break;
            }
            if shared.failed.load(Ordering::SeqCst) {
                break;
            }
            let Some(mut task) = shared.queue.lock().await.pop_front() else {
                break;
            };

            task.attempts += 1;
            let chunk = IncomingChunk {
                session_id: shared.header.session_id.clone(),
                index: task.index,
                total_chunks: shared.header.total_chunks,
                file_name: shared.header.file_name.clone(),
                file_size: shared.header.file_size,
                payload: task.payload.clone(),
            };

            let started = Instant::now();
            match self.call(self.transport.upload_chunk(chunk)).await {
                Ok(_ack) => {
                    if let Some(sizer) = &self.sizer {
                        sizer.record(task.payload.len(), started.elapsed());
                    }
                    let completed = shared.completed.fetch_add(1, Ordering::SeqCst) + 1;
                    self.emit(ProgressEvent::ChunkCompleted {
                        completed_count: completed,
                        total_chunks: shared.header.total_chunks,
                        just_completed_index: task.index,
                    });
                }
                Err(TransportError::Rejected(reason)) => {
                    tracing::error!(worker_id, index = task.index, "Chunk rejected: {}", reason);
                    shared
                        .fail(UploadError::Rejected {
                            index: task.index,
                            reason,
                        })
                        .await;
                    break;
                }
                Err(TransportError::Transient(error)) => {
                    if task.attempts >= self.max_attempts {
                        tracing::error!(
                            worker_id,
                            index = task.index,
                            attempts = task.attempts,
                            "Chunk failed permanently: {}",
                            error
                        );
                        shared
                            .fail(UploadError::RetriesExhausted {
                                index: task.index,
                                attempts: task.attempts,
                                last_error: error,
                            })
                            .await;
                        break;
                    }

                    tracing::warn!(
                        worker_id,
                        index = task.index,
                        attempt = task.attempts,
                        "Chunk failed, requeued: {}",
                        error
                    );
                    self.emit(ProgressEvent::ChunkRetrying {
                        index: task.index,
                        attempt: task.attempts,
                        error,
                    });
                    shared.queue.lock().await.push_back(task);
                }
            }
        }
    }

    /// Issues the completion request, retrying transient failures.
    pub async fn complete(
        &self,
        plan: &TransferPlan,
        destination_id: &str,
    ) -> Result<CompletedUpload, UploadError> {
        self.emit(ProgressEvent::Completing);
        let request = CompleteUploadRequest {
            session_id: plan.session_id.clone(),
            destination_id: destination_id.to_string(),
            sha256: Some(plan.sha256.clone()),
        };

        let mut last_error = String::new();
        for attempt in 1..=self.completion_attempts {
            if self.abort.is_aborted() {
                return Err(UploadError::Aborted);
            }
            match self.call(self.transport.complete(&request)).await {
                Ok(done) => {
                    tracing::info!(
                        session_id = %plan.session_id,
                        path = %done.destination_path,
                        size = done.file_size,
                        "✅ Upload completed"
                    );
                    return Ok(done);
                }
                Err(TransportError::Rejected(reason)) => {
                    return Err(UploadError::CompletionFailed {
                        attempts: attempt,
                        last_error: reason,
                    });
                }
                Err(TransportError::Transient(error)) => {
                    tracing::warn!(session_id = %plan.session_id, attempt, "Completion failed: {}", error);
                    last_error = error;
                    if attempt < self.completion_attempts {
                        tokio::time::sleep(self.retry_backoff * attempt).await;
                    }
                }
            }
        }

        Err(UploadError::CompletionFailed {
            attempts: self.completion_attempts,
            last_error,
        })
    }

    /// Runs one request under the per-attempt timeout.
    async fn call<T>(
        &self,
        request: impl std::future::Future<Output = Result<T, TransportError>>,
    ) -> Result<T, TransportError> {
        tokio::time::timeout(self.attempt_timeout, request)
            .await
            .unwrap_or_else(|_| {
                Err(TransportError::Transient(format!(
                    "timed out after {:?}",
                    self.attempt_timeout
                )))
            })
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(progress) = &self.progress {
            progress(event);
        }
    }
}
