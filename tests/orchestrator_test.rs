use async_trait::async_trait;
use bytes::Bytes;
use rust_chunked_upload::client::compression::gunzip;
use rust_chunked_upload::client::{
    AbortHandle, ChunkPlanner, ChunkTransport, ProgressEvent, TransferPlan, TransportError,
    UploadError, UploadOrchestrator, Uploader, UploaderConfig,
};
use rust_chunked_upload::config::UploadConfig;
use rust_chunked_upload::models::{
    ChunkAck, CompleteUploadRequest, CompletedUpload, IncomingChunk, UploadStatus,
};
use rust_chunked_upload::services::error::TransferError;
use rust_chunked_upload::services::upload_service::UploadService;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

fn config() -> UploaderConfig {
    UploaderConfig {
        retry_backoff: Duration::ZERO,
        attempt_timeout: Duration::from_secs(5),
        compress: false,
        adaptive: None,
        ..UploaderConfig::default()
    }
}

async fn plan(len: usize, chunk_size: usize) -> TransferPlan {
    let data: Vec<u8> = (0..len).map(|i| (i % 241) as u8).collect();
    ChunkPlanner::new(chunk_size)
        .plan("sess_1".to_string(), "a.kml".to_string(), Bytes::from(data))
        .await
        .unwrap()
}

fn done(request: &CompleteUploadRequest) -> CompletedUpload {
    CompletedUpload {
        file_name: "a.kml".to_string(),
        file_size: 0,
        destination_path: format!("/tmp/{}/a.kml", request.destination_id),
        chunk_count: 0,
        elapsed_ms: 0,
        throughput_bytes_per_sec: 0.0,
        sha256: request.sha256.clone().unwrap_or_default(),
    }
}

/// Fails chosen chunks a fixed number of times, then accepts them.
#[derive(Default)]
struct ScriptedTransport {
    /// index -> failures before success; `u32::MAX` never succeeds
    chunk_failures: HashMap<u32, u32>,
    reject: Option<u32>,
    completion_failures: u32,
    slow_first_attempt: Option<Duration>,
    abort_after_first: Option<AbortHandle>,
    attempts: Mutex<HashMap<u32, u32>>,
    completions: Mutex<u32>,
}

impl ScriptedTransport {
    fn attempts_for(&self, index: u32) -> u32 {
        self.attempts.lock().unwrap().get(&index).copied().unwrap_or(0)
    }

    fn total_attempts(&self) -> u32 {
        self.attempts.lock().unwrap().values().sum()
    }

    fn completions(&self) -> u32 {
        *self.completions.lock().unwrap()
    }
}

#[async_trait]
impl ChunkTransport for ScriptedTransport {
    async fn upload_chunk(&self, chunk: IncomingChunk) -> Result<ChunkAck, TransportError> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let n = attempts.entry(chunk.index).or_insert(0);
            *n += 1;
            *n
        };

        if let Some(abort) = &self.abort_after_first {
            abort.abort();
        }
        if let (Some(delay), 1) = (self.slow_first_attempt, attempt) {
            tokio::time::sleep(delay).await;
        }
        if self.reject == Some(chunk.index) {
            return Err(TransportError::Rejected("400: Unsupported file type".to_string()));
        }
        if let Some(&failures) = self.chunk_failures.get(&chunk.index) {
            if attempt <= failures {
                return Err(TransportError::Transient("503: unavailable".to_string()));
            }
        }

        Ok(ChunkAck {
            accepted: true,
            chunk_index: chunk.index,
            received_count: 0,
            total_chunks: chunk.total_chunks,
            progress_percent: 0.0,
        })
    }

    async fn complete(&self, request: &CompleteUploadRequest) -> Result<CompletedUpload, TransportError> {
        let call = {
            let mut completions = self.completions.lock().unwrap();
            *completions += 1;
            *completions
        };
        if call <= self.completion_failures {
            return Err(TransportError::Transient("502: bad gateway".to_string()));
        }
        Ok(done(request))
    }

    async fn status(&self, _session_id: &str) -> Result<UploadStatus, TransportError> {
        Ok(UploadStatus::not_found())
    }
}

/// Calls the receiver service in-process.
struct Loopback {
    uploads: UploadService,
    sent: Mutex<Vec<u32>>,
}

impl Loopback {
    fn new(dir: &TempDir) -> Self {
        Self {
            uploads: UploadService::new(UploadConfig::development(dir.path())),
            sent: Mutex::new(Vec::new()),
        }
    }
}

fn to_transport(e: TransferError) -> TransportError {
    if e.is_validation() {
        TransportError::Rejected(e.to_string())
    } else {
        TransportError::Transient(e.to_string())
    }
}

#[async_trait]
impl ChunkTransport for Loopback {
    async fn upload_chunk(&self, chunk: IncomingChunk) -> Result<ChunkAck, TransportError> {
        self.sent.lock().unwrap().push(chunk.index);
        self.uploads.receive_chunk(chunk).await.map_err(to_transport)
    }

    async fn complete(&self, request: &CompleteUploadRequest) -> Result<CompletedUpload, TransportError> {
        self.uploads
            .complete_upload(&request.session_id, &request.destination_id, request.sha256.as_deref())
            .await
            .map_err(to_transport)
    }

    async fn status(&self, session_id: &str) -> Result<UploadStatus, TransportError> {
        self.uploads.upload_status(session_id).await.map_err(to_transport)
    }
}

#[tokio::test]
async fn test_chunk_succeeds_on_last_allowed_attempt() {
    let plan = plan(10 * 1024, 1024).await;
    let transport = Arc::new(ScriptedTransport {
        chunk_failures: HashMap::from([(4, 2)]),
        ..Default::default()
    });

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let result = UploadOrchestrator::new(transport.clone(), &config())
        .with_progress(Arc::new(move |e| sink.lock().unwrap().push(e)))
        .upload(&plan, "dest")
        .await;

    assert!(result.is_ok(), "{:?}", result.err());
    assert_eq!(transport.attempts_for(4), 3);
    assert_eq!(transport.completions(), 1);

    let events = events.lock().unwrap();
    let completed: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::ChunkCompleted { just_completed_index, .. } => Some(*just_completed_index),
            _ => None,
        })
        .collect();
    assert_eq!(completed.len(), 10);
    let retries = events
        .iter()
        .filter(|e| matches!(e, ProgressEvent::ChunkRetrying { index: 4, .. }))
        .count();
    assert_eq!(retries, 2);
    let highest = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::ChunkCompleted { completed_count, total_chunks, .. } => {
                assert_eq!(*total_chunks, 10);
                Some(*completed_count)
            }
            _ => None,
        })
        .max();
    assert_eq!(highest, Some(10));
    assert_eq!(events.last(), Some(&ProgressEvent::Completing));
}

#[tokio::test]
async fn test_always_failing_chunk_uses_exactly_max_attempts() {
    let plan = plan(6 * 1024, 1024).await;
    let transport = Arc::new(ScriptedTransport {
        chunk_failures: HashMap::from([(1, u32::MAX)]),
        ..Default::default()
    });

    let err = UploadOrchestrator::new(transport.clone(), &config())
        .upload(&plan, "dest")
        .await
        .unwrap_err();

    match err {
        UploadError::RetriesExhausted { index, attempts, .. } => {
            assert_eq!(index, 1);
            assert_eq!(attempts, 3);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(transport.attempts_for(1), 3);
    assert_eq!(transport.completions(), 0);
}

#[tokio::test]
async fn test_rejected_chunk_is_not_retried() {
    let plan = plan(4 * 1024, 1024).await;
    let transport = Arc::new(ScriptedTransport {
        reject: Some(2),
        ..Default::default()
    });

    let err = UploadOrchestrator::new(transport.clone(), &config())
        .upload(&plan, "dest")
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::Rejected { index: 2, .. }));
    assert_eq!(transport.attempts_for(2), 1);
}

#[tokio::test]
async fn test_abort_stops_workers() {
    let plan = plan(50 * 1024, 1024).await;
    let abort = AbortHandle::new();
    let transport = Arc::new(ScriptedTransport {
        abort_after_first: Some(abort.clone()),
        ..Default::default()
    });

    let mut cfg = config();
    cfg.concurrency = 2;
    let err = UploadOrchestrator::new(transport.clone(), &cfg)
        .with_abort(abort)
        .upload(&plan, "dest")
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::Aborted));
    // In-flight requests finish; nothing new starts.
    assert!(transport.total_attempts() <= 2);
    assert_eq!(transport.completions(), 0);
}

#[tokio::test]
async fn test_timeout_counts_as_failed_attempt() {
    let plan = plan(2 * 1024, 1024).await;
    let transport = Arc::new(ScriptedTransport {
        slow_first_attempt: Some(Duration::from_millis(500)),
        ..Default::default()
    });

    let mut cfg = config();
    cfg.attempt_timeout = Duration::from_millis(50);
    UploadOrchestrator::new(transport.clone(), &cfg)
        .upload(&plan, "dest")
        .await
        .unwrap();

    assert_eq!(transport.attempts_for(0), 2);
    assert_eq!(transport.attempts_for(1), 2);
}

#[tokio::test]
async fn test_completion_is_retried() {
    let plan = plan(2 * 1024, 1024).await;
    let transport = Arc::new(ScriptedTransport {
        completion_failures: 2,
        ..Default::default()
    });
    let result = UploadOrchestrator::new(transport.clone(), &config())
        .upload(&plan, "dest")
        .await
        .unwrap();
    assert_eq!(result.sha256, plan.sha256);
    assert_eq!(transport.completions(), 3);

    let transport = Arc::new(ScriptedTransport {
        completion_failures: u32::MAX,
        ..Default::default()
    });
    let err = UploadOrchestrator::new(transport.clone(), &config())
        .upload(&plan, "dest")
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::CompletionFailed { attempts: 3, .. }));
    assert_eq!(transport.completions(), 3);
}

#[tokio::test]
async fn test_round_trip_through_receiver() {
    let dir = TempDir::new().unwrap();
    let transport = Arc::new(Loopback::new(&dir));
    let plan = plan(12 * 1024 * 1024, 5 * 1024 * 1024).await;
    assert_eq!(plan.total_chunks, 3);

    let done = UploadOrchestrator::new(transport.clone(), &config())
        .upload(&plan, "city_1")
        .await
        .unwrap();

    let expected: Vec<u8> = plan.chunks.iter().flat_map(|c| c.payload.to_vec()).collect();
    assert_eq!(std::fs::read(&done.destination_path).unwrap(), expected);
    assert_eq!(done.sha256, plan.sha256);

    let mut sent = transport.sent.lock().unwrap().clone();
    sent.sort_unstable();
    assert_eq!(sent, vec![0, 1, 2]);
}

#[tokio::test]
async fn test_resume_sends_only_missing_chunks() {
    let dir = TempDir::new().unwrap();
    let transport = Arc::new(Loopback::new(&dir));
    let plan = plan(5000, 1024).await;

    for index in [0u32, 2, 4] {
        let chunk = &plan.chunks[index as usize];
        transport
            .uploads
            .receive_chunk(IncomingChunk {
                session_id: plan.session_id.clone(),
                index,
                total_chunks: plan.total_chunks,
                file_name: plan.file_name.clone(),
                file_size: plan.file_size,
                payload: chunk.payload.clone(),
            })
            .await
            .unwrap();
    }

    let done = UploadOrchestrator::new(transport.clone(), &config())
        .resume(&plan, "dest")
        .await
        .unwrap();

    let mut sent = transport.sent.lock().unwrap().clone();
    sent.sort_unstable();
    assert_eq!(sent, vec![1, 3]);

    let expected: Vec<u8> = plan.chunks.iter().flat_map(|c| c.payload.to_vec()).collect();
    assert_eq!(std::fs::read(&done.destination_path).unwrap(), expected);
}

#[tokio::test]
async fn test_resume_refuses_different_layout() {
    let dir = TempDir::new().unwrap();
    let transport = Arc::new(Loopback::new(&dir));
    let staged = plan(5000, 1024).await;
    let chunk = &staged.chunks[0];
    transport
        .uploads
        .receive_chunk(IncomingChunk {
            session_id: staged.session_id.clone(),
            index: 0,
            total_chunks: staged.total_chunks,
            file_name: staged.file_name.clone(),
            file_size: staged.file_size,
            payload: chunk.payload.clone(),
        })
        .await
        .unwrap();

    let replanned = plan(5000, 2048).await;
    let err = UploadOrchestrator::new(transport.clone(), &config())
        .resume(&replanned, "dest")
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::SessionMismatch(_)));
    assert!(transport.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_uploader_compresses_and_adapts() {
    let dir = TempDir::new().unwrap();
    let transport = Arc::new(Loopback::new(&dir));

    let mut kml = String::from("<kml><Document>\n");
    for i in 0..20_000u64 {
        kml.push_str(&format!(
            "<coordinates>{},{},0</coordinates>\n",
            (i * 7919) % 100_000,
            (i * 104_729) % 100_000
        ));
    }
    kml.push_str("</Document></kml>\n");

    let uploader = Uploader::new(
        UploaderConfig {
            chunk_size: 4096,
            retry_backoff: Duration::ZERO,
            ..UploaderConfig::default()
        },
        transport.clone(),
    );
    assert_eq!(uploader.next_chunk_size(), 4096);

    let done = uploader
        .upload_bytes("city.kml", Bytes::from(kml.clone()), "dest", None)
        .await
        .unwrap();

    assert!(done.destination_path.ends_with("city.kmz"));
    let stored = std::fs::read(&done.destination_path).unwrap();
    assert!(stored.len() < kml.len());
    assert_eq!(gunzip(&stored).unwrap(), kml.as_bytes());

    // The next transfer is planned from observed throughput.
    assert!(transport.sent.lock().unwrap().len() >= 3);
    let next = uploader.next_chunk_size();
    assert!((1024 * 1024..=10 * 1024 * 1024).contains(&next));
}
