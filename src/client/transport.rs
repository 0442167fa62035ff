use super::error::TransportError;
use crate::models::{ChunkAck, CompleteUploadRequest, CompletedUpload, IncomingChunk, UploadStatus};
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;

/// How the orchestrator talks to a receiver.
#[async_trait]
pub trait ChunkTransport: Send + Sync {
    async fn upload_chunk(&self, chunk: IncomingChunk) -> Result<ChunkAck, TransportError>;
    async fn complete(&self, request: &CompleteUploadRequest) -> Result<CompletedUpload, TransportError>;
    async fn status(&self, session_id: &str) -> Result<UploadStatus, TransportError>;
}

/// Talks to the receiver's HTTP API.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl ChunkTransport for HttpTransport {
    async fn upload_chunk(&self, chunk: IncomingChunk) -> Result<ChunkAck, TransportError> {
        let part = Part::bytes(chunk.payload.to_vec())
            .file_name("blob")
            .mime_str("application/octet-stream")
            .map_err(|e| TransportError::Rejected(e.to_string()))?;
        let form = Form::new()
            .text("session_id", chunk.session_id)
            .text("chunk_index", chunk.index.to_string())
            .text("total_chunks", chunk.total_chunks.to_string())
            .text("file_name", chunk.file_name)
            .text("file_size", chunk.file_size.to_string())
            .part("chunk", part);

        let request = self.authorize(self.client.post(self.url("/upload/chunk")).multipart(form));
        decode(request.send().await).await
    }

    async fn complete(&self, body: &CompleteUploadRequest) -> Result<CompletedUpload, TransportError> {
        let request = self.authorize(self.client.post(self.url("/upload/complete")).json(body));
        decode(request.send().await).await
    }

    async fn status(&self, session_id: &str) -> Result<UploadStatus, TransportError> {
        let request = self.authorize(
            self.client
                .get(self.url(&format!("/upload/status/{}", session_id))),
        );
        decode(request.send().await).await
    }
}

async fn decode<T: DeserializeOwned>(
    response: Result<reqwest::Response, reqwest::Error>,
) -> Result<T, TransportError> {
    let response = response.map_err(|e| TransportError::Transient(e.to_string()))?;
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| TransportError::Transient(format!("bad response body: {}", e)));
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or(body);
    Err(classify(status, format!("{}: {}", status, message)))
}

/// Client errors are final except the ones that mean "try again later".
fn classify(status: StatusCode, message: String) -> TransportError {
    let retryable = matches!(
        status,
        StatusCode::REQUEST_TIMEOUT | StatusCode::CONFLICT | StatusCode::TOO_MANY_REQUESTS
    );
    if status.is_client_error() && !retryable {
        TransportError::Rejected(message)
    } else {
        TransportError::Transient(message)
    }
}
