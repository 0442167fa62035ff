use crate::AppState;
use crate::api::error::AppError;
use crate::models::{ChunkAck, CompleteUploadRequest, CompletedUpload, IncomingChunk, UploadStatus};
use crate::services::error::TransferError;
use axum::{
    Json,
    extract::{Multipart, Path, State, multipart::MultipartError},
    http::StatusCode,
};
use bytes::BytesMut;
use validator::Validate;

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(e.body_text())
    } else {
        AppError::BadRequest(e.body_text())
    }
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, AppError> {
    value.ok_or_else(|| AppError::BadRequest(format!("Missing field '{}'", field)))
}

fn parse_number<T: std::str::FromStr>(raw: &str, field: &str) -> Result<T, AppError> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::BadRequest(format!("Invalid value for '{}'", field)))
}

#[utoipa::path(
    post,
    path = "/upload/chunk",
    request_body(content = crate::models::ChunkUploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Chunk stored", body = ChunkAck),
        (status = 400, description = "Malformed or rejected chunk"),
        (status = 409, description = "Session is being reassembled"),
        (status = 500, description = "Storage failure")
    ),
    tag = "upload"
)]
pub async fn upload_chunk_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ChunkAck>, AppError> {
    let max_chunk_size = state.uploads.config().max_chunk_size;

    let mut session_id = None;
    let mut chunk_index = None;
    let mut total_chunks = None;
    let mut file_name = None;
    let mut file_size = None;
    let mut payload = None;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "chunk" => {
                // Stop reading as soon as the ceiling is crossed.
                let mut buf = BytesMut::new();
                while let Some(part) = field.chunk().await.map_err(multipart_error)? {
                    if buf.len() + part.len() > max_chunk_size {
                        return Err(TransferError::ChunkTooLarge {
                            size: buf.len() + part.len(),
                            max: max_chunk_size,
                        }
                        .into());
                    }
                    buf.extend_from_slice(&part);
                }
                payload = Some(buf.freeze());
            }
            "session_id" => session_id = Some(field.text().await.map_err(multipart_error)?),
            "file_name" => file_name = Some(field.text().await.map_err(multipart_error)?),
            "chunk_index" => {
                let raw = field.text().await.map_err(multipart_error)?;
                chunk_index = Some(parse_number::<u32>(&raw, "chunk_index")?);
            }
            "total_chunks" => {
                let raw = field.text().await.map_err(multipart_error)?;
                total_chunks = Some(parse_number::<u32>(&raw, "total_chunks")?);
            }
            "file_size" => {
                let raw = field.text().await.map_err(multipart_error)?;
                file_size = Some(parse_number::<u64>(&raw, "file_size")?);
            }
            other => {
                tracing::debug!("Ignoring unknown multipart field '{}'", other);
            }
        }
    }

    let chunk = IncomingChunk {
        session_id: required(session_id, "session_id")?,
        index: required(chunk_index, "chunk_index")?,
        total_chunks: required(total_chunks, "total_chunks")?,
        file_name: required(file_name, "file_name")?,
        file_size: required(file_size, "file_size")?,
        payload: required(payload, "chunk")?,
    };

    let ack = state.uploads.receive_chunk(chunk).await?;
    Ok(Json(ack))
}

#[utoipa::path(
    post,
    path = "/upload/complete",
    request_body = CompleteUploadRequest,
    responses(
        (status = 200, description = "File reassembled", body = CompletedUpload),
        (status = 400, description = "Incomplete upload or integrity mismatch"),
        (status = 404, description = "Unknown session"),
        (status = 409, description = "Session is already being reassembled")
    ),
    tag = "upload"
)]
pub async fn complete_upload_handler(
    State(state): State<AppState>,
    Json(req): Json<CompleteUploadRequest>,
) -> Result<Json<CompletedUpload>, AppError> {
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let completed = state
        .uploads
        .complete_upload(&req.session_id, &req.destination_id, req.sha256.as_deref())
        .await?;
    Ok(Json(completed))
}

#[utoipa::path(
    get,
    path = "/upload/status/{session_id}",
    params(
        ("session_id" = String, Path, description = "Upload session id")
    ),
    responses(
        (status = 200, description = "Session progress", body = UploadStatus),
        (status = 400, description = "Malformed session id")
    ),
    tag = "upload"
)]
pub async fn upload_status_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<UploadStatus>, AppError> {
    Ok(Json(state.uploads.upload_status(&session_id).await?))
}

#[utoipa::path(
    delete,
    path = "/upload/{session_id}",
    params(
        ("session_id" = String, Path, description = "Upload session id")
    ),
    responses(
        (status = 204, description = "Staged chunks discarded"),
        (status = 404, description = "Unknown session"),
        (status = 409, description = "Session is being reassembled")
    ),
    tag = "upload"
)]
pub async fn abort_upload_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.uploads.abort_upload(&session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
