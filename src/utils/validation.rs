use crate::services::error::TransferError;
use std::path::Path;

/// Longest accepted session / destination token
pub const MAX_TOKEN_LEN: usize = 128;

/// Longest accepted file name
pub const MAX_FILE_NAME_LEN: usize = 255;

/// Upper bound on `total_chunks`; chunk files are named with six digits
pub const MAX_TOTAL_CHUNKS: u32 = 999_999;

/// True if `token` is non-empty, bounded, and only `[A-Za-z0-9_-]`.
///
/// Session ids become directory names, so nothing else is allowed through.
pub fn is_valid_token(token: &str) -> bool {
    !token.is_empty()
        && token.len() <= MAX_TOKEN_LEN
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

pub fn validate_session_id(session_id: &str) -> Result<(), TransferError> {
    if is_valid_token(session_id) {
        Ok(())
    } else {
        Err(TransferError::InvalidSessionId)
    }
}

pub fn validate_destination_id(destination_id: &str) -> Result<(), TransferError> {
    if is_valid_token(destination_id) {
        Ok(())
    } else {
        Err(TransferError::InvalidDestination)
    }
}

pub fn validate_chunk_index(index: u32, total_chunks: u32) -> Result<(), TransferError> {
    if total_chunks == 0 || total_chunks > MAX_TOTAL_CHUNKS || index >= total_chunks {
        return Err(TransferError::ChunkIndexOutOfRange {
            index,
            total: total_chunks,
        });
    }
    Ok(())
}

pub fn validate_chunk_size(size: usize, max_size: usize) -> Result<(), TransferError> {
    if size == 0 {
        return Err(TransferError::EmptyChunk);
    }
    if size > max_size {
        return Err(TransferError::ChunkTooLarge { size, max: max_size });
    }
    Ok(())
}

/// Lowercased extension of `file_name`, if any
pub fn file_extension(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

pub fn validate_file_name(file_name: &str, allowed_extensions: &[String]) -> Result<(), TransferError> {
    if file_name.trim().is_empty() || file_name.len() > MAX_FILE_NAME_LEN {
        return Err(TransferError::InvalidFileName);
    }
    match file_extension(file_name) {
        Some(ext) if allowed_extensions.iter().any(|a| *a == ext) => Ok(()),
        _ => Err(TransferError::UnsupportedExtension {
            file_name: file_name.to_string(),
            allowed: allowed_extensions.join(", "),
        }),
    }
}

/// Reduces a client-supplied file name to a safe basename.
///
/// Path components are dropped, anything outside `[A-Za-z0-9._-]` becomes
/// `_`, runs of `_` collapse, and the result is capped at 255 bytes.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let mut out = String::with_capacity(base.len());
    for c in base.chars() {
        let c = if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
            c
        } else {
            '_'
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }

    let trimmed = out.trim_start_matches('.');
    let mut name = if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    };
    name.truncate(MAX_FILE_NAME_LEN);
    name
}
