use crate::utils::atomic_write::{commit_temp, remove_dir_if_exists, remove_file_if_exists, write_temp};
use crate::utils::validation::is_valid_token;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub const METADATA_FILE: &str = "metadata.json";

/// Chunk file name for `index`. Fixed width, digits only.
pub fn chunk_file_name(index: u32) -> String {
    format!("chunk_{:06}", index)
}

/// On-disk layout of the receiver's staging directories.
///
/// ```text
/// <root>/<session_id>/metadata.json
/// <root>/<session_id>/chunk_000000
/// <root>/<session_id>/chunk_000001
/// ```
///
/// Callers validate `session_id` against the token charset before it gets here.
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_root(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        self.root.join(session_id)
    }

    pub fn metadata_path(&self, session_id: &str) -> PathBuf {
        self.session_dir(session_id).join(METADATA_FILE)
    }

    pub fn chunk_path(&self, session_id: &str, index: u32) -> PathBuf {
        self.session_dir(session_id).join(chunk_file_name(index))
    }

    pub async fn create_session_dir(&self, session_id: &str) -> io::Result<()> {
        tokio::fs::create_dir_all(self.session_dir(session_id)).await
    }

    /// Writes a chunk payload to a temp file without making it visible.
    /// Pair with [`StagingArea::commit_chunk`] or [`StagingArea::discard_staged`].
    pub async fn stage_chunk(&self, session_id: &str, index: u32, payload: &[u8]) -> io::Result<PathBuf> {
        write_temp(&self.chunk_path(session_id, index), payload).await
    }

    /// Re-sending an index replaces the previous file.
    pub async fn commit_chunk(&self, session_id: &str, index: u32, staged: &Path) -> io::Result<()> {
        commit_temp(staged, &self.chunk_path(session_id, index)).await
    }

    pub async fn discard_staged(&self, staged: &Path) -> io::Result<()> {
        remove_file_if_exists(staged).await
    }

    pub async fn session_exists(&self, session_id: &str) -> bool {
        tokio::fs::metadata(self.session_dir(session_id))
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Session ids that currently own a staging directory.
    /// Entries whose names are not valid tokens are ignored.
    pub async fn list_sessions(&self) -> io::Result<Vec<String>> {
        let mut sessions = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(sessions),
            Err(e) => return Err(e),
        };

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if is_valid_token(name) {
                    sessions.push(name.to_string());
                }
            }
        }
        sessions.sort();
        Ok(sessions)
    }

    /// Most recent modification time of anything inside the session directory,
    /// or of the directory itself when it is empty.
    pub async fn last_modified(&self, session_id: &str) -> io::Result<SystemTime> {
        let dir = self.session_dir(session_id);
        let mut newest: Option<SystemTime> = None;

        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let modified = match entry.metadata().await {
                Ok(meta) => meta.modified()?,
                // Raced with a concurrent rename or delete.
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };
            newest = Some(newest.map_or(modified, |n| n.max(modified)));
        }

        match newest {
            Some(t) => Ok(t),
            None => tokio::fs::metadata(&dir).await?.modified(),
        }
    }

    /// Deletes the session directory and everything in it. Safe to repeat.
    pub async fn remove_session(&self, session_id: &str) -> io::Result<()> {
        remove_dir_if_exists(&self.session_dir(session_id)).await
    }
}
