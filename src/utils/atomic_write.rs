//! Write-to-temp-then-rename for staging files.
//!
//! A reader of `path` sees either the previous content or the new content,
//! never a torn write. The temp file lives next to the target so the rename
//! stays on one filesystem, and carries a random suffix so two writers of the
//! same path never share one.

use std::path::{Path, PathBuf};
use tracing::error;

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{}.part", uuid::Uuid::new_v4().simple()));
    path.with_file_name(name)
}

/// Atomically replaces `path` with `content`.
pub async fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let tmp_path = write_temp(path, content).await?;
    commit_temp(&tmp_path, path).await
}

/// First half of [`atomic_write`]: writes `content` to a fresh temp file
/// beside `path` and returns its location.
pub async fn write_temp(path: &Path, content: &[u8]) -> std::io::Result<PathBuf> {
    let tmp_path = temp_path(path);

    tokio::fs::write(&tmp_path, content).await.map_err(|e| {
        error!(
            event = "atomic_write_failure",
            path = %tmp_path.display(),
            error = %e,
            "Failed to write temp file"
        );
        e
    })?;

    Ok(tmp_path)
}

/// Second half of [`atomic_write`]: renames the temp file over `path`.
/// The temp file is removed if the rename fails.
pub async fn commit_temp(tmp_path: &Path, path: &Path) -> std::io::Result<()> {
    if let Err(e) = tokio::fs::rename(tmp_path, path).await {
        error!(
            event = "atomic_rename_failure",
            from = %tmp_path.display(),
            to = %path.display(),
            error = %e,
            "Failed to rename temp file"
        );
        let _ = tokio::fs::remove_file(tmp_path).await;
        return Err(e);
    }

    Ok(())
}

/// Removes `path`, treating "already gone" as success.
pub async fn remove_file_if_exists(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Removes a directory tree, treating "already gone" as success.
pub async fn remove_dir_if_exists(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_atomic_write_overwrites_without_leftovers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chunk_000001");

        atomic_write(&path, b"first").await.unwrap();
        atomic_write(&path, b"second").await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_temp_is_invisible_until_committed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chunk_000002");
        atomic_write(&path, b"old").await.unwrap();

        let tmp = write_temp(&path, b"new").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"old");

        commit_temp(&tmp, &path).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"new");
        assert!(!tmp.exists());
    }

    #[tokio::test]
    async fn test_removal_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("session");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("a"), b"x").unwrap();

        remove_file_if_exists(&sub.join("a")).await.unwrap();
        remove_file_if_exists(&sub.join("a")).await.unwrap();
        remove_dir_if_exists(&sub).await.unwrap();
        remove_dir_if_exists(&sub).await.unwrap();
        assert!(!sub.exists());
    }
}
