use crate::utils::validation::sanitize_filename;
use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Where finished artifacts go, and who hears about them.
#[async_trait]
pub trait FinalStorage: Send + Sync {
    /// Path the reassembled file for `destination_id` should be written to.
    fn destination_path(&self, destination_id: &str, file_name: &str) -> PathBuf;

    /// Called once the artifact at `final_path` is complete and verified.
    /// Ownership of the file passes to the storage collaborator here.
    async fn commit(&self, destination_id: &str, final_path: &Path) -> Result<()>;
}

/// Stores artifacts as `<root>/<destination_id>/<sanitised file name>`
#[derive(Debug, Clone)]
pub struct LocalFinalStorage {
    root: PathBuf,
}

impl LocalFinalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl FinalStorage for LocalFinalStorage {
    fn destination_path(&self, destination_id: &str, file_name: &str) -> PathBuf {
        self.root
            .join(destination_id)
            .join(sanitize_filename(file_name))
    }

    async fn commit(&self, destination_id: &str, final_path: &Path) -> Result<()> {
        tracing::info!(
            destination_id = %destination_id,
            path = %final_path.display(),
            "📦 Artifact stored"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_path_is_sanitised() {
        let storage = LocalFinalStorage::new("/srv/files");
        assert_eq!(
            storage.destination_path("city_42", "../../Rio de Janeiro.kmz"),
            PathBuf::from("/srv/files/city_42/Rio_de_Janeiro.kmz")
        );
    }
}
