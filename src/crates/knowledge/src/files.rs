//! On-disk storage for uploaded document files.

use std::path::{Path, PathBuf};
use tokio::fs;

use platform::Result;

/// Stores raw uploads under `{root}/{knowledge_base_id}/{stored name}`.
///
/// Paths handed back and accepted are relative to the root, which is what the
/// document rows persist; moving the root relocates every file without
/// touching the database.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist bytes, returning the path relative to the root
    pub async fn put(
        &self,
        knowledge_base_id: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<String> {
        let dir = self.root.join(knowledge_base_id);
        fs::create_dir_all(&dir).await?;
        fs::write(dir.join(filename), bytes).await?;
        Ok(format!("{knowledge_base_id}/{filename}"))
    }

    pub async fn read(&self, relative_path: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.root.join(relative_path)).await?)
    }

    /// Remove a stored file; already-gone files are not an error
    pub async fn delete(&self, relative_path: &str) -> Result<()> {
        match fs::remove_file(self.root.join(relative_path)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(&self, relative_path: &str) -> bool {
        fs::metadata(self.root.join(relative_path)).await.is_ok()
    }
}
