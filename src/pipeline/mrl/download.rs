use std::io;
use std::path::{Path, PathBuf};

use crate::pipeline::workspace::remove_dir_if_empty;

/// A finished MRL zip waiting to be sent. Taking the bytes deletes the file
/// and its staging directory; dropping it untaken deletes them as well.
#[derive(Debug)]
pub struct ZipDownload {
    file_name: String,
    path: PathBuf,
    taken: bool,
}

impl ZipDownload {
    pub(crate) fn new(path: PathBuf, file_name: String) -> Self {
        Self {
            file_name,
            path,
            taken: false,
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn into_bytes(mut self) -> io::Result<Vec<u8>> {
        let bytes = tokio::fs::read(&self.path).await?;
        self.taken = true;

        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            tracing::warn!(path = %self.path.display(), error = %e, "Could not delete sent zip");
        }
        if let Some(dir) = self.path.parent() {
            remove_dir_if_empty(dir).await;
        }

        Ok(bytes)
    }
}

impl Drop for ZipDownload {
    fn drop(&mut self) {
        if self.taken {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "Could not delete unsent zip");
            }
        }
        if let Some(dir) = self.path.parent() {
            match std::fs::remove_dir(dir) {
                Ok(()) => {}
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::NotFound | io::ErrorKind::DirectoryNotEmpty
                    ) => {}
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), error = %e, "Could not remove zip directory");
                }
            }
        }
    }
}
