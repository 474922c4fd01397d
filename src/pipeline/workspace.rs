use std::io;
use std::path::{Path, PathBuf};

const WORKSPACE_ID_LEN: usize = 10;

/// Per-run scratch directories: one for PDFs, one for the final zip.
/// The random id keeps concurrent runs apart.
///
/// `teardown` is the normal exit. A workspace dropped without it (the run
/// future was cancelled) removes both directories with everything in them.
#[derive(Debug)]
pub struct TempWorkspace {
    id: String,
    pdf_dir: PathBuf,
    zip_dir: PathBuf,
    torn_down: bool,
}

impl TempWorkspace {
    #[tracing::instrument(name = "workspace.create", skip(root), fields(workspace.id))]
    pub async fn create(root: &Path) -> io::Result<Self> {
        let id: String = std::iter::repeat_with(fastrand::alphanumeric)
            .take(WORKSPACE_ID_LEN)
            .collect();
        tracing::Span::current().record("workspace.id", id.as_str());

        let pdf_dir = root.join("mrl_pdfs").join(&id);
        let zip_dir = root.join("mrl_zips").join(&id);
        tokio::fs::create_dir_all(&pdf_dir).await?;
        tokio::fs::create_dir_all(&zip_dir).await?;

        Ok(Self {
            id,
            pdf_dir,
            zip_dir,
            torn_down: false,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn pdf_dir(&self) -> &Path {
        &self.pdf_dir
    }

    pub fn zip_dir(&self) -> &Path {
        &self.zip_dir
    }

    /// Removes what the run left behind. Never fails; problems are logged.
    /// A zip that was handed to the caller is not passed here and keeps its
    /// directory alive until the download is taken.
    #[tracing::instrument(name = "workspace.teardown", skip_all, fields(workspace.id = %self.id))]
    pub async fn teardown(mut self, pdfs: &[PathBuf], undelivered_zip: Option<&Path>) {
        for pdf in pdfs {
            match tokio::fs::remove_file(pdf).await {
                Ok(()) => tracing::debug!(path = %pdf.display(), "Temporary PDF deleted"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %pdf.display(), error = %e, "Could not delete temporary PDF")
                }
            }
        }
        remove_dir_if_empty(&self.pdf_dir).await;

        if let Some(zip) = undelivered_zip {
            tracing::info!(path = %zip.display(), "Zip was not delivered, deleting it");
            if let Err(e) = tokio::fs::remove_file(zip).await {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(path = %zip.display(), error = %e, "Could not delete undelivered zip");
                }
            }
        }
        remove_dir_if_empty(&self.zip_dir).await;
        self.torn_down = true;
    }
}

impl Drop for TempWorkspace {
    fn drop(&mut self) {
        if self.torn_down {
            return;
        }
        tracing::warn!(workspace.id = %self.id, "MRL run abandoned, purging its workspace");
        for dir in [&self.pdf_dir, &self.zip_dir] {
            if let Err(e) = std::fs::remove_dir_all(dir) {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(dir = %dir.display(), error = %e, "Could not purge temporary directory");
                }
            }
        }
    }
}

pub(crate) async fn remove_dir_if_empty(dir: &Path) {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "Could not inspect temporary directory");
            return;
        }
    };

    match entries.next_entry().await {
        Ok(None) => {
            if let Err(e) = tokio::fs::remove_dir(dir).await {
                tracing::warn!(dir = %dir.display(), error = %e, "Could not remove temporary directory");
            }
        }
        Ok(Some(_)) => {
            tracing::warn!(dir = %dir.display(), "Temporary directory not removed, it is not empty");
        }
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "Could not inspect temporary directory");
        }
    }
}
