use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::error::AppError;

use super::bundle::ExtractedDocument;

/// Builds zip archives from named documents, staging them in a temp file.
#[derive(Debug, Clone)]
pub struct ArchivePacker {
    staging_dir: PathBuf,
}

impl ArchivePacker {
    pub fn new(staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
        }
    }

    /// Packs the documents and returns the archive bytes. The backing temp
    /// file is removed before returning, on success and on failure.
    #[tracing::instrument(name = "archive.pack", skip_all, fields(document_count = documents.len()))]
    pub fn pack(&self, documents: &[ExtractedDocument]) -> Result<Vec<u8>, AppError> {
        std::fs::create_dir_all(&self.staging_dir).map_err(|e| {
            AppError::Packaging(format!(
                "could not create staging dir {}: {e}",
                self.staging_dir.display()
            ))
        })?;

        let temp = tempfile::Builder::new()
            .prefix("bundle_")
            .suffix(".zip")
            .tempfile_in(&self.staging_dir)
            .map_err(|e| AppError::Packaging(format!("could not create temp archive: {e}")))?;

        let file = temp
            .reopen()
            .map_err(|e| AppError::Packaging(format!("could not open temp archive: {e}")))?;
        let mut file = write_archive(file, documents)?;

        file.seek(SeekFrom::Start(0))
            .map_err(|e| AppError::Packaging(format!("could not rewind archive: {e}")))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|e| AppError::Packaging(format!("could not read archive back: {e}")))?;

        temp.close()
            .map_err(|e| AppError::Packaging(format!("could not remove temp archive: {e}")))?;

        Ok(bytes)
    }
}

/// Writes the archive to `path`, replacing any existing file.
#[tracing::instrument(name = "archive.pack_to_path", skip(documents), fields(document_count = documents.len()))]
pub fn pack_to_path(path: &Path, documents: &[ExtractedDocument]) -> Result<u64, AppError> {
    let file = File::create(path).map_err(|e| {
        AppError::Packaging(format!("could not create archive {}: {e}", path.display()))
    })?;
    let file = write_archive(file, documents)?;

    let size = file
        .metadata()
        .map_err(|e| AppError::Packaging(format!("could not stat archive: {e}")))?
        .len();
    if size == 0 {
        return Err(AppError::Packaging(format!(
            "archive {} is empty after finalizing",
            path.display()
        )));
    }

    Ok(size)
}

fn write_archive(file: File, documents: &[ExtractedDocument]) -> Result<File, AppError> {
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for doc in dedupe_by_name(documents) {
        writer
            .start_file(doc.name.as_str(), options)
            .map_err(|e| AppError::Packaging(format!("could not add {}: {e}", doc.name)))?;
        writer
            .write_all(&doc.content)
            .map_err(|e| AppError::Packaging(format!("could not write {}: {e}", doc.name)))?;
    }

    writer
        .finish()
        .map_err(|e| AppError::Packaging(format!("could not finalize archive: {e}")))
}

/// Later documents replace earlier ones with the same name, keeping the
/// position of the first occurrence.
fn dedupe_by_name(documents: &[ExtractedDocument]) -> Vec<&ExtractedDocument> {
    let mut unique: Vec<&ExtractedDocument> = Vec::with_capacity(documents.len());
    for doc in documents {
        match unique.iter().position(|d| d.name == doc.name) {
            Some(idx) => unique[idx] = doc,
            None => unique.push(doc),
        }
    }
    unique
}
