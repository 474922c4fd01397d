use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, TimeZone};
use serde::Serialize;

use crate::error::AppError;
use crate::telemetry::BUNDLES_PACKED;

use super::archive::ArchivePacker;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDocument {
    pub name: String,
    pub content: Vec<u8>,
}

/// A document ready for JSON transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportBundle {
    #[serde(rename = "NombreLaudo")]
    pub name: String,
    #[serde(rename = "Laudo")]
    pub base64_content: String,
}

impl ReportBundle {
    pub fn from_document(doc: &ExtractedDocument) -> Self {
        Self {
            name: doc.name.clone(),
            base64_content: STANDARD.encode(&doc.content),
        }
    }
}

/// Zero documents give an empty list, one is passed through untouched, and
/// two or more are zipped under `zip_name` on the blocking pool.
pub async fn bundle_documents(
    documents: Vec<ExtractedDocument>,
    packer: &ArchivePacker,
    zip_name: impl FnOnce() -> String,
) -> Result<Vec<ReportBundle>, AppError> {
    match documents.len() {
        0 => Ok(Vec::new()),
        1 => Ok(vec![ReportBundle::from_document(&documents[0])]),
        count => {
            let packer = packer.clone();
            let bytes = tokio::task::spawn_blocking(move || packer.pack(&documents))
                .await
                .map_err(|e| AppError::Packaging(format!("packaging task failed: {e}")))??;
            let name = zip_name();
            BUNDLES_PACKED.add(1, &[]);
            tracing::info!(zip_name = %name, documents = count, size = bytes.len(), "Bundle packed");
            Ok(vec![ReportBundle {
                name,
                base64_content: STANDARD.encode(bytes),
            }])
        }
    }
}

/// `<DD_MM_YY_HH_MM_SS>_<millis>_relatorio.zip`
pub fn relatorio_zip_name<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!(
        "{}_{:03}_relatorio.zip",
        now.format("%d_%m_%y_%H_%M_%S"),
        now.timestamp_subsec_millis() % 1000
    )
}

/// `Informes_Ingles_<YYYYMMDD_HHMMSS>.zip`
pub fn english_zip_name<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("Informes_Ingles_{}.zip", now.format("%Y%m%d_%H%M%S"))
}
