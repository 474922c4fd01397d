use std::sync::Arc;

use crate::db::LegacyDataGateway;
use crate::error::AppError;
use crate::telemetry::{LAUDO_DECOMPRESSION_FAILURES, LAUDOS_EXTRACTED};

use super::archive::ArchivePacker;
use super::bundle::{ExtractedDocument, ReportBundle, bundle_documents, relatorio_zip_name};
use super::decompress::decompress;

#[derive(Clone)]
pub struct LaudoExtractionService {
    gateway: Arc<dyn LegacyDataGateway>,
    packer: ArchivePacker,
}

impl LaudoExtractionService {
    pub fn new(gateway: Arc<dyn LegacyDataGateway>, packer: ArchivePacker) -> Self {
        Self { gateway, packer }
    }

    #[tracing::instrument(
        name = "pipeline laudo_extract",
        skip(self, sample_ids),
        fields(
            laudo.requested = sample_ids.len(),
            laudo.rows,
            laudo.extracted,
        )
    )]
    pub async fn extract(&self, sample_ids: &[String]) -> Result<Vec<ReportBundle>, AppError> {
        if sample_ids.is_empty() {
            return Err(AppError::InvalidInput(
                "at least one sample id is required".to_string(),
            ));
        }

        let rows = self
            .gateway
            .fetch_compressed_reports(sample_ids)
            .await
            .map_err(|e| AppError::upstream("fetching compressed laudos", e))?;

        let span = tracing::Span::current();
        span.record("laudo.rows", rows.len());

        let documents: Vec<ExtractedDocument> = rows
            .into_iter()
            .filter_map(|row| match decompress(&row.blob) {
                Some(content) => Some(ExtractedDocument {
                    name: row.name,
                    content,
                }),
                None => {
                    LAUDO_DECOMPRESSION_FAILURES.add(1, &[]);
                    tracing::warn!(laudo = %row.name, "Could not decompress laudo, skipping it");
                    None
                }
            })
            .collect();

        span.record("laudo.extracted", documents.len());
        LAUDOS_EXTRACTED.add(documents.len() as u64, &[]);

        bundle_documents(documents, &self.packer, || {
            relatorio_zip_name(&chrono::Local::now())
        })
        .await
    }
}
