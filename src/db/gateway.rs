//! Typed records and the seam every pipeline uses to reach the legacy LIMS.
//!
//! Rows are decoded into these records at the boundary, so the pipelines
//! never handle untyped column maps.

use chrono::NaiveDateTime;
use serde::Serialize;

/// One stored laudo, still compressed.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CompressedReportRow {
    #[sqlx(rename = "nombre")]
    pub name: String,
    #[sqlx(rename = "laudo")]
    pub blob: Vec<u8>,
}

/// Lab code and output base name of a sample, used by the MRL run.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct SampleDbInfo {
    pub labcode: String,
    #[sqlx(rename = "nombrenew")]
    pub base_name: String,
}

/// Default MRL parameters registered for a sample.
#[derive(Debug, Clone, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct MrlDefaults {
    #[sqlx(rename = "mercados")]
    pub markets: Option<String>,
    pub retail: Option<String>,
    #[sqlx(rename = "idioma")]
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComplianceSummary {
    pub sample_id: String,
    pub test_flag: i32,
    pub market_results: String,
    pub retail_results: String,
    pub generated_at: NaiveDateTime,
    pub markets: String,
    pub retailers: String,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

#[async_trait::async_trait]
pub trait LegacyDataGateway: Send + Sync {
    /// Fetches the compressed laudos of all given samples in one call.
    async fn fetch_compressed_reports(
        &self,
        sample_ids: &[String],
    ) -> Result<Vec<CompressedReportRow>, sqlx::Error>;

    async fn sample_db_info(&self, sample_id: &str) -> Result<Option<SampleDbInfo>, sqlx::Error>;

    async fn mrl_defaults(&self, sample_id: &str) -> Result<Option<MrlDefaults>, sqlx::Error>;

    /// Returns the number of rows touched.
    async fn save_compliance(&self, summary: &ComplianceSummary) -> Result<u64, sqlx::Error>;

    async fn register_session_marker(
        &self,
        session_id: &str,
        sample_id: &str,
    ) -> Result<(), sqlx::Error>;

    async fn clear_session_marker(&self, session_id: &str) -> Result<(), sqlx::Error>;

    async fn mrl_markets(&self) -> Result<Vec<SelectOption>, sqlx::Error>;

    async fn mrl_retailers(&self) -> Result<Vec<SelectOption>, sqlx::Error>;
}
