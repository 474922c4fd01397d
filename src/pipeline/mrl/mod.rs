//! MRL report generation: one login, then one report request per sample,
//! with the produced PDFs packed into a single zip.

mod download;
mod orchestrator;
mod params;

use serde::Serialize;

pub use download::ZipDownload;
pub use orchestrator::{MrlReportOrchestrator, MrlRun};
pub use params::{
    LANGUAGE_ENGLISH, LANGUAGE_SPANISH, MrlReportParameters, MrlRequest, resolve_parameters,
};

/// One entry of the per-sample log returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleOutcome {
    #[serde(rename = "muestra")]
    pub sample_id: String,
    pub success: bool,
    #[serde(rename = "mensaje")]
    pub message: String,
}

impl SampleOutcome {
    pub fn succeeded(sample_id: &str, message: impl Into<String>) -> Self {
        Self {
            sample_id: sample_id.to_string(),
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(sample_id: &str, message: impl Into<String>) -> Self {
        Self {
            sample_id: sample_id.to_string(),
            success: false,
            message: message.into(),
        }
    }
}
