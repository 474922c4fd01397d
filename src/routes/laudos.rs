use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::pipeline::ReportBundle;

use super::distinct_sample_ids;

#[derive(Debug, Deserialize)]
pub struct ExtractLaudosBody {
    #[serde(alias = "selected_ids")]
    pub sample_ids: Vec<String>,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ExtractLaudosResponse {
    pub success: bool,
    pub message: String,
    pub data: Vec<ReportBundle>,
}

pub async fn extract_laudos(
    State(state): State<AppState>,
    Json(body): Json<ExtractLaudosBody>,
) -> AppResult<Json<ExtractLaudosResponse>> {
    let sample_ids = distinct_sample_ids(&body.sample_ids)?;

    let data = match body.language.as_deref().map(str::trim) {
        None | Some("") | Some("es") => state.laudo_service.extract(&sample_ids).await?,
        Some("en") => state.english_pipeline.extract_english(&sample_ids).await?,
        Some(other) => {
            return Err(AppError::InvalidInput(format!(
                "unsupported language {other:?}, use \"es\" or \"en\""
            )));
        }
    };

    let message = if data.is_empty() {
        "No laudo could be extracted for the requested samples."
    } else {
        "Laudos extracted."
    };

    Ok(Json(ExtractLaudosResponse {
        success: true,
        message: message.to_string(),
        data,
    }))
}
