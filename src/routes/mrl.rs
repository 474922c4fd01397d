use axum::{
    Json,
    body::Body,
    extract::State,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::AppState;
use crate::db::SelectOption;
use crate::error::{AppError, AppResult, get_trace_id};
use crate::pipeline::{MrlRequest, SampleOutcome};

use super::distinct_sample_ids;

/// Form ids arrive as numbers or strings depending on the client.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FormId {
    Number(i64),
    Text(String),
}

impl FormId {
    fn into_string(self) -> String {
        match self {
            FormId::Number(n) => n.to_string(),
            FormId::Text(s) => s.trim().to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GenerateMrlBody {
    #[serde(default)]
    pub market_ids: Vec<FormId>,
    #[serde(default)]
    pub retail_ids: Vec<FormId>,
    pub language: FormId,
    pub sample_ids: Vec<FormId>,
}

impl GenerateMrlBody {
    fn into_request(self) -> Result<MrlRequest, AppError> {
        let raw_ids: Vec<String> = self.sample_ids.into_iter().map(FormId::into_string).collect();
        Ok(MrlRequest {
            market_ids: self.market_ids.into_iter().map(FormId::into_string).collect(),
            retail_ids: self.retail_ids.into_iter().map(FormId::into_string).collect(),
            language: self.language.into_string(),
            sample_ids: distinct_sample_ids(&raw_ids)?,
        })
    }
}

#[derive(Debug, Serialize)]
struct MrlFailureBody<'a> {
    success: bool,
    message: String,
    details: &'a [SampleOutcome],
    #[serde(skip_serializing_if = "Option::is_none")]
    trace_id: Option<String>,
}

fn failure_response(error: &AppError, details: &[SampleOutcome]) -> Response {
    let body = MrlFailureBody {
        success: false,
        message: error.public_message(),
        details,
        trace_id: get_trace_id(),
    };
    (error.status_code(), Json(body)).into_response()
}

pub async fn generate_report(
    State(state): State<AppState>,
    Json(body): Json<GenerateMrlBody>,
) -> Response {
    let request = match body.into_request() {
        Ok(request) => request,
        Err(e) => return failure_response(&e, &[]),
    };

    let run = state.mrl_orchestrator.generate(&request).await;

    let download = match run.result {
        Ok(download) => download,
        Err(e) => return failure_response(&e, &run.samples),
    };

    let disposition = format!("attachment; filename=\"{}\"", download.file_name());
    let bytes = match download.into_bytes().await {
        Ok(bytes) => bytes,
        Err(e) => return failure_response(&AppError::Io(e), &run.samples),
    };

    let mut response = Response::new(Body::from(bytes));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/zip"),
    );
    match HeaderValue::from_str(&disposition) {
        Ok(value) => {
            headers.insert(header::CONTENT_DISPOSITION, value);
        }
        Err(e) => tracing::warn!(error = %e, "Zip name is not a valid header value"),
    }
    *response.status_mut() = StatusCode::OK;
    response
}

#[derive(Debug, Serialize)]
pub struct MrlOptions {
    pub markets: Vec<SelectOption>,
    pub retailers: Vec<SelectOption>,
}

pub async fn options(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    let markets = state
        .gateway
        .mrl_markets()
        .await
        .map_err(|e| AppError::upstream("loading MRL markets", e))?;
    let retailers = state
        .gateway
        .mrl_retailers()
        .await
        .map_err(|e| AppError::upstream("loading MRL retailers", e))?;

    Ok(Json(json!({
        "success": true,
        "data": MrlOptions { markets, retailers },
    })))
}
