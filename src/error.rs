use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use opentelemetry::trace::TraceContextExt;
use serde_json::json;
use thiserror::Error;
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Upstream error: {context}: {source}")]
    Upstream {
        context: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("MRL authentication failed: {0}")]
    Auth(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Sample {0} has no markets and none were found in fallback")]
    MissingMarkets(String),

    #[error("No reports were generated")]
    NoReportsGenerated,

    #[error("Packaging error: {0}")]
    Packaging(String),

    #[error("Report service error: {0}")]
    ReportService(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn upstream(context: impl Into<String>, source: sqlx::Error) -> Self {
        AppError::Upstream {
            context: context.into(),
            source,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::NoReportsGenerated => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to hand back to the caller. Dependency failures are
    /// logged here and replaced by a generic text.
    pub fn public_message(&self) -> String {
        match self {
            AppError::InvalidInput(msg) => msg.clone(),
            AppError::NoReportsGenerated => {
                "No valid PDF reports were generated. Check the per-sample details.".to_string()
            }
            AppError::MissingMarkets(_) => self.to_string(),
            other => {
                tracing::error!(error = %other, "Request failed");
                "Internal server error".to_string()
            }
        }
    }
}

pub(crate) fn get_trace_id() -> Option<String> {
    let span = Span::current();
    let context = span.context();
    let span_ref = context.span();
    let span_context = span_ref.span_context();

    if span_context.is_valid() {
        Some(span_context.trace_id().to_string())
    } else {
        None
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.public_message();

        let body = if let Some(trace_id) = get_trace_id() {
            json!({
                "success": false,
                "message": message,
                "status": status.as_u16(),
                "trace_id": trace_id,
            })
        } else {
            json!({
                "success": false,
                "message": message,
                "status": status.as_u16(),
            })
        };

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
