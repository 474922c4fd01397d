use std::time::Instant;

use reqwest::header::{AUTHORIZATION, COOKIE, SET_COOKIE};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::truncate;
use crate::config::MrlConfig;
use crate::error::AppError;

const AFFINITY_COOKIE: &str = "ARRAffinity=";
const AFFINITY_SAMESITE_COOKIE: &str = "ARRAffinitySameSite=";
const PDF_DATA_URI_PREFIX: &str = "data:application/pdf;base64,";

/// Credentials for one MRL run. Never persisted.
#[derive(Clone)]
pub struct MrlSession {
    pub token: String,
    pub cookie_header: String,
}

impl std::fmt::Debug for MrlSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MrlSession")
            .field("token_len", &self.token.len())
            .field("cookie_len", &self.cookie_header.len())
            .finish()
    }
}

/// Form fields of the report request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportPayload {
    pub orden_servicio: String,
    pub mercados: String,
    pub id_retailer: String,
    pub ingles: String,
    pub id_laboratorio: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MrlReportResponse {
    #[serde(default)]
    pub orden_servicio: Option<Value>,
    #[serde(default)]
    pub pdf: Option<String>,
    #[serde(default)]
    pub mensaje: Option<Value>,
    // Field name as spelled by the service.
    #[serde(default, rename = "cumplimiento_mercaos")]
    pub market_compliance: Option<Value>,
    #[serde(default)]
    pub retail: Option<Value>,
    #[serde(default, rename = "cumplimiento_retail")]
    pub retail_compliance: Option<Value>,
    #[serde(default, rename = "totales_retailer")]
    pub retailer_totals: Option<Value>,
}

impl MrlReportResponse {
    pub fn service_order(&self) -> Option<String> {
        self.orden_servicio.as_ref().and_then(non_empty_text)
    }

    pub fn message(&self) -> Option<String> {
        self.mensaje.as_ref().and_then(non_empty_text)
    }

    /// Base64 payload of the rendered PDF, without the data URI prefix.
    pub fn pdf_base64(&self) -> Option<&str> {
        let pdf = self.pdf.as_deref()?.trim();
        let pdf = pdf.strip_prefix(PDF_DATA_URI_PREFIX).unwrap_or(pdf);
        if pdf.is_empty() { None } else { Some(pdf) }
    }

    /// JSON of the market compliance summary, `[]` when absent.
    pub fn market_summary_json(&self) -> String {
        self.market_compliance
            .as_ref()
            .map(Value::to_string)
            .unwrap_or_else(|| "[]".to_string())
    }

    /// JSON of the retail compliance summary, `[]` when the service did not
    /// evaluate a retailer.
    pub fn retail_summary_json(&self) -> String {
        match &self.retail {
            Some(retail) => serde_json::json!({
                "retail": retail,
                "resultados": self.retail_compliance.clone().unwrap_or_else(|| Value::Array(vec![])),
                "totales": self.retailer_totals.clone().unwrap_or_else(|| Value::Array(vec![])),
            })
            .to_string(),
            None => "[]".to_string(),
        }
    }
}

fn non_empty_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait::async_trait]
pub trait MrlService: Send + Sync {
    async fn login(&self) -> Result<MrlSession, AppError>;

    async fn request_report(
        &self,
        session: &MrlSession,
        payload: &ReportPayload,
    ) -> Result<MrlReportResponse, AppError>;
}

pub struct HttpMrlService {
    client: reqwest::Client,
    config: MrlConfig,
}

impl HttpMrlService {
    pub fn new(config: MrlConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;
        Ok(Self { client, config })
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[async_trait::async_trait]
impl MrlService for HttpMrlService {
    #[tracing::instrument(
        name = "mrl.login",
        skip(self),
        fields(url = %self.config.login_url, http.response.status_code)
    )]
    async fn login(&self) -> Result<MrlSession, AppError> {
        let response = self
            .client
            .post(&self.config.login_url)
            .timeout(self.config.login_timeout)
            .json(&LoginRequest {
                email: &self.config.user,
                password: &self.config.password,
            })
            .send()
            .await
            .map_err(|e| AppError::Auth(format!("login request failed: {e}")))?;

        let status = response.status();
        tracing::Span::current().record("http.response.status_code", status.as_u16());

        let set_cookies: Vec<String> = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect();

        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            tracing::error!(
                status = status.as_u16(),
                body = %truncate(&body, 500),
                "MRL login failed"
            );
            return Err(AppError::Auth(format!("HTTP status {}", status.as_u16())));
        }

        let token = extract_token(&body);
        let cookie_header = merge_cookies(&set_cookies);

        match token {
            Some(token) if !cookie_header.is_empty() => {
                tracing::info!(cookie_len = cookie_header.len(), "MRL session acquired");
                Ok(MrlSession {
                    token,
                    cookie_header,
                })
            }
            token => {
                tracing::error!(
                    token_found = token.is_some(),
                    cookie_found = !cookie_header.is_empty(),
                    body = %truncate(&body, 500),
                    "MRL login response lacks token or cookie"
                );
                Err(AppError::Auth(
                    "token or cookie not found in login response".to_string(),
                ))
            }
        }
    }

    #[tracing::instrument(
        name = "mrl.request_report",
        skip(self, session, payload),
        fields(
            sample_id = %payload.orden_servicio,
            http.response.status_code,
            duration_ms,
        )
    )]
    async fn request_report(
        &self,
        session: &MrlSession,
        payload: &ReportPayload,
    ) -> Result<MrlReportResponse, AppError> {
        let start = Instant::now();
        let response = self
            .client
            .post(&self.config.report_url)
            .timeout(self.config.report_timeout)
            .header(AUTHORIZATION, session.token.as_str())
            .header(COOKIE, session.cookie_header.as_str())
            .form(payload)
            .send()
            .await?;

        let status = response.status();
        let span = tracing::Span::current();
        span.record("http.response.status_code", status.as_u16());

        let body = response.text().await?;
        span.record("duration_ms", start.elapsed().as_millis() as u64);

        if !status.is_success() {
            tracing::error!(
                status = status.as_u16(),
                body = %truncate(&body, 1000),
                "MRL report request failed"
            );
            return Err(AppError::ReportService(format!(
                "HTTP status {} for sample {}: {}",
                status.as_u16(),
                payload.orden_servicio,
                truncate(&body, 200)
            )));
        }

        parse_report_body(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %truncate(&body, 500),
                "MRL report response is not valid JSON"
            );
            AppError::MalformedResponse(format!(
                "invalid JSON from MRL service for sample {}",
                payload.orden_servicio
            ))
        })
    }
}

fn extract_token(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value.get("token").and_then(non_empty_text)
}

/// Builds the `Cookie` header from `Set-Cookie` values. Each `ARRAffinity`
/// cookie also gets its `ARRAffinitySameSite` twin.
pub fn merge_cookies<S: AsRef<str>>(set_cookies: &[S]) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut push = |part: String| {
        if !part.is_empty() && !parts.contains(&part) {
            parts.push(part);
        }
    };

    for raw in set_cookies {
        let main = raw.as_ref().split(';').next().unwrap_or_default().trim();
        if main.is_empty() {
            continue;
        }
        push(main.to_string());
        if let Some(value) = main.strip_prefix(AFFINITY_COOKIE) {
            push(format!("{AFFINITY_SAMESITE_COOKIE}{value}"));
        }
    }

    parts.join("; ")
}

/// Strips control characters and repairs the trailing-comma artifact the
/// service emits before closing arrays.
pub fn sanitize_body(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_ascii_control())
        .collect::<String>()
        .replace("}, ]", "}]")
}

pub fn parse_report_body(raw: &str) -> Result<MrlReportResponse, serde_json::Error> {
    serde_json::from_str(&sanitize_body(raw))
}
