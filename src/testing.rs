//! In-memory doubles for the gateway and the two remote services.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::Write;
use std::sync::Mutex;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::write::ZlibEncoder;

use crate::clients::{MrlReportResponse, MrlService, MrlSession, ReportPayload, ReportRenderer};
use crate::db::{
    ComplianceSummary, CompressedReportRow, LegacyDataGateway, MrlDefaults, SampleDbInfo,
    SelectOption,
};
use crate::error::AppError;

pub fn zlib(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn unavailable(what: &str) -> sqlx::Error {
    sqlx::Error::Protocol(format!("{what} unavailable"))
}

#[derive(Default)]
pub struct FakeGateway {
    pub fail_reports: bool,
    pub fail_markers: bool,
    pub fail_defaults: bool,
    pub fail_compliance: bool,
    pub fail_options: bool,
    pub reports: Vec<CompressedReportRow>,
    pub infos: HashMap<String, SampleDbInfo>,
    pub defaults: HashMap<String, MrlDefaults>,
    pub markets: Vec<SelectOption>,
    pub retailers: Vec<SelectOption>,
    pub(crate) report_calls: Mutex<Vec<Vec<String>>>,
    pub(crate) defaults_calls: Mutex<Vec<String>>,
    pub(crate) markers: Mutex<HashSet<String>>,
    pub(crate) saved: Mutex<Vec<ComplianceSummary>>,
}

impl FakeGateway {
    pub fn with_reports(reports: Vec<CompressedReportRow>) -> Self {
        Self {
            reports,
            ..Default::default()
        }
    }

    pub fn report_calls(&self) -> Vec<Vec<String>> {
        self.report_calls.lock().unwrap().clone()
    }

    pub fn defaults_calls(&self) -> Vec<String> {
        self.defaults_calls.lock().unwrap().clone()
    }

    pub fn active_markers(&self) -> Vec<String> {
        self.markers.lock().unwrap().iter().cloned().collect()
    }

    pub fn saved_summaries(&self) -> Vec<ComplianceSummary> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl LegacyDataGateway for FakeGateway {
    async fn fetch_compressed_reports(
        &self,
        sample_ids: &[String],
    ) -> Result<Vec<CompressedReportRow>, sqlx::Error> {
        self.report_calls.lock().unwrap().push(sample_ids.to_vec());
        if self.fail_reports {
            return Err(unavailable("laudo store"));
        }
        Ok(self.reports.clone())
    }

    async fn sample_db_info(&self, sample_id: &str) -> Result<Option<SampleDbInfo>, sqlx::Error> {
        Ok(self.infos.get(sample_id).cloned())
    }

    async fn mrl_defaults(&self, sample_id: &str) -> Result<Option<MrlDefaults>, sqlx::Error> {
        self.defaults_calls
            .lock()
            .unwrap()
            .push(sample_id.to_string());
        if self.fail_defaults {
            return Err(unavailable("defaults"));
        }
        Ok(self.defaults.get(sample_id).cloned())
    }

    async fn save_compliance(&self, summary: &ComplianceSummary) -> Result<u64, sqlx::Error> {
        if self.fail_compliance {
            return Err(unavailable("compliance table"));
        }
        self.saved.lock().unwrap().push(summary.clone());
        Ok(1)
    }

    async fn register_session_marker(
        &self,
        session_id: &str,
        _sample_id: &str,
    ) -> Result<(), sqlx::Error> {
        if self.fail_markers {
            return Err(unavailable("session table"));
        }
        self.markers.lock().unwrap().insert(session_id.to_string());
        Ok(())
    }

    async fn clear_session_marker(&self, session_id: &str) -> Result<(), sqlx::Error> {
        self.markers.lock().unwrap().remove(session_id);
        Ok(())
    }

    async fn mrl_markets(&self) -> Result<Vec<SelectOption>, sqlx::Error> {
        if self.fail_options {
            return Err(unavailable("markets"));
        }
        Ok(self.markets.clone())
    }

    async fn mrl_retailers(&self) -> Result<Vec<SelectOption>, sqlx::Error> {
        if self.fail_options {
            return Err(unavailable("retailers"));
        }
        Ok(self.retailers.clone())
    }
}

/// Answers render calls in order; runs out as an error.
pub struct FakeRenderer {
    answers: Mutex<VecDeque<Result<String, AppError>>>,
}

impl FakeRenderer {
    pub fn answering(answers: Vec<Result<String, AppError>>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
        }
    }
}

#[async_trait::async_trait]
impl ReportRenderer for FakeRenderer {
    async fn render(&self, _session_id: &str) -> Result<String, AppError> {
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AppError::ReportService("no answer left".to_string())))
    }
}

pub fn report_response(sample_id: &str, pdf: Option<&[u8]>) -> MrlReportResponse {
    MrlReportResponse {
        orden_servicio: Some(serde_json::json!(sample_id)),
        pdf: pdf.map(|bytes| format!("data:application/pdf;base64,{}", STANDARD.encode(bytes))),
        market_compliance: Some(serde_json::json!([{ "mercado": "EU", "cumple": true }])),
        ..Default::default()
    }
}

#[derive(Default)]
pub struct FakeMrlService {
    pub fail_login: bool,
    pub responses: HashMap<String, Result<MrlReportResponse, AppError>>,
    /// Sample whose report request hangs, for cancellation tests.
    pub stall_on: Option<String>,
    pub(crate) login_calls: Mutex<usize>,
    pub(crate) report_calls: Mutex<Vec<ReportPayload>>,
}

impl FakeMrlService {
    pub fn login_calls(&self) -> usize {
        *self.login_calls.lock().unwrap()
    }

    pub fn report_calls(&self) -> Vec<ReportPayload> {
        self.report_calls.lock().unwrap().clone()
    }
}

fn replay(error: &AppError) -> AppError {
    match error {
        AppError::Auth(m) => AppError::Auth(m.clone()),
        AppError::MalformedResponse(m) => AppError::MalformedResponse(m.clone()),
        other => AppError::ReportService(other.to_string()),
    }
}

#[async_trait::async_trait]
impl MrlService for FakeMrlService {
    async fn login(&self) -> Result<MrlSession, AppError> {
        *self.login_calls.lock().unwrap() += 1;
        if self.fail_login {
            return Err(AppError::Auth("HTTP status 401".to_string()));
        }
        Ok(MrlSession {
            token: "token".to_string(),
            cookie_header: "ARRAffinity=a; ARRAffinitySameSite=a".to_string(),
        })
    }

    async fn request_report(
        &self,
        _session: &MrlSession,
        payload: &ReportPayload,
    ) -> Result<MrlReportResponse, AppError> {
        self.report_calls.lock().unwrap().push(payload.clone());
        if self.stall_on.as_deref() == Some(payload.orden_servicio.as_str()) {
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        }
        match self.responses.get(&payload.orden_servicio) {
            Some(Ok(response)) => Ok(response.clone()),
            Some(Err(e)) => Err(replay(e)),
            None => Err(AppError::ReportService(format!(
                "HTTP status 500 for sample {}",
                payload.orden_servicio
            ))),
        }
    }
}

/// Serves `app` on an ephemeral local port and returns its base URL.
pub async fn serve(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}
