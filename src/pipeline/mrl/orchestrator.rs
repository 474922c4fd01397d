use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use opentelemetry::KeyValue;

use crate::clients::{MrlReportResponse, MrlService, MrlSession, ReportPayload};
use crate::config::MrlConfig;
use crate::db::{ComplianceSummary, LegacyDataGateway};
use crate::error::AppError;
use crate::pipeline::archive::pack_to_path;
use crate::pipeline::bundle::ExtractedDocument;
use crate::pipeline::workspace::TempWorkspace;
use crate::telemetry::{MRL_RUN_DURATION, MRL_SAMPLES_FAILED, MRL_SAMPLES_SUCCEEDED};

use super::download::ZipDownload;
use super::params::{MrlReportParameters, MrlRequest, resolve_parameters};
use super::SampleOutcome;

/// Result of one MRL run: the per-sample log is always present, even when
/// the run as a whole failed.
#[derive(Debug)]
pub struct MrlRun {
    pub samples: Vec<SampleOutcome>,
    pub result: Result<ZipDownload, AppError>,
}

#[derive(Default)]
struct RunState {
    samples: Vec<SampleOutcome>,
    documents: Vec<ExtractedDocument>,
    written_pdfs: Vec<PathBuf>,
    zip_base_name: Option<String>,
    zip_path: Option<PathBuf>,
}

pub struct MrlReportOrchestrator {
    gateway: Arc<dyn LegacyDataGateway>,
    service: Arc<dyn MrlService>,
    config: MrlConfig,
    temp_root: PathBuf,
}

impl MrlReportOrchestrator {
    pub fn new(
        gateway: Arc<dyn LegacyDataGateway>,
        service: Arc<dyn MrlService>,
        config: MrlConfig,
        temp_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            gateway,
            service,
            config,
            temp_root: temp_root.into(),
        }
    }

    #[tracing::instrument(
        name = "pipeline mrl_report",
        skip(self, request),
        fields(
            mrl.prod_mode = self.config.prod_mode,
            mrl.requested = request.sample_ids.len(),
            mrl.succeeded,
            mrl.failed,
            mrl.duration_ms,
        )
    )]
    pub async fn generate(&self, request: &MrlRequest) -> MrlRun {
        let sample_ids = match request.validate() {
            Ok(ids) => ids,
            Err(e) => {
                return MrlRun {
                    samples: Vec::new(),
                    result: Err(e),
                };
            }
        };

        let start = Instant::now();

        let workspace = match TempWorkspace::create(&self.temp_root).await {
            Ok(ws) => ws,
            Err(e) => {
                tracing::error!(error = %e, "Could not allocate MRL workspace");
                return MrlRun {
                    samples: Vec::new(),
                    result: Err(AppError::Io(e)),
                };
            }
        };

        tracing::info!(
            workspace.id = workspace.id(),
            sample_ids = ?sample_ids,
            markets = %request.joined_markets(),
            retailers = %request.joined_retailers(),
            language = %request.language,
            "Starting MRL run"
        );

        let mut state = RunState::default();
        let result = self
            .run(&workspace, &sample_ids, request, &mut state)
            .await;

        // The zip only survives teardown when it is handed to the caller.
        let undelivered_zip = match &result {
            Ok(_) => None,
            Err(_) => state.zip_path.as_deref(),
        };
        workspace
            .teardown(&state.written_pdfs, undelivered_zip)
            .await;

        let succeeded = state.samples.iter().filter(|s| s.success).count();
        let failed = state.samples.len() - succeeded;
        let duration = start.elapsed();

        MRL_SAMPLES_SUCCEEDED.add(succeeded as u64, &[]);
        MRL_SAMPLES_FAILED.add(failed as u64, &[]);
        MRL_RUN_DURATION.record(
            duration.as_secs_f64(),
            &[KeyValue::new("outcome", if result.is_ok() { "ok" } else { "error" })],
        );

        let span = tracing::Span::current();
        span.record("mrl.succeeded", succeeded);
        span.record("mrl.failed", failed);
        span.record("mrl.duration_ms", duration.as_millis() as u64);

        MrlRun {
            samples: state.samples,
            result,
        }
    }

    async fn run(
        &self,
        workspace: &TempWorkspace,
        sample_ids: &[String],
        request: &MrlRequest,
        state: &mut RunState,
    ) -> Result<ZipDownload, AppError> {
        let session = self.service.login().await?;
        tracing::info!("MRL service authenticated");

        for sample_id in sample_ids {
            let outcome = match self
                .process_sample(&session, workspace, sample_id, request, state)
                .await
            {
                Ok(()) => SampleOutcome::succeeded(
                    sample_id,
                    format!("MRL report for {sample_id} processed."),
                ),
                Err(message) => {
                    tracing::warn!(sample_id = %sample_id, reason = %message, "MRL sample failed");
                    SampleOutcome::failed(sample_id, message)
                }
            };
            state.samples.push(outcome);
        }

        if state.documents.is_empty() {
            tracing::error!("No MRL PDF was produced");
            return Err(AppError::NoReportsGenerated);
        }

        let base = state
            .zip_base_name
            .clone()
            .unwrap_or_else(|| format!("MRL_Informe_{}", random_suffix(4)));
        let file_name = format!("{base}.zip");
        let zip_path = workspace.zip_dir().join(&file_name);
        state.zip_path = Some(zip_path.clone());

        let documents = std::mem::take(&mut state.documents);
        let document_count = documents.len();
        let target = zip_path.clone();
        let size = tokio::task::spawn_blocking(move || pack_to_path(&target, &documents))
            .await
            .map_err(|e| AppError::Packaging(format!("packaging task failed: {e}")))??;

        tracing::info!(
            zip = %file_name,
            documents = document_count,
            size,
            "MRL zip created"
        );

        Ok(ZipDownload::new(zip_path, file_name))
    }

    /// Runs one sample through db lookup, parameters, report request and
    /// save. The error is the message recorded in the sample log.
    #[tracing::instrument(
        name = "pipeline_stage mrl_sample",
        skip(self, session, workspace, request, state)
    )]
    async fn process_sample(
        &self,
        session: &MrlSession,
        workspace: &TempWorkspace,
        sample_id: &str,
        request: &MrlRequest,
        state: &mut RunState,
    ) -> Result<(), String> {
        let info = match self.gateway.sample_db_info(sample_id).await {
            Ok(Some(info)) => info,
            Ok(None) => {
                return Err(format!("Database info not found for sample {sample_id}."));
            }
            Err(e) => {
                tracing::error!(error = %e, "Sample info lookup failed");
                return Err(format!("Database info not found for sample {sample_id}."));
            }
        };
        let base_name = safe_file_stem(&info.base_name);
        if state.zip_base_name.is_none() {
            state.zip_base_name = Some(base_name.clone());
        }

        let params = resolve_parameters(self.gateway.as_ref(), sample_id, &info.labcode, request)
            .await
            .map_err(|e| e.to_string())?;

        let payload = ReportPayload {
            orden_servicio: sample_id.to_string(),
            mercados: params.markets.clone(),
            id_retailer: params.retailers.clone(),
            ingles: params.language.clone(),
            id_laboratorio: params.lab_code.clone(),
        };
        tracing::info!(payload = ?payload, "Requesting MRL report");

        let response = self
            .service
            .request_report(session, &payload)
            .await
            .map_err(|e| e.to_string())?;

        self.log_response(sample_id, &response).await;

        let (service_order, pdf_base64) = match (response.service_order(), response.pdf_base64()) {
            (Some(order), Some(pdf)) => (order, pdf),
            _ => {
                return Err(response.message().unwrap_or_else(|| {
                    "Incomplete MRL response: missing PDF or service order.".to_string()
                }));
            }
        };

        let pdf = decode_pdf(pdf_base64)
            .ok_or_else(|| "Could not decode the PDF content (invalid or empty).".to_string())?;

        let file_name = format!("{base_name}.pdf");
        let pdf_path = workspace.pdf_dir().join(&file_name);
        state.written_pdfs.push(pdf_path.clone());
        tokio::fs::write(&pdf_path, &pdf).await.map_err(|e| {
            tracing::error!(path = %pdf_path.display(), error = %e, "Could not write PDF");
            "Could not save the PDF on the server.".to_string()
        })?;

        self.persist_compliance(&service_order, &response, &params)
            .await;

        state.documents.push(ExtractedDocument {
            name: file_name,
            content: pdf,
        });
        Ok(())
    }

    /// Side channel: a failed write is logged and does not fail the sample.
    async fn persist_compliance(
        &self,
        service_order: &str,
        response: &MrlReportResponse,
        params: &MrlReportParameters,
    ) {
        let summary = ComplianceSummary {
            sample_id: service_order.to_string(),
            test_flag: self.config.test_flag(),
            market_results: response.market_summary_json(),
            retail_results: response.retail_summary_json(),
            generated_at: chrono::Local::now().naive_local(),
            markets: params.markets.clone(),
            retailers: params.retailers.clone(),
            language: params.language.clone(),
        };

        match self.gateway.save_compliance(&summary).await {
            Ok(rows) => tracing::info!(rows, "Compliance summary stored"),
            Err(e) => tracing::error!(error = %e, "Could not store compliance summary"),
        }
    }

    async fn log_response(&self, sample_id: &str, response: &MrlReportResponse) {
        let Some(dir) = &self.config.response_log_dir else {
            return;
        };

        let path = dir.join(format!(
            "{}_{}.json",
            safe_file_stem(sample_id),
            chrono::Local::now().format("%d-%m-%y_%H_%M")
        ));

        let written = async {
            let body = serde_json::to_vec_pretty(response).map_err(std::io::Error::other)?;
            tokio::fs::create_dir_all(dir).await?;
            tokio::fs::write(&path, body).await
        }
        .await;

        if let Err(e) = written {
            tracing::warn!(path = %path.display(), error = %e, "Could not write MRL response log");
        }
    }
}

fn decode_pdf(encoded: &str) -> Option<Vec<u8>> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(compact).ok().filter(|bytes| !bytes.is_empty())
}

fn safe_file_stem(raw: &str) -> String {
    let stem: String = raw
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c if c.is_control() => '-',
            c => c,
        })
        .collect();
    match stem.trim_matches('.') {
        "" => format!("sample_{}", random_suffix(6)),
        s => s.to_string(),
    }
}

fn random_suffix(len: usize) -> String {
    std::iter::repeat_with(fastrand::alphanumeric)
        .take(len)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MrlConfig, MrlCredentialSet};
    use crate::db::{MrlDefaults, SampleDbInfo};
    use crate::testing::{FakeGateway, FakeMrlService, report_response};
    use std::io::Read;
    use std::path::Path;

    fn config() -> MrlConfig {
        let set = || MrlCredentialSet {
            password: "p".into(),
            login_url: "http://mrl.invalid/login".into(),
            report_url: "http://mrl.invalid/report".into(),
        };
        MrlConfig::resolve(true, "lab@example.com".into(), set(), set())
    }

    fn info(labcode: &str, base: &str) -> SampleDbInfo {
        SampleDbInfo {
            labcode: labcode.to_string(),
            base_name: base.to_string(),
        }
    }

    fn request(samples: &[&str], markets: &[&str]) -> MrlRequest {
        MrlRequest {
            market_ids: markets.iter().map(|s| s.to_string()).collect(),
            retail_ids: vec!["5".to_string()],
            language: "0".to_string(),
            sample_ids: samples.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn orchestrator(
        gateway: Arc<FakeGateway>,
        service: Arc<FakeMrlService>,
        root: &Path,
    ) -> MrlReportOrchestrator {
        MrlReportOrchestrator::new(gateway, service, config(), root)
    }

    fn staging_is_empty(root: &Path) -> bool {
        ["mrl_pdfs", "mrl_zips"].iter().all(|sub| {
            let dir = root.join(sub);
            !dir.exists() || std::fs::read_dir(dir).unwrap().next().is_none()
        })
    }

    #[tokio::test]
    async fn test_empty_samples_fail_before_login() {
        let root = tempfile::tempdir().unwrap();
        let service = Arc::new(FakeMrlService::default());
        let orch = orchestrator(Arc::new(FakeGateway::default()), service.clone(), root.path());

        let run = orch.generate(&request(&["", "  "], &["1"])).await;

        assert!(matches!(run.result, Err(AppError::InvalidInput(_))));
        assert!(run.samples.is_empty());
        assert_eq!(service.login_calls(), 0);
        assert!(!root.path().join("mrl_pdfs").exists());
    }

    #[tokio::test]
    async fn test_auth_failure_aborts_without_sample_attempts() {
        let root = tempfile::tempdir().unwrap();
        let mut gateway = FakeGateway::default();
        gateway.infos.insert("S1".into(), info("36", "0001-25_mrl"));
        let service = Arc::new(FakeMrlService {
            fail_login: true,
            ..Default::default()
        });
        let orch = orchestrator(Arc::new(gateway), service.clone(), root.path());

        let run = orch.generate(&request(&["S1"], &["1"])).await;

        assert!(matches!(run.result, Err(AppError::Auth(_))));
        assert!(run.samples.is_empty());
        assert!(service.report_calls().is_empty());
        assert!(staging_is_empty(root.path()));
    }

    #[tokio::test]
    async fn test_every_sample_failing_reports_each_one() {
        let root = tempfile::tempdir().unwrap();
        let orch = orchestrator(
            Arc::new(FakeGateway::default()),
            Arc::new(FakeMrlService::default()),
            root.path(),
        );

        let run = orch.generate(&request(&["S1", "S2", "S3"], &["1"])).await;

        assert!(matches!(run.result, Err(AppError::NoReportsGenerated)));
        assert_eq!(run.samples.len(), 3);
        assert!(run.samples.iter().all(|s| !s.success));
        assert!(run.samples[1].message.contains("S2"));
        assert!(staging_is_empty(root.path()));
    }

    #[tokio::test]
    async fn test_partial_success_produces_zip_and_log() {
        let root = tempfile::tempdir().unwrap();
        let mut gateway = FakeGateway::default();
        gateway.infos.insert("S1".into(), info("36", "0001-25_mrl"));
        gateway.infos.insert("S2".into(), info("36", "0002-25_mrl"));
        gateway.infos.insert("S3".into(), info("53", "0003-25_mrl"));
        // No markets requested: S1 and S3 fall back to their defaults, S2 has none.
        gateway.defaults.insert(
            "S1".into(),
            MrlDefaults {
                markets: Some("1".into()),
                retail: Some("".into()),
                language: Some("1".into()),
            },
        );
        gateway.defaults.insert("S2".into(), MrlDefaults::default());
        gateway.defaults.insert(
            "S3".into(),
            MrlDefaults {
                markets: Some("2,3".into()),
                retail: None,
                language: None,
            },
        );
        let gateway = Arc::new(gateway);

        let mut service = FakeMrlService::default();
        service
            .responses
            .insert("S1".into(), Ok(report_response("S1", Some(b"%PDF one"))));
        service.responses.insert(
            "S3".into(),
            Ok(report_response("S3", Some(b"%PDF three"))),
        );
        let service = Arc::new(service);

        let mut req = request(&["S1", "S2", "S3"], &[]);
        req.retail_ids.clear();

        let orch = orchestrator(gateway.clone(), service.clone(), root.path());
        let run = orch.generate(&req).await;

        let download = run.result.unwrap();
        assert_eq!(download.file_name(), "0001-25_mrl.zip");
        assert_eq!(run.samples.len(), 3);
        assert!(run.samples[0].success);
        assert!(!run.samples[1].success);
        assert!(run.samples[1].message.contains("no markets"));
        assert!(run.samples[2].success);

        let sent = service.report_calls();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].mercados, "1");
        assert_eq!(sent[0].ingles, "1");
        assert_eq!(sent[0].id_laboratorio, "36");
        assert_eq!(sent[1].mercados, "2,3");
        assert_eq!(sent[1].ingles, "0");
        assert_eq!(sent[1].id_laboratorio, "53");

        let saved = gateway.saved_summaries();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0].sample_id, "S1");
        assert_eq!(saved[0].test_flag, 1);

        let zip_path = download.path().to_path_buf();
        let bytes = download.into_bytes().await.unwrap();
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);
        let mut content = Vec::new();
        archive
            .by_name("0003-25_mrl.pdf")
            .unwrap()
            .read_to_end(&mut content)
            .unwrap();
        assert_eq!(content, b"%PDF three");

        assert!(!zip_path.exists());
        assert!(staging_is_empty(root.path()));
    }

    #[tokio::test]
    async fn test_response_without_pdf_fails_sample_with_service_message() {
        let root = tempfile::tempdir().unwrap();
        let mut gateway = FakeGateway::default();
        gateway.infos.insert("S1".into(), info("36", "0001-25_mrl"));
        let mut service = FakeMrlService::default();
        let mut response = report_response("S1", None);
        response.mensaje = Some(serde_json::json!("Sample has no published results"));
        service.responses.insert("S1".into(), Ok(response));

        let orch = orchestrator(Arc::new(gateway), Arc::new(service), root.path());
        let run = orch.generate(&request(&["S1"], &["1"])).await;

        assert!(matches!(run.result, Err(AppError::NoReportsGenerated)));
        assert_eq!(run.samples[0].message, "Sample has no published results");
        assert!(staging_is_empty(root.path()));
    }

    #[tokio::test]
    async fn test_report_errors_do_not_abort_siblings() {
        let root = tempfile::tempdir().unwrap();
        let mut gateway = FakeGateway::default();
        gateway.infos.insert("S1".into(), info("36", "first_mrl"));
        gateway.infos.insert("S2".into(), info("36", "second_mrl"));
        let mut service = FakeMrlService::default();
        service.responses.insert(
            "S1".into(),
            Err(AppError::MalformedResponse("invalid JSON".into())),
        );
        service
            .responses
            .insert("S2".into(), Ok(report_response("S2", Some(b"%PDF two"))));

        let orch = orchestrator(Arc::new(gateway), Arc::new(service), root.path());
        let run = orch.generate(&request(&["S1", "S2"], &["1"])).await;

        let download = run.result.unwrap();
        // Base name comes from the first sample whose db info resolved.
        assert_eq!(download.file_name(), "first_mrl.zip");
        assert!(!run.samples[0].success);
        assert!(run.samples[0].message.contains("Malformed response"));
        assert!(run.samples[1].success);
        drop(download);
        assert!(staging_is_empty(root.path()));
    }

    #[tokio::test]
    async fn test_compliance_failure_does_not_fail_sample() {
        let root = tempfile::tempdir().unwrap();
        let mut gateway = FakeGateway {
            fail_compliance: true,
            ..Default::default()
        };
        gateway.infos.insert("S1".into(), info("36", "0001-25_mrl"));
        let mut service = FakeMrlService::default();
        service
            .responses
            .insert("S1".into(), Ok(report_response("S1", Some(b"%PDF"))));

        let orch = orchestrator(Arc::new(gateway), Arc::new(service), root.path());
        let run = orch.generate(&request(&["S1"], &["1"])).await;

        tokio_test::assert_ok!(run.result);
        assert!(run.samples[0].success);
    }

    #[tokio::test]
    async fn test_undecodable_pdf_fails_sample() {
        let root = tempfile::tempdir().unwrap();
        let mut gateway = FakeGateway::default();
        gateway.infos.insert("S1".into(), info("36", "0001-25_mrl"));
        let mut service = FakeMrlService::default();
        let mut response = report_response("S1", None);
        response.pdf = Some("data:application/pdf;base64,@@not-base64@@".into());
        service.responses.insert("S1".into(), Ok(response));

        let orch = orchestrator(Arc::new(gateway), Arc::new(service), root.path());
        let run = orch.generate(&request(&["S1"], &["1"])).await;

        assert!(matches!(run.result, Err(AppError::NoReportsGenerated)));
        assert!(run.samples[0].message.contains("decode"));
    }

    #[tokio::test]
    async fn test_response_log_written_when_configured() {
        let root = tempfile::tempdir().unwrap();
        let log_dir = root.path().join("responses");
        let mut gateway = FakeGateway::default();
        gateway.infos.insert("S1".into(), info("36", "0001-25_mrl"));
        let mut service = FakeMrlService::default();
        service
            .responses
            .insert("S1".into(), Ok(report_response("S1", Some(b"%PDF"))));

        let mut cfg = config();
        cfg.response_log_dir = Some(log_dir.clone());
        let orch = MrlReportOrchestrator::new(
            Arc::new(gateway),
            Arc::new(service),
            cfg,
            root.path().join("work"),
        );
        let run = orch.generate(&request(&["S1"], &["1"])).await;

        tokio_test::assert_ok!(run.result);
        let logged: Vec<_> = std::fs::read_dir(&log_dir).unwrap().collect();
        assert_eq!(logged.len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_run_leaves_no_staging_files() {
        let root = tempfile::tempdir().unwrap();
        let mut gateway = FakeGateway::default();
        gateway.infos.insert("S1".into(), info("36", "0001-25_mrl"));
        gateway.infos.insert("S2".into(), info("36", "0002-25_mrl"));
        let mut service = FakeMrlService {
            stall_on: Some("S2".into()),
            ..Default::default()
        };
        service
            .responses
            .insert("S1".into(), Ok(report_response("S1", Some(b"%PDF-1.4"))));
        let service = Arc::new(service);
        let orch = orchestrator(Arc::new(gateway), service.clone(), root.path());

        let request = request(&["S1", "S2"], &["1"]);
        let outcome =
            tokio::time::timeout(std::time::Duration::from_millis(500), orch.generate(&request))
                .await;

        assert!(outcome.is_err());
        assert_eq!(service.report_calls().len(), 2);
        assert!(staging_is_empty(root.path()));
    }

    #[test]
    fn test_safe_file_stem() {
        assert_eq!(safe_file_stem("0001/25_mrl"), "0001-25_mrl");
        assert_eq!(safe_file_stem("  a:b  "), "a-b");
        assert!(safe_file_stem("..").starts_with("sample_"));
    }

    #[test]
    fn test_decode_pdf() {
        assert_eq!(decode_pdf("JVBE\nRg=="), Some(b"%PDF".to_vec()));
        assert_eq!(decode_pdf(""), None);
        assert_eq!(decode_pdf("!!!"), None);
    }
}
