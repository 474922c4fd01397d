use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{Request, Response, StatusCode};
use opentelemetry::KeyValue;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::{MakeSpan, OnResponse, TraceLayer},
};
use tracing::Span;

use clink_reports::clients::{HttpMrlService, HttpReportRenderer};
use clink_reports::config::Config;
use clink_reports::db::{self, LegacyDataGateway, PgLegacyGateway};
use clink_reports::pipeline::{
    ArchivePacker, EnglishLaudoPipeline, FileShare, LaudoExtractionService, MrlReportOrchestrator,
};
use clink_reports::telemetry::{HTTP_REQUEST_DURATION, HTTP_REQUESTS_TOTAL, init_telemetry};
use clink_reports::{AppState, router};

#[derive(Clone)]
struct HttpMakeSpan;

impl<B> MakeSpan<B> for HttpMakeSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let method = request.method().as_str();
        let path = request.uri().path();

        tracing::info_span!(
            "HTTP request",
            otel.name = %format!("{} {}", method, path),
            http.method = %method,
            http.route = %path,
            http.target = %request.uri(),
            http.scheme = "http",
            http.flavor = ?request.version(),
            http.user_agent = request.headers()
                .get("user-agent")
                .and_then(|v| v.to_str().ok())
                .unwrap_or(""),
            http.response.status_code = tracing::field::Empty,
            otel.status_code = tracing::field::Empty,
        )
    }
}

#[derive(Clone)]
struct HttpOnResponse;

impl<B> OnResponse<B> for HttpOnResponse {
    fn on_response(self, response: &Response<B>, latency: Duration, span: &Span) {
        let status = response.status().as_u16();

        span.record("http.response.status_code", status as i64);

        if status >= 500 {
            span.record("otel.status_code", "ERROR");
        } else {
            span.record("otel.status_code", "OK");
        }

        let latency_ms = latency.as_secs_f64() * 1000.0;
        let status_class = format!("{}xx", status / 100);

        HTTP_REQUESTS_TOTAL.add(
            1,
            &[
                KeyValue::new("http.status_code", status.to_string()),
                KeyValue::new("http.status_class", status_class.clone()),
            ],
        );

        HTTP_REQUEST_DURATION.record(
            latency_ms,
            &[
                KeyValue::new("http.status_code", status.to_string()),
                KeyValue::new("http.status_class", status_class),
            ],
        );

        tracing::info!(
            http.response.status_code = status,
            latency_ms = latency_ms,
            "finished processing request"
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    let telemetry_guard = init_telemetry(&config)?;

    tracing::info!(
        port = config.port,
        environment = %config.environment,
        mrl_prod_mode = config.mrl.prod_mode,
        "Starting clink-reports"
    );

    let pool = db::create_pool(&config.database_url).await?;
    let gateway: Arc<dyn LegacyDataGateway> = Arc::new(PgLegacyGateway::new(pool));

    let staging = config.temp_root.join("bundles");
    tokio::fs::create_dir_all(&staging).await?;
    let packer = ArchivePacker::new(staging);

    let mrl_service = Arc::new(HttpMrlService::new(config.mrl.clone())?);
    let renderer = Arc::new(HttpReportRenderer::new(&config.english));

    tracing::info!(
        mrl = ?config.mrl,
        render_url = %config.english.render_url,
        share_root = %config.english.share_root.display(),
        temp_root = %config.temp_root.display(),
        "Clients initialized"
    );

    let state = AppState {
        laudo_service: Arc::new(LaudoExtractionService::new(
            gateway.clone(),
            packer.clone(),
        )),
        english_pipeline: Arc::new(EnglishLaudoPipeline::new(
            gateway.clone(),
            renderer,
            FileShare::new(
                &config.english.share_root,
                config.english.share_subdirs.clone(),
            ),
            packer,
        )),
        mrl_orchestrator: Arc::new(MrlReportOrchestrator::new(
            gateway.clone(),
            mrl_service,
            config.mrl.clone(),
            &config.temp_root,
        )),
        gateway,
        config: config.clone(),
    };

    let app = router(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(HttpMakeSpan)
                .on_response(HttpOnResponse),
        )
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(600),
        ))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(%addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    telemetry_guard.shutdown();

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
