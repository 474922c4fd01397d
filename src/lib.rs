pub mod clients;
pub mod config;
pub mod db;
pub mod error;
pub mod pipeline;
pub mod routes;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use config::Config;
use db::LegacyDataGateway;
use pipeline::{EnglishLaudoPipeline, LaudoExtractionService, MrlReportOrchestrator};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub laudo_service: Arc<LaudoExtractionService>,
    pub english_pipeline: Arc<EnglishLaudoPipeline>,
    pub mrl_orchestrator: Arc<MrlReportOrchestrator>,
    pub gateway: Arc<dyn LegacyDataGateway>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(routes::health::health))
        .route("/api/laudos", post(routes::laudos::extract_laudos))
        .route("/api/mrl/reports", post(routes::mrl::generate_report))
        .route("/api/mrl/options", get(routes::mrl::options))
        .with_state(state)
}
