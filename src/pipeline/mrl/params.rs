use serde::Serialize;

use crate::db::LegacyDataGateway;
use crate::error::AppError;

pub const LANGUAGE_SPANISH: &str = "0";
pub const LANGUAGE_ENGLISH: &str = "1";

/// Caller input of one MRL run.
#[derive(Debug, Clone, Default)]
pub struct MrlRequest {
    pub market_ids: Vec<String>,
    pub retail_ids: Vec<String>,
    pub language: String,
    pub sample_ids: Vec<String>,
}

impl MrlRequest {
    /// Trimmed sample ids with blanks removed, in request order.
    pub fn normalized_sample_ids(&self) -> Vec<String> {
        self.sample_ids
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn validate(&self) -> Result<Vec<String>, AppError> {
        if self.language != LANGUAGE_SPANISH && self.language != LANGUAGE_ENGLISH {
            return Err(AppError::InvalidInput(format!(
                "language must be \"{LANGUAGE_SPANISH}\" or \"{LANGUAGE_ENGLISH}\""
            )));
        }

        let ids = self.normalized_sample_ids();
        if ids.is_empty() {
            return Err(AppError::InvalidInput(
                "at least one sample id is required".to_string(),
            ));
        }
        Ok(ids)
    }

    pub fn joined_markets(&self) -> String {
        join_ids(&self.market_ids)
    }

    pub fn joined_retailers(&self) -> String {
        join_ids(&self.retail_ids)
    }
}

fn join_ids(ids: &[String]) -> String {
    ids.iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MrlReportParameters {
    pub markets: String,
    pub retailers: String,
    pub language: String,
    pub lab_code: String,
}

/// Uses the caller's markets when given; otherwise falls back to the
/// defaults registered for the sample. Fallback lookup errors are logged
/// and treated as "no defaults".
#[tracing::instrument(name = "pipeline_stage mrl_parameters", skip(gateway, request))]
pub async fn resolve_parameters(
    gateway: &dyn LegacyDataGateway,
    sample_id: &str,
    lab_code: &str,
    request: &MrlRequest,
) -> Result<MrlReportParameters, AppError> {
    let mut markets = request.joined_markets();
    let mut retailers = request.joined_retailers();
    let mut language = request.language.clone();

    if markets.is_empty() {
        tracing::info!("No markets requested, looking up sample defaults");
        match gateway.mrl_defaults(sample_id).await {
            Ok(Some(defaults)) => {
                if let Some(m) = defaults.markets.filter(|m| !m.trim().is_empty()) {
                    markets = m.trim().to_string();
                }
                if let Some(r) = defaults.retail {
                    retailers = r.trim().to_string();
                }
                if let Some(l) = defaults.language.filter(|l| !l.trim().is_empty()) {
                    language = l.trim().to_string();
                }
            }
            Ok(None) => tracing::info!("Sample has no registered MRL defaults"),
            Err(e) => tracing::error!(error = %e, "MRL defaults lookup failed"),
        }
    }

    if markets.is_empty() {
        return Err(AppError::MissingMarkets(sample_id.to_string()));
    }

    Ok(MrlReportParameters {
        markets,
        retailers,
        language,
        lab_code: lab_code.to_string(),
    })
}
