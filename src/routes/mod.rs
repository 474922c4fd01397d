pub mod health;
pub mod laudos;
pub mod mrl;

use std::collections::HashSet;

use crate::error::AppError;

/// Trims ids, drops blanks and rejects a request naming the same sample
/// twice.
pub(crate) fn distinct_sample_ids(raw: &[String]) -> Result<Vec<String>, AppError> {
    let mut seen = HashSet::new();
    let mut ids = Vec::with_capacity(raw.len());

    for id in raw.iter().map(|id| id.trim()).filter(|id| !id.is_empty()) {
        if !seen.insert(id) {
            return Err(AppError::InvalidInput(format!(
                "sample id {id} appears more than once"
            )));
        }
        ids.push(id.to_string());
    }

    if ids.is_empty() {
        return Err(AppError::InvalidInput(
            "at least one sample id is required".to_string(),
        ));
    }
    Ok(ids)
}
