//! Reads an aggregator config file from disk (spec §6, ambient file I/O).

use aggregator_core::AggregatorConfig;

use crate::error::ApiError;

/// JSON by default; `.yaml`/`.yml` extensions select a YAML parse.
pub fn load(path: &std::path::Path) -> Result<AggregatorConfig, ApiError> {
    let text = std::fs::read_to_string(path).map_err(|e| ApiError::ConfigRead(e.to_string()))?;
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    aggregator_core::config::load_str(&text, is_yaml).map_err(ApiError::ConfigParse)
}
