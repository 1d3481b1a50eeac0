//! Detector settings - keyword source, sensitivities and access credential.
//!
//! These are raw settings as read from files and the environment. The server
//! turns them into a concrete detector configuration at startup.

use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Built-in keyword used when neither keywords nor keyword paths are configured.
pub const DEFAULT_KEYWORD: &str = "bumblebee";

/// Sensitivity used for keywords without an explicit value.
pub const DEFAULT_SENSITIVITY: f32 = 0.6;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectorSettings {
    /// Credential for the detector backend. Required to serve.
    #[serde(default)]
    pub access_key: Option<String>,

    /// Built-in keyword names.
    #[serde(default)]
    pub keywords: Vec<String>,

    /// External keyword model files. Take precedence over `keywords`.
    #[serde(default)]
    pub keyword_paths: Vec<PathBuf>,

    /// One sensitivity per keyword, in `[0, 1]`.
    #[serde(default)]
    pub sensitivities: Vec<f32>,
}

/// Split a comma-separated list, trimming entries and skipping blanks.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a comma-separated sensitivity list, clamping each value to `[0, 1]`.
pub fn parse_sensitivities(key: &str, raw: &str) -> Result<Vec<f32>, ConfigError> {
    parse_list(raw)
        .iter()
        .map(|item| {
            let value: f32 = item.parse().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{}' is not a number", item),
            })?;
            if value.is_nan() {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "NaN is not a valid sensitivity".to_string(),
                });
            }
            Ok(value.clamp(0.0, 1.0))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_skips_blanks() {
        assert_eq!(
            parse_list(" jarvis, ,Computer ,"),
            vec!["jarvis".to_string(), "Computer".to_string()]
        );
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn test_parse_sensitivities_clamps() {
        let parsed = parse_sensitivities("SENSITIVITIES", "0.3, 1.7, -2").unwrap();
        assert_eq!(parsed, vec![0.3, 1.0, 0.0]);
    }

    #[test]
    fn test_parse_sensitivities_rejects_garbage() {
        let err = parse_sensitivities("SENSITIVITIES", "0.5,loud").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "SENSITIVITIES"));
        assert!(err.to_string().contains("loud"));
    }
}
