//! Detector configuration.
//!
//! Built once at startup from [`wakeconf::DetectorSettings`] and optionally
//! narrowed per session by [`SessionOptions`] sent with `POST /session/start`.

use serde::Deserialize;
use std::path::PathBuf;

use crate::error::WakeError;
use wakeconf::{DetectorSettings, DEFAULT_KEYWORD, DEFAULT_SENSITIVITY};

/// Where the detector's keywords come from.
#[derive(Debug, Clone, PartialEq)]
pub enum KeywordSource {
    /// Keywords shipped with the detector backend, by name.
    Builtin(Vec<String>),
    /// External keyword model files.
    ModelPaths(Vec<PathBuf>),
}

impl KeywordSource {
    pub fn len(&self) -> usize {
        match self {
            KeywordSource::Builtin(names) => names.len(),
            KeywordSource::ModelPaths(paths) => paths.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Human-readable label per keyword, in detector index order.
    pub fn labels(&self) -> Vec<String> {
        match self {
            KeywordSource::Builtin(names) => names.clone(),
            KeywordSource::ModelPaths(paths) => paths
                .iter()
                .map(|p| {
                    p.file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_else(|| p.display().to_string())
                })
                .collect(),
        }
    }
}

/// Everything a [`super::DetectorFactory`] needs to build one detector.
#[derive(Clone, PartialEq)]
pub struct DetectorConfig {
    pub access_key: String,
    pub keywords: KeywordSource,
    /// Raw per-keyword sensitivities; see [`DetectorConfig::resolved_sensitivities`].
    pub sensitivities: Vec<f32>,
}

impl std::fmt::Debug for DetectorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectorConfig")
            .field("access_key", &"<redacted>")
            .field("keywords", &self.keywords)
            .field("sensitivities", &self.sensitivities)
            .finish()
    }
}

/// Per-session overrides accepted by `POST /session/start`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SessionOptions {
    /// Built-in keyword names; replaces the configured keyword source.
    pub keywords: Option<Vec<String>>,
    pub sensitivities: Option<Vec<f32>>,
}

impl DetectorConfig {
    /// Build from loaded settings.
    ///
    /// Keyword paths take precedence over keyword names; with neither, the
    /// single built-in [`DEFAULT_KEYWORD`] is used. A missing access key is a
    /// configuration error.
    pub fn from_settings(settings: &DetectorSettings) -> Result<Self, WakeError> {
        let access_key = settings
            .access_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                WakeError::Configuration(
                    "detector access key is not set (PICOVOICE_ACCESS_KEY or [detector].access_key)"
                        .to_string(),
                )
            })?
            .to_string();

        let keywords = if !settings.keyword_paths.is_empty() {
            KeywordSource::ModelPaths(settings.keyword_paths.clone())
        } else if !settings.keywords.is_empty() {
            KeywordSource::Builtin(normalize_names(&settings.keywords))
        } else {
            KeywordSource::Builtin(vec![DEFAULT_KEYWORD.to_string()])
        };

        let config = Self {
            access_key,
            keywords,
            sensitivities: settings.sensitivities.clone(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Apply per-session options on top of this configuration.
    pub fn with_options(&self, options: &SessionOptions) -> Result<Self, WakeError> {
        let mut config = self.clone();
        if let Some(names) = &options.keywords {
            config.keywords = KeywordSource::Builtin(normalize_names(names));
        }
        if let Some(sensitivities) = &options.sensitivities {
            config.sensitivities = sensitivities.clone();
        }
        config.validate()?;
        Ok(config)
    }

    /// Reject empty keyword sets, blank keyword names and non-finite sensitivities.
    pub fn validate(&self) -> Result<(), WakeError> {
        if self.keywords.is_empty() {
            return Err(WakeError::Configuration(
                "at least one keyword is required".to_string(),
            ));
        }
        if let KeywordSource::Builtin(names) = &self.keywords {
            if names.iter().any(|n| n.trim().is_empty()) {
                return Err(WakeError::Configuration(
                    "keyword names must not be blank".to_string(),
                ));
            }
        }
        if let Some(bad) = self.sensitivities.iter().find(|s| !s.is_finite()) {
            return Err(WakeError::Configuration(format!(
                "sensitivity {} is not a finite number",
                bad
            )));
        }
        Ok(())
    }

    /// One sensitivity per keyword: clamped to `[0, 1]`, padded with
    /// [`DEFAULT_SENSITIVITY`], truncated to the keyword count.
    pub fn resolved_sensitivities(&self) -> Vec<f32> {
        let count = self.keywords.len();
        self.sensitivities
            .iter()
            .map(|s| s.clamp(0.0, 1.0))
            .chain(std::iter::repeat(DEFAULT_SENSITIVITY))
            .take(count)
            .collect()
    }
}

fn normalize_names(names: &[String]) -> Vec<String> {
    names.iter().map(|n| n.trim().to_lowercase()).collect()
}
