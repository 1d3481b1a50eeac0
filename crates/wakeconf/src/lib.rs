//! Configuration loading for the wakeword service.
//!
//! Configuration is split into two parts:
//!
//! - **Infrastructure** (`InfraConfig`): bind address, static file directory,
//!   telemetry. Fixed for the life of the process.
//!
//! - **Detector** (`DetectorSettings`): access credential, keyword source and
//!   sensitivities used to build a detector for every new session.
//!
//! # Usage
//!
//! ```rust,no_run
//! use wakeconf::WakeConfig;
//!
//! let config = WakeConfig::load().expect("Failed to load config");
//!
//! println!("HTTP port: {}", config.infra.bind.port);
//! println!("Keywords: {:?}", config.detector.keywords);
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/wakeword/config.toml` (system)
//! 2. `~/.config/wakeword/config.toml` (user)
//! 3. `./wakeword.toml` (local override)
//! 4. Environment variables (`PICOVOICE_ACCESS_KEY`, `KEYWORDS`, `PORT`, `WAKEWORD_*`)
//!
//! # Example Config
//!
//! ```toml
//! [bind]
//! host = "0.0.0.0"
//! port = 5000
//!
//! [paths]
//! public_dir = "./public"
//!
//! [telemetry]
//! otlp_endpoint = "127.0.0.1:4317"
//! log_level = "info"
//!
//! [sessions]
//! idle_timeout_secs = 600
//!
//! [detector]
//! access_key = "..."
//! keywords = ["bumblebee", "jarvis"]
//! sensitivities = [0.6, 0.5]
//! ```

pub mod detector;
pub mod infra;
pub mod loader;

pub use detector::{parse_list, parse_sensitivities, DetectorSettings, DEFAULT_KEYWORD, DEFAULT_SENSITIVITY};
pub use infra::{BindConfig, InfraConfig, PathsConfig, SessionsConfig, TelemetryConfig};
pub use loader::{discover_config_files_with_override, ConfigSources};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Complete service configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WakeConfig {
    /// Infrastructure - cannot change at runtime.
    #[serde(flatten)]
    pub infra: InfraConfig,

    /// Detector settings applied to every new session.
    #[serde(default)]
    pub detector: DetectorSettings,
}

impl WakeConfig {
    /// Load configuration from all sources.
    ///
    /// Load order (later wins):
    /// 1. Compiled defaults
    /// 2. `/etc/wakeword/config.toml`
    /// 3. `~/.config/wakeword/config.toml`
    /// 4. `./wakeword.toml`
    /// 5. Environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration from a specific file path, then apply env overrides.
    ///
    /// If `config_path` is provided, it takes precedence over the local
    /// `./wakeword.toml` override. System and user configs still load first.
    pub fn load_from(config_path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&std::path::Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = WakeConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            let file_config = loader::load_from_file(&path)?;
            config = loader::merge_configs(config, file_config);
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources)?;

        Ok((config, sources))
    }

    /// Serialize config to TOML string. The access key is redacted.
    pub fn to_toml(&self) -> String {
        let mut output = String::new();

        output.push_str("# wakeword configuration\n\n");

        output.push_str("[bind]\n");
        output.push_str(&format!("host = \"{}\"\n", self.infra.bind.host));
        output.push_str(&format!("port = {}\n", self.infra.bind.port));

        output.push_str("\n[paths]\n");
        output.push_str(&format!(
            "public_dir = \"{}\"\n",
            self.infra.paths.public_dir.display()
        ));

        output.push_str("\n[telemetry]\n");
        if let Some(endpoint) = &self.infra.telemetry.otlp_endpoint {
            output.push_str(&format!("otlp_endpoint = \"{}\"\n", endpoint));
        }
        output.push_str(&format!(
            "log_level = \"{}\"\n",
            self.infra.telemetry.log_level
        ));

        output.push_str("\n[sessions]\n");
        output.push_str(&format!(
            "idle_timeout_secs = {}\n",
            self.infra.sessions.idle_timeout_secs
        ));

        output.push_str("\n[detector]\n");
        if self.detector.access_key.is_some() {
            output.push_str("access_key = \"<redacted>\"\n");
        }
        output.push_str(&format!(
            "keywords = [{}]\n",
            quoted_list(self.detector.keywords.iter().map(String::as_str))
        ));
        output.push_str(&format!(
            "keyword_paths = [{}]\n",
            quoted_list(
                self.detector
                    .keyword_paths
                    .iter()
                    .map(|p| p.to_str().unwrap_or_default())
            )
        ));
        let sensitivities: Vec<String> = self
            .detector
            .sensitivities
            .iter()
            .map(|s| s.to_string())
            .collect();
        output.push_str(&format!("sensitivities = [{}]\n", sensitivities.join(", ")));

        output
    }
}

fn quoted_list<'a>(items: impl Iterator<Item = &'a str>) -> String {
    items
        .map(|item| format!("\"{}\"", item))
        .collect::<Vec<_>>()
        .join(", ")
}
