//! Config file discovery, loading, and environment variable overlay.

use crate::detector::{parse_list, parse_sensitivities};
use crate::infra::{BindConfig, PathsConfig, SessionsConfig, TelemetryConfig};
use crate::{ConfigError, DetectorSettings, InfraConfig, WakeConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
/// Returns paths in load order (system, user, local/cli).
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/wakeword/config.toml");
    if system.exists() {
        files.push(system);
    }

    // User config (XDG_CONFIG_HOME or ~/.config)
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("wakeword/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    // CLI override takes precedence over local
    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("wakeword.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Load config from a TOML file.
pub fn load_from_file(path: &Path) -> Result<WakeConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_toml(&contents, path)
}

/// Parse config from TOML string.
fn parse_toml(contents: &str, path: &Path) -> Result<WakeConfig, ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut infra = InfraConfig::default();

    if let Some(paths) = table.get("paths").and_then(|v| v.as_table()) {
        if let Some(v) = paths.get("public_dir").and_then(|v| v.as_str()) {
            infra.paths.public_dir = expand_path(v);
        }
    }

    if let Some(bind) = table.get("bind").and_then(|v| v.as_table()) {
        if let Some(v) = bind.get("host").and_then(|v| v.as_str()) {
            infra.bind.host = v.to_string();
        }
        if let Some(v) = bind.get("port").and_then(|v| v.as_integer()) {
            infra.bind.port = u16::try_from(v).map_err(|_| ConfigError::Parse {
                path: path.to_path_buf(),
                message: format!("bind.port {} is out of range", v),
            })?;
        }
    }

    if let Some(telemetry) = table.get("telemetry").and_then(|v| v.as_table()) {
        if let Some(v) = telemetry.get("otlp_endpoint").and_then(|v| v.as_str()) {
            infra.telemetry.otlp_endpoint = Some(v.to_string());
        }
        if let Some(v) = telemetry.get("log_level").and_then(|v| v.as_str()) {
            infra.telemetry.log_level = v.to_string();
        }
    }

    if let Some(sessions) = table.get("sessions").and_then(|v| v.as_table()) {
        if let Some(v) = sessions.get("idle_timeout_secs").and_then(|v| v.as_integer()) {
            infra.sessions.idle_timeout_secs = u64::try_from(v).map_err(|_| ConfigError::Parse {
                path: path.to_path_buf(),
                message: format!("sessions.idle_timeout_secs {} must not be negative", v),
            })?;
        }
    }

    let mut detector = DetectorSettings::default();

    if let Some(section) = table.get("detector").and_then(|v| v.as_table()) {
        if let Some(v) = section.get("access_key").and_then(|v| v.as_str()) {
            detector.access_key = Some(v.to_string());
        }
        if let Some(list) = section.get("keywords").and_then(|v| v.as_array()) {
            detector.keywords = list
                .iter()
                .filter_map(|v| v.as_str())
                .map(str::to_string)
                .collect();
        }
        if let Some(list) = section.get("keyword_paths").and_then(|v| v.as_array()) {
            detector.keyword_paths = list
                .iter()
                .filter_map(|v| v.as_str())
                .map(expand_path)
                .collect();
        }
        if let Some(list) = section.get("sensitivities").and_then(|v| v.as_array()) {
            detector.sensitivities = list
                .iter()
                .map(|v| {
                    v.as_float()
                        .or_else(|| v.as_integer().map(|i| i as f64))
                        .map(|f| (f as f32).clamp(0.0, 1.0))
                        .ok_or_else(|| ConfigError::Parse {
                            path: path.to_path_buf(),
                            message: format!("detector.sensitivities entry {} is not a number", v),
                        })
                })
                .collect::<Result<_, _>>()?;
        }
    }

    Ok(WakeConfig { infra, detector })
}

/// Merge two configs, with `overlay` taking precedence.
///
/// Scalar fields win when they differ from the compiled default; list fields
/// win when non-empty.
pub fn merge_configs(base: WakeConfig, overlay: WakeConfig) -> WakeConfig {
    let default_bind = BindConfig::default();
    let default_paths = PathsConfig::default();
    let default_telemetry = TelemetryConfig::default();

    WakeConfig {
        infra: InfraConfig {
            paths: PathsConfig {
                public_dir: if overlay.infra.paths.public_dir != default_paths.public_dir {
                    overlay.infra.paths.public_dir
                } else {
                    base.infra.paths.public_dir
                },
            },
            bind: BindConfig {
                host: if overlay.infra.bind.host != default_bind.host {
                    overlay.infra.bind.host
                } else {
                    base.infra.bind.host
                },
                port: if overlay.infra.bind.port != default_bind.port {
                    overlay.infra.bind.port
                } else {
                    base.infra.bind.port
                },
            },
            telemetry: TelemetryConfig {
                otlp_endpoint: overlay
                    .infra
                    .telemetry
                    .otlp_endpoint
                    .or(base.infra.telemetry.otlp_endpoint),
                log_level: if overlay.infra.telemetry.log_level != default_telemetry.log_level {
                    overlay.infra.telemetry.log_level
                } else {
                    base.infra.telemetry.log_level
                },
            },
            sessions: SessionsConfig {
                idle_timeout_secs: if overlay.infra.sessions.idle_timeout_secs != 0 {
                    overlay.infra.sessions.idle_timeout_secs
                } else {
                    base.infra.sessions.idle_timeout_secs
                },
            },
        },
        detector: DetectorSettings {
            access_key: overlay.detector.access_key.or(base.detector.access_key),
            keywords: non_empty_or(overlay.detector.keywords, base.detector.keywords),
            keyword_paths: non_empty_or(
                overlay.detector.keyword_paths,
                base.detector.keyword_paths,
            ),
            sensitivities: non_empty_or(
                overlay.detector.sensitivities,
                base.detector.sensitivities,
            ),
        },
    }
}

fn non_empty_or<T>(overlay: Vec<T>, base: Vec<T>) -> Vec<T> {
    if overlay.is_empty() {
        base
    } else {
        overlay
    }
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(
    config: &mut WakeConfig,
    sources: &mut ConfigSources,
) -> Result<(), ConfigError> {
    apply_overrides_from(config, sources, |key| env::var(key).ok())
}

/// Apply overrides from an arbitrary variable lookup.
pub fn apply_overrides_from<F>(
    config: &mut WakeConfig,
    sources: &mut ConfigSources,
    lookup: F,
) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    // Detector
    if let Some(v) = lookup("PICOVOICE_ACCESS_KEY").filter(|v| !v.trim().is_empty()) {
        config.detector.access_key = Some(v.trim().to_string());
        sources.env_overrides.push("PICOVOICE_ACCESS_KEY".to_string());
    }
    if let Some(v) = lookup("KEYWORD_PATHS") {
        let paths = parse_list(&v);
        if !paths.is_empty() {
            config.detector.keyword_paths = paths.iter().map(|p| expand_path(p)).collect();
            sources.env_overrides.push("KEYWORD_PATHS".to_string());
        }
    }
    if let Some(v) = lookup("KEYWORDS") {
        let keywords = parse_list(&v);
        if !keywords.is_empty() {
            config.detector.keywords = keywords;
            sources.env_overrides.push("KEYWORDS".to_string());
        }
    }
    if let Some(v) = lookup("SENSITIVITIES") {
        let sensitivities = parse_sensitivities("SENSITIVITIES", &v)?;
        if !sensitivities.is_empty() {
            config.detector.sensitivities = sensitivities;
            sources.env_overrides.push("SENSITIVITIES".to_string());
        }
    }

    // Bind address
    if let Some(v) = lookup("PORT") {
        config.infra.bind.port = v.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: "PORT".to_string(),
            message: format!("'{}' is not a valid port", v),
        })?;
        sources.env_overrides.push("PORT".to_string());
    }
    if let Some(v) = lookup("WAKEWORD_HOST") {
        config.infra.bind.host = v;
        sources.env_overrides.push("WAKEWORD_HOST".to_string());
    }

    if let Some(v) = lookup("WAKEWORD_PUBLIC_DIR") {
        config.infra.paths.public_dir = expand_path(&v);
        sources.env_overrides.push("WAKEWORD_PUBLIC_DIR".to_string());
    }

    if let Some(v) = lookup("WAKEWORD_IDLE_TIMEOUT_SECS") {
        config.infra.sessions.idle_timeout_secs =
            v.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "WAKEWORD_IDLE_TIMEOUT_SECS".to_string(),
                message: format!("'{}' is not a number of seconds", v),
            })?;
        sources.env_overrides.push("WAKEWORD_IDLE_TIMEOUT_SECS".to_string());
    }

    // Telemetry
    if let Some(v) = lookup("WAKEWORD_OTLP_ENDPOINT") {
        config.infra.telemetry.otlp_endpoint = Some(v);
        sources.env_overrides.push("WAKEWORD_OTLP_ENDPOINT".to_string());
    }
    // Also support standard OTEL env var
    if let Some(v) = lookup("OTEL_EXPORTER_OTLP_ENDPOINT") {
        config.infra.telemetry.otlp_endpoint = Some(v);
        sources.env_overrides.push("OTEL_EXPORTER_OTLP_ENDPOINT".to_string());
    }
    if let Some(v) = lookup("WAKEWORD_LOG_LEVEL") {
        config.infra.telemetry.log_level = v;
        sources.env_overrides.push("WAKEWORD_LOG_LEVEL".to_string());
    }
    if let Some(v) = lookup("RUST_LOG") {
        config.infra.telemetry.log_level = v;
        sources.env_overrides.push("RUST_LOG".to_string());
    }

    Ok(())
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            home.join(stripped)
        } else {
            PathBuf::from(path)
        }
    } else if let Some(stripped) = path.strip_prefix('$') {
        // Handle $VAR/rest/of/path
        if let Some(slash_pos) = stripped.find('/') {
            let var_name = &stripped[..slash_pos];
            if let Ok(var_value) = env::var(var_name) {
                PathBuf::from(var_value).join(&stripped[slash_pos + 1..])
            } else {
                PathBuf::from(path)
            }
        } else {
            env::var(stripped)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(path))
        }
    } else {
        PathBuf::from(path)
    }
}
