//! Infrastructure configuration - things that cannot change at runtime.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Filesystem paths used by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory of static files served at `/` (browser capture UI).
    /// Default: ./public
    #[serde(default = "PathsConfig::default_public_dir")]
    pub public_dir: PathBuf,
}

impl PathsConfig {
    fn default_public_dir() -> PathBuf {
        PathBuf::from("public")
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            public_dir: Self::default_public_dir(),
        }
    }
}

/// Network bind address for the HTTP/WebSocket listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindConfig {
    /// Interface to bind.
    /// Default: 0.0.0.0
    #[serde(default = "BindConfig::default_host")]
    pub host: String,

    /// HTTP port for session, audio, stream and health endpoints.
    /// Default: 5000
    #[serde(default = "BindConfig::default_port")]
    pub port: u16,
}

impl BindConfig {
    fn default_host() -> String {
        "0.0.0.0".to_string()
    }

    fn default_port() -> u16 {
        5000
    }

    /// `host:port` string suitable for `TcpListener::bind`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
        }
    }
}

/// Telemetry and observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// OTLP gRPC endpoint for OpenTelemetry. Plain console logging when unset.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,

    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            log_level: Self::default_log_level(),
        }
    }
}

/// Session lifecycle settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// End polling sessions idle for this many seconds. 0 disables expiry.
    /// Default: 0
    #[serde(default)]
    pub idle_timeout_secs: u64,
}

/// Infrastructure configuration - cannot change at runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InfraConfig {
    /// Filesystem paths.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Listener address.
    #[serde(default)]
    pub bind: BindConfig,

    /// Telemetry settings.
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Session lifecycle.
    #[serde(default)]
    pub sessions: SessionsConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_defaults() {
        let bind = BindConfig::default();
        assert_eq!(bind.host, "0.0.0.0");
        assert_eq!(bind.port, 5000);
        assert_eq!(bind.addr(), "0.0.0.0:5000");
    }

    #[test]
    fn test_telemetry_defaults() {
        let telemetry = TelemetryConfig::default();
        assert!(telemetry.otlp_endpoint.is_none());
        assert_eq!(telemetry.log_level, "info");
    }

    #[test]
    fn test_sessions_defaults() {
        assert_eq!(SessionsConfig::default().idle_timeout_secs, 0);
    }

    #[test]
    fn test_paths_defaults() {
        assert_eq!(PathsConfig::default().public_dir, PathBuf::from("public"));
    }
}
