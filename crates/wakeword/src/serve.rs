//! Server wiring: registry, idle reaper, HTTP listener and graceful shutdown.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::detector::{DetectorConfig, DetectorFactory};
use crate::registry::{spawn_idle_reaper, SessionRegistry};
use crate::web::{self, AppState};

/// Longest pause between idle sweeps.
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Server configuration
pub struct ServeConfig {
    /// `host:port` to bind.
    pub addr: String,
    pub public_dir: Option<PathBuf>,
    pub detector: DetectorConfig,
    /// End sessions idle for longer than this. `None` disables expiry.
    pub idle_timeout: Option<Duration>,
}

impl ServeConfig {
    /// Build from loaded configuration. Fails if the detector settings are
    /// unusable (no access key, bad keywords).
    pub fn from_config(config: &wakeconf::WakeConfig) -> Result<Self> {
        let detector = DetectorConfig::from_settings(&config.detector)
            .context("Invalid detector configuration")?;
        let idle_timeout = match config.infra.sessions.idle_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(Self {
            addr: config.infra.bind.addr(),
            public_dir: Some(config.infra.paths.public_dir.clone()),
            detector,
            idle_timeout,
        })
    }
}

/// Interval between idle sweeps for a given timeout.
fn sweep_interval(idle_timeout: Duration) -> Duration {
    idle_timeout.min(MAX_SWEEP_INTERVAL).max(Duration::from_secs(1))
}

/// Run the wake-word server until SIGINT/SIGTERM.
pub async fn run(config: ServeConfig, factory: Arc<dyn DetectorFactory>) -> Result<()> {
    info!("Wake-word server starting");
    info!("   Backend: {}", factory.name());
    info!("   Keywords: {:?}", config.detector.keywords.labels());

    let registry = Arc::new(SessionRegistry::new(factory, config.detector));
    let cancel_token = CancellationToken::new();

    let reaper = config.idle_timeout.map(|timeout| {
        info!("   Idle session timeout: {}s", timeout.as_secs());
        spawn_idle_reaper(
            Arc::clone(&registry),
            sweep_interval(timeout),
            timeout,
            cancel_token.clone(),
        )
    });

    let mut state = AppState::new(Arc::clone(&registry)).with_shutdown(cancel_token.clone());
    if let Some(dir) = config.public_dir {
        info!("   Static files: {}", dir.display());
        state = state.with_public_dir(dir);
    }
    let app = web::router(state);

    let listener = tokio::net::TcpListener::bind(&config.addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.addr))?;

    info!("Wake-word server ready on {}", config.addr);
    info!("   Polling: POST http://{}/session/start, /audio, /session/end", config.addr);
    info!("   Streaming: ws://{}/stream", config.addr);
    info!("   Health: GET http://{}/health", config.addr);

    let shutdown = {
        let token = cancel_token.clone();
        async move {
            shutdown_signal().await;
            token.cancel();
        }
    };

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error");

    // Also reached when serving fails, so sessions are always released.
    cancel_token.cancel();
    if let Some(reaper) = reaper {
        let _ = reaper.await;
    }
    let released = registry.shutdown().await;
    info!(released, "Shutdown complete");

    served
}

async fn shutdown_signal() {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, shutting down...");
        }
        _ = terminate() => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
