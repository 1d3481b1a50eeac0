//! HTTP and WebSocket surface.
//!
//! Polling endpoints live in [`polling`], the streaming endpoint in
//! [`stream`]. Both go through the same [`SessionRegistry`].

pub mod polling;
pub mod stream;

use axum::{
    extract::State,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::registry::SessionRegistry;

/// Shared state for web handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub start_time: Instant,
    /// Cancelled on server shutdown; open WebSocket connections close on it.
    pub shutdown: CancellationToken,
    /// Static files for the browser capture page.
    pub public_dir: Option<PathBuf>,
}

impl AppState {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            registry,
            start_time: Instant::now(),
            shutdown: CancellationToken::new(),
            public_dir: None,
        }
    }

    pub fn with_public_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.public_dir = Some(dir.into());
        self
    }

    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }
}

pub fn router(state: AppState) -> Router {
    let public_dir = state.public_dir.clone();

    let app = Router::new()
        .route("/session/start", post(polling::start_session))
        .route("/session/end", post(polling::end_session))
        .route("/audio", post(polling::audio))
        .route("/health", get(polling::health))
        .route("/stream", get(stream::stream_ws))
        .route("/", get(serve_index))
        .with_state(state);

    let app = match public_dir {
        Some(dir) => app.fallback_service(ServeDir::new(dir)),
        None => app,
    };

    app.layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve `index.html` from the public directory, or a short usage page.
async fn serve_index(State(state): State<AppState>) -> Response {
    if let Some(dir) = &state.public_dir {
        match tokio::fs::read_to_string(dir.join("index.html")).await {
            Ok(page) => return Html(page).into_response(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(error = %e, dir = %dir.display(), "Failed to read index.html"),
        }
    }
    Html(USAGE_HTML).into_response()
}

const USAGE_HTML: &str = "<h3>Wake-word server running.</h3>\
<p>Use POST /session/start then POST raw PCM16LE to /audio?sessionId=..., \
or stream binary frames over the WebSocket at /stream.</p>";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_config, ScriptedFactory};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn state() -> AppState {
        let factory = Arc::new(ScriptedFactory::new(4));
        AppState::new(Arc::new(SessionRegistry::new(factory, test_config())))
    }

    async fn get_body(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_index_without_public_dir() {
        let (status, body) = get_body(router(state()), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("/session/start"));
    }

    #[tokio::test]
    async fn test_index_and_static_files_from_public_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>capture</h1>").unwrap();
        std::fs::write(dir.path().join("app.js"), "console.log(1)").unwrap();

        let app = router(state().with_public_dir(dir.path()));

        let (status, body) = get_body(app.clone(), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "<h1>capture</h1>");

        let (status, body) = get_body(app, "/app.js").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "console.log(1)");
    }

    #[tokio::test]
    async fn test_public_dir_without_index_falls_back_to_usage() {
        let dir = TempDir::new().unwrap();
        let (status, body) = get_body(router(state().with_public_dir(dir.path())), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Wake-word server running"));
    }
}
