//! Request/response endpoints: session start/end, audio chunks, health.

use axum::{
    body::Bytes,
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::detector::SessionOptions;
use crate::error::WakeError;
use crate::scan::{handle_chunk, DetectionResult};
use crate::session::SessionInfo;

const START_NOTE: &str = "Send 16 kHz, 16-bit PCM (LE), mono frames to /audio?sessionId=<id>";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionQuery {
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    #[serde(flatten)]
    pub session: SessionInfo,
    pub note: &'static str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EndRequest {
    session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EndResponse {
    pub ended: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub sample_rate: u32,
    pub sessions: usize,
    pub backend: &'static str,
    pub uptime_secs: u64,
    pub version: &'static str,
}

/// Start a session. The body is optional; when present it may override the
/// server's keywords and sensitivities for this session only.
#[tracing::instrument(name = "http.session.start", skip(state, body), fields(session.id = tracing::field::Empty))]
pub async fn start_session(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<StartResponse>, WakeError> {
    let options = parse_options(&body)?;
    let session = state.registry.start_session(options.as_ref()).await?;
    tracing::Span::current().record("session.id", session.session_id.as_str());

    Ok(Json(StartResponse {
        session,
        note: START_NOTE,
    }))
}

fn parse_options(body: &[u8]) -> Result<Option<SessionOptions>, WakeError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice::<Option<SessionOptions>>(body)
        .map_err(|e| WakeError::Configuration(format!("invalid session options: {}", e)))
}

/// End a session. The id comes from the JSON body or the query string.
#[tracing::instrument(name = "http.session.end", skip(state, body))]
pub async fn end_session(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
    body: Bytes,
) -> Result<Json<EndResponse>, WakeError> {
    // A body that is not JSON is treated like an empty one.
    let from_body = serde_json::from_slice::<EndRequest>(&body)
        .ok()
        .and_then(|request| request.session_id);

    let session_id = from_body
        .or(query.session_id)
        .filter(|id| !id.is_empty())
        .ok_or(WakeError::MissingParameter("sessionId"))?;

    let ended = state.registry.end_session(&session_id).await;
    Ok(Json(EndResponse { ended }))
}

/// Feed one chunk of raw PCM16LE to a session and report the first match.
#[tracing::instrument(name = "http.audio", skip(state, body), fields(session.id = tracing::field::Empty, chunk.bytes = body.len()))]
pub async fn audio(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
    body: Bytes,
) -> Result<Json<DetectionResult>, WakeError> {
    let session_id = query
        .session_id
        .filter(|id| !id.is_empty())
        .ok_or(WakeError::MissingParameter("sessionId"))?;
    tracing::Span::current().record("session.id", session_id.as_str());

    let result = state
        .registry
        .with_session(&session_id, |session| handle_chunk(session, &body))
        .await??;

    Ok(Json(result))
}

#[tracing::instrument(name = "http.health", skip(state))]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: if state.registry.is_closed() {
            "shutting_down"
        } else {
            "healthy"
        },
        sample_rate: crate::SAMPLE_RATE,
        sessions: state.registry.len(),
        backend: state.registry.backend(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_options_empty_body() {
        assert!(parse_options(b"").unwrap().is_none());
        assert!(parse_options(b"  \n").unwrap().is_none());
        assert!(parse_options(b"null").unwrap().is_none());
    }

    #[test]
    fn test_parse_options_overrides() {
        let options = parse_options(br#"{"keywords": ["Jarvis"], "sensitivities": [0.3]}"#)
            .unwrap()
            .unwrap();
        assert_eq!(options.keywords, Some(vec!["Jarvis".to_string()]));
        assert_eq!(options.sensitivities, Some(vec![0.3]));
    }

    #[test]
    fn test_parse_options_rejects_garbage() {
        assert!(matches!(
            parse_options(b"{not json"),
            Err(WakeError::Configuration(_))
        ));
        assert!(matches!(
            parse_options(br#"{"keyword": "typo"}"#),
            Err(WakeError::Configuration(_))
        ));
    }
}
