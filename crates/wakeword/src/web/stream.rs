//! WebSocket streaming endpoint.
//!
//! One connection is one session. The client sends binary PCM16LE messages
//! of any size; every match is pushed back as a text event as soon as it is
//! found. The session ends when the connection does, however it ends.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::{IntoResponse, Response},
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::AppState;
use crate::error::WakeError;
use crate::registry::ScopedSession;
use crate::scan::{scan_chunk, Detection, ScanPolicy};
use crate::session::SessionInfo;

/// Server-to-client text message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StreamEvent {
    #[serde(rename_all = "camelCase")]
    Ready {
        session_id: String,
        sample_rate: u32,
        frame_length: usize,
        keywords: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    Detected { keyword_index: usize, keyword: String },
    Error { message: String },
}

impl From<&SessionInfo> for StreamEvent {
    fn from(info: &SessionInfo) -> Self {
        StreamEvent::Ready {
            session_id: info.session_id.clone(),
            sample_rate: info.sample_rate,
            frame_length: info.frame_length,
            keywords: info.keywords.clone(),
        }
    }
}

impl From<Detection> for StreamEvent {
    fn from(detection: Detection) -> Self {
        StreamEvent::Detected {
            keyword_index: detection.keyword_index,
            keyword: detection.keyword,
        }
    }
}

/// Upgrade to a WebSocket. The session is created before the upgrade so a
/// detector failure is reported as a plain HTTP error.
#[tracing::instrument(name = "http.stream", skip(state, ws))]
pub async fn stream_ws(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Result<Response, WakeError> {
    let session = ScopedSession::start(Arc::clone(&state.registry)).await?;
    let shutdown = state.shutdown.clone();

    Ok(ws
        .on_upgrade(move |socket: WebSocket| {
            let (sender, receiver) = socket.split();
            run_stream(sender, receiver, session, shutdown)
        })
        .into_response())
}

/// Drive one streaming session until the client leaves or the server stops.
pub async fn run_stream<Tx, Rx>(
    sender: Tx,
    mut receiver: Rx,
    session: ScopedSession,
    shutdown: CancellationToken,
) where
    Tx: Sink<Message> + Unpin + Send + 'static,
    Rx: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let session_id = session.id().to_string();
    let (events, writer) = spawn_writer(sender);

    let _ = events.send(StreamEvent::from(session.info()));
    tracing::info!(session_id = %session_id, "Stream connected");

    loop {
        let message = tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::debug!(session_id = %session_id, "Closing stream for shutdown");
                break;
            }
            message = receiver.next() => message,
        };

        match message {
            Some(Ok(Message::Binary(chunk))) => {
                if let Err(e) = forward_chunk(&session, &chunk, &events).await {
                    // The session was ended underneath us (idle expiry, shutdown).
                    let _ = events.send(StreamEvent::Error {
                        message: e.to_string(),
                    });
                    break;
                }
            }
            Some(Ok(Message::Close(_))) | None => break,
            // Text, ping and pong carry nothing for us.
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::debug!(session_id = %session_id, error = %e, "Stream receive failed");
                break;
            }
        }
    }

    session.end().await;
    drop(events);
    let _ = writer.await;
    tracing::info!(session_id = %session_id, "Stream closed");
}

/// Scan one binary message, queueing an event per match.
///
/// A detector failure becomes an error event and the connection carries on.
async fn forward_chunk(
    session: &ScopedSession,
    chunk: &[u8],
    events: &mpsc::UnboundedSender<StreamEvent>,
) -> Result<(), WakeError> {
    let scanned = session
        .with(|s| {
            scan_chunk(s, chunk, ScanPolicy::ReportAll, |detection| {
                let _ = events.send(StreamEvent::from(detection));
            })
        })
        .await?;

    if let Err(e) = scanned {
        tracing::warn!(session_id = %session.id(), error = %e, "Detector failed on stream chunk");
        let _ = events.send(StreamEvent::Error {
            message: e.to_string(),
        });
    }
    Ok(())
}

/// Serialize events onto the socket from a separate task so detection never
/// waits on a slow client.
fn spawn_writer<Tx>(
    mut sender: Tx,
) -> (mpsc::UnboundedSender<StreamEvent>, tokio::task::JoinHandle<()>)
where
    Tx: Sink<Message> + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<StreamEvent>();

    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize stream event");
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    (tx, writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SessionRegistry;
    use crate::test_support::{
        frame_starting_with, pcm, test_config, ScriptedDetector, ScriptedFactory, FAIL_MARKER,
    };
    use axum::body::Bytes;
    use futures::channel::mpsc as fmpsc;

    fn parse(messages: Vec<Message>) -> Vec<serde_json::Value> {
        messages
            .into_iter()
            .map(|m| match m {
                Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
                other => panic!("unexpected message {:?}", other),
            })
            .collect()
    }

    async fn run_with(
        registry: Arc<SessionRegistry>,
        incoming: Vec<Message>,
        shutdown: CancellationToken,
    ) -> Vec<serde_json::Value> {
        let session = ScopedSession::start(registry).await.unwrap();
        let (out_tx, out_rx) = fmpsc::unbounded::<Message>();
        let (in_tx, in_rx) = fmpsc::unbounded::<Result<Message, axum::Error>>();
        for message in incoming {
            in_tx.unbounded_send(Ok(message)).unwrap();
        }
        drop(in_tx);

        run_stream(out_tx, in_rx, session, shutdown).await;
        parse(out_rx.collect().await)
    }

    #[test]
    fn test_event_shapes() {
        let ready = serde_json::to_value(StreamEvent::Ready {
            session_id: "abc".into(),
            sample_rate: 16_000,
            frame_length: 512,
            keywords: vec!["jarvis".into()],
        })
        .unwrap();
        assert_eq!(
            ready,
            serde_json::json!({
                "type": "ready",
                "sessionId": "abc",
                "sampleRate": 16000,
                "frameLength": 512,
                "keywords": ["jarvis"],
            })
        );

        let detected = serde_json::to_value(StreamEvent::Detected {
            keyword_index: 1,
            keyword: "jarvis".into(),
        })
        .unwrap();
        assert_eq!(
            detected,
            serde_json::json!({"type": "detected", "keywordIndex": 1, "keyword": "jarvis"})
        );
    }

    #[tokio::test]
    async fn test_reports_every_match_in_order() {
        let factory = Arc::new(ScriptedFactory::new(4));
        let registry = Arc::new(SessionRegistry::new(factory.clone(), test_config()));

        let mut chunk = pcm(&frame_starting_with(ScriptedDetector::marker(1), 4));
        chunk.extend(pcm(&frame_starting_with(0, 4)));
        chunk.extend(pcm(&frame_starting_with(ScriptedDetector::marker(0), 4)));

        // Split mid-frame across two messages.
        let incoming = vec![
            Message::Binary(Bytes::copy_from_slice(&chunk[..5])),
            Message::Text("ignored".into()),
            Message::Binary(Bytes::copy_from_slice(&chunk[5..])),
            Message::Close(None),
        ];

        let events = run_with(Arc::clone(&registry), incoming, CancellationToken::new()).await;

        assert_eq!(events.len(), 3);
        assert_eq!(events[0]["type"], "ready");
        assert_eq!(events[0]["frameLength"], 4);
        assert_eq!(events[1]["type"], "detected");
        assert_eq!(events[1]["keywordIndex"], 1);
        assert_eq!(events[1]["keyword"], "jarvis");
        assert_eq!(events[2]["keywordIndex"], 0);
        assert_eq!(events[2]["keyword"], "bumblebee");

        assert_eq!(factory.probe.frame_count(), 3);
        assert_eq!(factory.probe.releases(), 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_detector_failure_keeps_connection() {
        let factory = Arc::new(ScriptedFactory::new(2));
        let registry = Arc::new(SessionRegistry::new(factory.clone(), test_config()));

        let incoming = vec![
            Message::Binary(Bytes::from(pcm(&[FAIL_MARKER, 0]))),
            Message::Binary(Bytes::from(pcm(&[ScriptedDetector::marker(0), 0]))),
        ];

        let events = run_with(Arc::clone(&registry), incoming, CancellationToken::new()).await;

        let kinds: Vec<_> = events.iter().map(|e| e["type"].as_str().unwrap()).collect();
        assert_eq!(kinds, vec!["ready", "error", "detected"]);
        assert_eq!(factory.probe.releases(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_closes_stream() {
        let factory = Arc::new(ScriptedFactory::new(2));
        let registry = Arc::new(SessionRegistry::new(factory.clone(), test_config()));
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let session = ScopedSession::start(Arc::clone(&registry)).await.unwrap();
        let (out_tx, out_rx) = fmpsc::unbounded::<Message>();
        // Keep the client side open; only the token ends the loop.
        let (_in_tx, in_rx) = fmpsc::unbounded::<Result<Message, axum::Error>>();

        run_stream(out_tx, in_rx, session, shutdown).await;
        let events = parse(out_rx.collect().await);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["type"], "ready");
        assert_eq!(factory.probe.releases(), 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_session_ended_elsewhere_closes_stream() {
        let factory = Arc::new(ScriptedFactory::new(2));
        let registry = Arc::new(SessionRegistry::new(factory.clone(), test_config()));

        let session = ScopedSession::start(Arc::clone(&registry)).await.unwrap();
        registry.end_session(session.id()).await;

        let (out_tx, out_rx) = fmpsc::unbounded::<Message>();
        let (in_tx, in_rx) = fmpsc::unbounded::<Result<Message, axum::Error>>();
        in_tx
            .unbounded_send(Ok(Message::Binary(Bytes::from(pcm(&[0, 0])))))
            .unwrap();

        run_stream(out_tx, in_rx, session, CancellationToken::new()).await;
        let events = parse(out_rx.collect().await);

        let kinds: Vec<_> = events.iter().map(|e| e["type"].as_str().unwrap()).collect();
        assert_eq!(kinds, vec!["ready", "error"]);
        assert_eq!(factory.probe.frame_count(), 0);
        assert_eq!(factory.probe.releases(), 1);
    }
}
