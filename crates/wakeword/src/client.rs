//! HTTP test client: streams a WAV file through the polling API.

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Session description returned by `POST /session/start`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedSession {
    pub session_id: String,
    pub sample_rate: u32,
    pub frame_length: usize,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioReply {
    pub detected: bool,
    #[serde(default)]
    pub keyword_index: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EndReply {
    ended: bool,
}

pub struct WakeClient {
    base_url: String,
    client: reqwest::Client,
}

impl WakeClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub async fn health(&self) -> Result<serde_json::Value> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .context("Failed to reach server")?;
        parse_json(response).await
    }

    pub async fn start_session(&self) -> Result<StartedSession> {
        let response = self
            .client
            .post(format!("{}/session/start", self.base_url))
            .send()
            .await
            .context("Failed to start session")?;
        parse_json(response).await
    }

    pub async fn send_audio(&self, session_id: &str, pcm: Vec<u8>) -> Result<AudioReply> {
        let response = self
            .client
            .post(format!("{}/audio", self.base_url))
            .query(&[("sessionId", session_id)])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(pcm)
            .send()
            .await
            .context("Failed to send audio")?;
        parse_json(response).await
    }

    pub async fn end_session(&self, session_id: &str) -> Result<bool> {
        let response = self
            .client
            .post(format!("{}/session/end", self.base_url))
            .json(&serde_json::json!({ "sessionId": session_id }))
            .send()
            .await
            .context("Failed to end session")?;
        let reply: EndReply = parse_json(response).await?;
        Ok(reply.ended)
    }
}

async fn parse_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(anyhow!("Server returned {}: {}", status, body));
    }
    response.json().await.context("Invalid JSON from server")
}

/// Mono 16-bit PCM read from a WAV file.
#[derive(Debug)]
pub struct WavAudio {
    pub sample_rate: u32,
    pub samples: Vec<i16>,
}

/// Read a WAV file, rejecting anything but mono 16-bit integer PCM.
pub fn read_wav(path: &Path) -> Result<WavAudio> {
    let reader = hound::WavReader::open(path)
        .with_context(|| format!("Failed to open WAV file {}", path.display()))?;
    let spec = reader.spec();

    if spec.channels != 1 {
        bail!("WAV must be mono, found {} channels", spec.channels);
    }
    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
        bail!(
            "WAV must be 16-bit integer PCM, found {} bits ({:?})",
            spec.bits_per_sample,
            spec.sample_format
        );
    }

    let samples = reader
        .into_samples::<i16>()
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to read WAV samples")?;

    Ok(WavAudio {
        sample_rate: spec.sample_rate,
        samples,
    })
}

/// Split samples into PCM16LE request bodies of one frame each. The last
/// body may be short.
pub fn frame_chunks(samples: &[i16], frame_length: usize) -> Vec<Vec<u8>> {
    samples
        .chunks(frame_length.max(1))
        .map(|frame| frame.iter().flat_map(|s| s.to_le_bytes()).collect())
        .collect()
}

/// Result of streaming one file.
#[derive(Debug, Clone)]
pub struct StreamOutcome {
    pub session: StartedSession,
    pub chunks_sent: usize,
    pub detection: Option<AudioReply>,
}

/// Stream a WAV file one frame per request, stopping at the first detection.
/// The session is ended afterwards whether or not streaming succeeded.
pub async fn stream_wav(client: &WakeClient, path: &Path, delay: Duration) -> Result<StreamOutcome> {
    let audio = read_wav(path)?;
    let session = client.start_session().await?;

    if audio.sample_rate != session.sample_rate {
        client.end_session(&session.session_id).await.ok();
        bail!(
            "WAV sample rate must be {}, found {}",
            session.sample_rate,
            audio.sample_rate
        );
    }

    tracing::info!(
        session_id = %session.session_id,
        frame_length = session.frame_length,
        samples = audio.samples.len(),
        "Streaming WAV"
    );

    let streamed = send_frames(client, &session, &audio.samples, delay).await;

    if let Err(e) = client.end_session(&session.session_id).await {
        tracing::warn!(error = %e, "Failed to end session");
    }

    let (chunks_sent, detection) = streamed?;
    Ok(StreamOutcome {
        session,
        chunks_sent,
        detection,
    })
}

async fn send_frames(
    client: &WakeClient,
    session: &StartedSession,
    samples: &[i16],
    delay: Duration,
) -> Result<(usize, Option<AudioReply>)> {
    let mut sent = 0;
    for chunk in frame_chunks(samples, session.frame_length) {
        let reply = client.send_audio(&session.session_id, chunk).await?;
        sent += 1;
        if reply.detected {
            return Ok((sent, Some(reply)));
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
    Ok((sent, None))
}
