//! Detection sessions.
//!
//! A session is one logical audio stream: one detector, one reassembly
//! leftover, and a little bookkeeping for logs and `/health`.

use serde::Serialize;
use std::time::{Duration, Instant};

use crate::detector::{DetectorError, DetectorHandle};
use crate::frame::FrameAssembler;

/// Public description of a session, returned by `POST /session/start` and
/// the streaming `ready` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: String,
    pub sample_rate: u32,
    pub frame_length: usize,
    pub keywords: Vec<String>,
}

pub struct Session {
    id: String,
    detector: DetectorHandle,
    assembler: FrameAssembler,
    keywords: Vec<String>,
    created_at: Instant,
    last_seen: Instant,
    frames_processed: u64,
    detections: u64,
}

impl Session {
    /// Wrap a freshly created detector.
    ///
    /// Fails if the detector reports a zero frame length.
    pub fn new(
        id: String,
        detector: DetectorHandle,
        keywords: Vec<String>,
    ) -> Result<Self, DetectorError> {
        let assembler = FrameAssembler::new(detector.frame_length()).ok_or_else(|| {
            DetectorError::Init("detector reported a zero frame length".to_string())
        })?;
        let now = Instant::now();
        Ok(Self {
            id,
            detector,
            assembler,
            keywords,
            created_at: now,
            last_seen: now,
            frames_processed: 0,
            detections: 0,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn frame_length(&self) -> usize {
        self.assembler.frame_length()
    }

    pub fn sample_rate(&self) -> u32 {
        self.detector.sample_rate()
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Label for a matched keyword index. Falls back to the index itself for
    /// detectors reporting more keywords than were configured.
    pub fn keyword_label(&self, index: usize) -> String {
        self.keywords
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("keyword-{}", index))
    }

    pub fn leftover_len(&self) -> usize {
        self.assembler.leftover().len()
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn detections(&self) -> u64 {
        self.detections
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn idle_duration(&self) -> Duration {
        self.last_seen.elapsed()
    }

    pub fn is_closed(&self) -> bool {
        self.detector.is_released()
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.id.clone(),
            sample_rate: self.sample_rate(),
            frame_length: self.frame_length(),
            keywords: self.keywords.clone(),
        }
    }

    /// Release the detector. Returns `true` only the first time.
    pub fn close(&mut self) -> bool {
        let released = self.detector.release();
        if released {
            tracing::info!(
                session_id = %self.id,
                frames = self.frames_processed,
                detections = self.detections,
                age_ms = self.age().as_millis() as u64,
                "Session closed"
            );
        }
        released
    }

    /// Reassemble `chunk` against the carried leftover. The new leftover is
    /// stored before any frame reaches the detector.
    pub(crate) fn take_frames(&mut self, chunk: &[u8]) -> Vec<Vec<i16>> {
        self.last_seen = Instant::now();
        self.assembler.push(chunk)
    }

    pub(crate) fn process_frame(&mut self, frame: &[i16]) -> Result<Option<usize>, DetectorError> {
        let result = self.detector.process(frame);
        self.frames_processed += 1;
        if let Ok(Some(_)) = result {
            self.detections += 1;
        }
        result
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("frame_length", &self.frame_length())
            .field("leftover", &self.leftover_len())
            .field("frames_processed", &self.frames_processed)
            .field("detections", &self.detections)
            .field("detector", &self.detector)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::Detector;
    use crate::test_support::{Probe, ScriptedDetector};

    fn session(frame_length: usize, probe: &Probe) -> Session {
        let detector = DetectorHandle::new(Box::new(ScriptedDetector::new(
            frame_length,
            probe.clone(),
        )));
        Session::new("s-1".to_string(), detector, vec!["bumblebee".to_string()]).unwrap()
    }

    #[test]
    fn test_zero_frame_length_rejected() {
        struct Broken;
        impl Detector for Broken {
            fn frame_length(&self) -> usize {
                0
            }
            fn sample_rate(&self) -> u32 {
                16_000
            }
            fn process(&mut self, _frame: &[i16]) -> Result<Option<usize>, DetectorError> {
                Ok(None)
            }
        }

        let err = Session::new("x".into(), DetectorHandle::new(Box::new(Broken)), vec![])
            .unwrap_err();
        assert!(matches!(err, DetectorError::Init(_)));
    }

    #[test]
    fn test_info_reflects_detector() {
        let probe = Probe::default();
        let s = session(512, &probe);
        let info = s.info();
        assert_eq!(info.session_id, "s-1");
        assert_eq!(info.frame_length, 512);
        assert_eq!(info.sample_rate, 16_000);
        assert_eq!(info.keywords, vec!["bumblebee"]);
        assert_eq!(s.leftover_len(), 0);
    }

    #[test]
    fn test_keyword_label_fallback() {
        let probe = Probe::default();
        let s = session(4, &probe);
        assert_eq!(s.keyword_label(0), "bumblebee");
        assert_eq!(s.keyword_label(3), "keyword-3");
    }

    #[test]
    fn test_close_is_idempotent() {
        let probe = Probe::default();
        let mut s = session(4, &probe);
        assert!(s.close());
        assert!(!s.close());
        assert!(s.is_closed());
        drop(s);
        assert_eq!(probe.releases(), 1);
    }

    #[test]
    fn test_info_serializes_camel_case() {
        let probe = Probe::default();
        let json = serde_json::to_value(session(4, &probe).info()).unwrap();
        assert_eq!(json["sessionId"], "s-1");
        assert_eq!(json["frameLength"], 4);
        assert_eq!(json["sampleRate"], 16_000);
    }
}
