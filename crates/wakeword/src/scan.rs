//! Per-chunk detection scanning shared by both transports.
//!
//! Polling requests scan with [`ScanPolicy::StopAtFirstMatch`] so every
//! request gets one bounded answer. Streaming connections scan with
//! [`ScanPolicy::ReportAll`] so every match becomes a notification. The two
//! policies differ on purpose.

use serde::Serialize;

use crate::detector::DetectorError;
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPolicy {
    /// Stop at the first matching frame. Frames after it in the same chunk
    /// are dropped without reaching the detector.
    StopAtFirstMatch,
    /// Process every frame and report each match.
    ReportAll,
}

/// One keyword match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub keyword_index: usize,
    pub keyword: String,
    /// Position of the matching frame within this chunk.
    pub frame: usize,
}

/// Polling answer for one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub detected: bool,
    pub keyword_index: Option<usize>,
}

impl DetectionResult {
    pub const NONE: Self = Self {
        detected: false,
        keyword_index: None,
    };

    pub fn matched(keyword_index: usize) -> Self {
        Self {
            detected: true,
            keyword_index: Some(keyword_index),
        }
    }
}

/// Scan one chunk under `policy`, calling `on_match` for each match as soon
/// as it is found.
///
/// An empty chunk leaves the session untouched. A detector failure stops the
/// scan; the session's leftover has already been updated and stays valid.
/// Returns the number of matches.
pub fn scan_chunk<F>(
    session: &mut Session,
    chunk: &[u8],
    policy: ScanPolicy,
    mut on_match: F,
) -> Result<usize, DetectorError>
where
    F: FnMut(Detection),
{
    if chunk.is_empty() {
        return Ok(0);
    }

    let frames = session.take_frames(chunk);
    let mut matches = 0;

    for (position, frame) in frames.iter().enumerate() {
        let Some(keyword_index) = session.process_frame(frame)? else {
            continue;
        };

        matches += 1;
        tracing::debug!(
            session_id = %session.id(),
            keyword_index,
            frame = position,
            "Wake word detected"
        );
        on_match(Detection {
            keyword_index,
            keyword: session.keyword_label(keyword_index),
            frame: position,
        });

        if policy == ScanPolicy::StopAtFirstMatch {
            let dropped = frames.len() - position - 1;
            if dropped > 0 {
                tracing::trace!(session_id = %session.id(), dropped, "Dropping frames after match");
            }
            break;
        }
    }

    Ok(matches)
}

/// Polling entry point: scan with [`ScanPolicy::StopAtFirstMatch`].
pub fn handle_chunk(session: &mut Session, chunk: &[u8]) -> Result<DetectionResult, DetectorError> {
    let mut result = DetectionResult::NONE;
    scan_chunk(session, chunk, ScanPolicy::StopAtFirstMatch, |detection| {
        result = DetectionResult::matched(detection.keyword_index);
    })?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::DetectorHandle;
    use crate::test_support::{frame_starting_with, pcm, Probe, ScriptedDetector, FAIL_MARKER};

    const FRAME: usize = 4;

    fn session(probe: &Probe) -> Session {
        let detector = DetectorHandle::new(Box::new(ScriptedDetector::new(FRAME, probe.clone())));
        Session::new(
            "scan".to_string(),
            detector,
            vec!["bumblebee".to_string(), "jarvis".to_string()],
        )
        .unwrap()
    }

    fn chunk_of(frames: &[Vec<i16>], tail: &[u8]) -> Vec<u8> {
        let mut bytes: Vec<u8> = frames.iter().flat_map(|f| pcm(f)).collect();
        bytes.extend_from_slice(tail);
        bytes
    }

    #[test]
    fn test_empty_chunk_touches_nothing() {
        let probe = Probe::default();
        let mut s = session(&probe);
        s.take_frames(&[1, 2, 3]);

        assert_eq!(handle_chunk(&mut s, &[]).unwrap(), DetectionResult::NONE);
        assert_eq!(s.leftover_len(), 3);
        assert_eq!(probe.frame_count(), 0);
    }

    #[test]
    fn test_no_match() {
        let probe = Probe::default();
        let mut s = session(&probe);
        let chunk = chunk_of(&[frame_starting_with(0, FRAME), frame_starting_with(5, FRAME)], &[]);

        assert_eq!(handle_chunk(&mut s, &chunk).unwrap(), DetectionResult::NONE);
        assert_eq!(probe.frame_count(), 2);
    }

    #[test]
    fn test_stop_at_first_match_drops_later_frames() {
        let probe = Probe::default();
        let mut s = session(&probe);
        let chunk = chunk_of(
            &[
                frame_starting_with(0, FRAME),
                frame_starting_with(ScriptedDetector::marker(1), FRAME),
                frame_starting_with(ScriptedDetector::marker(0), FRAME),
                frame_starting_with(0, FRAME),
            ],
            &[0xAB, 0xCD, 0xEF],
        );

        let result = handle_chunk(&mut s, &chunk).unwrap();

        assert_eq!(result, DetectionResult::matched(1));
        // frames up to and including the match, nothing after
        assert_eq!(probe.frame_count(), 2);
        assert_eq!(s.leftover_len(), 3);
        assert_eq!(s.detections(), 1);
    }

    #[test]
    fn test_report_all_emits_every_match_in_order() {
        let probe = Probe::default();
        let mut s = session(&probe);
        let chunk = chunk_of(
            &[
                frame_starting_with(ScriptedDetector::marker(0), FRAME),
                frame_starting_with(0, FRAME),
                frame_starting_with(ScriptedDetector::marker(1), FRAME),
            ],
            &[],
        );

        let mut seen = Vec::new();
        let count = scan_chunk(&mut s, &chunk, ScanPolicy::ReportAll, |d| seen.push(d)).unwrap();

        assert_eq!(count, 2);
        assert_eq!(probe.frame_count(), 3);
        assert_eq!(
            seen,
            vec![
                Detection {
                    keyword_index: 0,
                    keyword: "bumblebee".to_string(),
                    frame: 0
                },
                Detection {
                    keyword_index: 1,
                    keyword: "jarvis".to_string(),
                    frame: 2
                },
            ]
        );
    }

    #[test]
    fn test_match_spanning_chunks() {
        let probe = Probe::default();
        let mut s = session(&probe);
        let bytes = pcm(&frame_starting_with(ScriptedDetector::marker(0), FRAME));

        assert_eq!(handle_chunk(&mut s, &bytes[..3]).unwrap(), DetectionResult::NONE);
        assert_eq!(probe.frame_count(), 0);
        assert_eq!(handle_chunk(&mut s, &bytes[3..]).unwrap(), DetectionResult::matched(0));
        assert_eq!(s.leftover_len(), 0);
    }

    #[test]
    fn test_detector_failure_keeps_leftover_and_session_usable() {
        let probe = Probe::default();
        let mut s = session(&probe);
        let chunk = chunk_of(
            &[
                frame_starting_with(FAIL_MARKER, FRAME),
                frame_starting_with(ScriptedDetector::marker(0), FRAME),
            ],
            &[1, 2],
        );

        let err = handle_chunk(&mut s, &chunk).unwrap_err();
        assert!(matches!(err, DetectorError::Process(_)));
        assert_eq!(s.leftover_len(), 2);
        assert_eq!(probe.frame_count(), 1);

        // The two carried bytes plus six more complete the next frame.
        let result = handle_chunk(&mut s, &[0u8; 6]).unwrap();
        assert_eq!(result, DetectionResult::NONE);
        assert_eq!(probe.frame_count(), 2);
        assert_eq!(probe.frames()[1][0], i16::from_le_bytes([1, 2]));
        assert_eq!(s.leftover_len(), 0);
    }

    #[test]
    fn test_exactly_once_per_frame_across_calls() {
        let probe = Probe::default();
        let mut s = session(&probe);
        let stream: Vec<u8> = (0..40u8).collect();

        for piece in stream.chunks(3) {
            handle_chunk(&mut s, piece).unwrap();
        }

        let frames = probe.frames();
        assert_eq!(frames.len(), 40 / (FRAME * 2));
        let rebuilt: Vec<u8> = frames.iter().flat_map(|f| pcm(f)).collect();
        assert_eq!(rebuilt, &stream[..rebuilt.len()]);
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let json = serde_json::to_value(DetectionResult::matched(2)).unwrap();
        assert_eq!(json, serde_json::json!({"detected": true, "keywordIndex": 2}));
        let json = serde_json::to_value(DetectionResult::NONE).unwrap();
        assert_eq!(json, serde_json::json!({"detected": false, "keywordIndex": null}));
    }
}
