//! Scripted detector for unit tests.
//!
//! A frame matches keyword `k` when its first sample equals
//! [`ScriptedDetector::marker`]`(k)`; a frame starting with [`FAIL_MARKER`]
//! makes `process` fail.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::detector::{Detector, DetectorConfig, DetectorError, DetectorFactory, KeywordSource};

pub const FAIL_MARKER: i16 = -30_000;

/// Shared counters observed by tests after the detector is moved into a session.
#[derive(Clone, Default)]
pub struct Probe {
    releases: Arc<AtomicUsize>,
    created: Arc<AtomicUsize>,
    frames: Arc<Mutex<Vec<Vec<i16>>>>,
}

impl Probe {
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn frames(&self) -> Vec<Vec<i16>> {
        self.frames.lock().unwrap().clone()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.lock().unwrap().len()
    }
}

pub struct ScriptedDetector {
    frame_length: usize,
    probe: Probe,
    fail_release: bool,
}

impl ScriptedDetector {
    pub fn new(frame_length: usize, probe: Probe) -> Self {
        Self {
            frame_length,
            probe,
            fail_release: false,
        }
    }

    pub fn failing_release(mut self) -> Self {
        self.fail_release = true;
        self
    }

    pub fn marker(keyword_index: usize) -> i16 {
        30_000 + keyword_index as i16
    }
}

impl Detector for ScriptedDetector {
    fn frame_length(&self) -> usize {
        self.frame_length
    }

    fn sample_rate(&self) -> u32 {
        crate::SAMPLE_RATE
    }

    fn process(&mut self, frame: &[i16]) -> Result<Option<usize>, DetectorError> {
        assert_eq!(frame.len(), self.frame_length, "frame length mismatch");
        self.probe.frames.lock().unwrap().push(frame.to_vec());
        match frame[0] {
            FAIL_MARKER => Err(DetectorError::Process("scripted failure".to_string())),
            first if first >= 30_000 => Ok(Some((first - 30_000) as usize)),
            _ => Ok(None),
        }
    }

    fn release(&mut self) -> Result<(), DetectorError> {
        self.probe.releases.fetch_add(1, Ordering::SeqCst);
        if self.fail_release {
            Err(DetectorError::Release("scripted release failure".to_string()))
        } else {
            Ok(())
        }
    }
}

/// Factory handing out [`ScriptedDetector`]s that all report to one probe.
pub struct ScriptedFactory {
    pub frame_length: usize,
    pub probe: Probe,
}

impl ScriptedFactory {
    pub fn new(frame_length: usize) -> Self {
        Self {
            frame_length,
            probe: Probe::default(),
        }
    }
}

impl DetectorFactory for ScriptedFactory {
    fn create(&self, config: &DetectorConfig) -> Result<Box<dyn Detector>, DetectorError> {
        if config.access_key == "rejected" {
            return Err(DetectorError::Init("access key rejected".to_string()));
        }
        self.probe.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedDetector::new(
            self.frame_length,
            self.probe.clone(),
        )))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

pub fn test_config() -> DetectorConfig {
    DetectorConfig {
        access_key: "test-key".to_string(),
        keywords: KeywordSource::Builtin(vec!["bumblebee".to_string(), "jarvis".to_string()]),
        sensitivities: vec![],
    }
}

/// Encode samples as PCM16LE bytes.
pub fn pcm(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// One frame of `frame_length` samples whose first sample is `first`.
pub fn frame_starting_with(first: i16, frame_length: usize) -> Vec<i16> {
    let mut frame = vec![1i16; frame_length];
    frame[0] = first;
    frame
}
