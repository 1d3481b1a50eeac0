//! Wake-word detector capability.
//!
//! The acoustic matcher is a black box behind [`Detector`]: it takes one
//! fixed-length frame of 16-bit samples and reports which keyword (if any)
//! matched. [`DetectorFactory`] builds detectors from a [`DetectorConfig`];
//! [`DetectorHandle`] owns one detector and releases it exactly once.

mod config;
#[cfg(feature = "porcupine")]
pub mod porcupine;

pub use config::{DetectorConfig, KeywordSource, SessionOptions};

use std::sync::Arc;
use thiserror::Error;

use crate::error::WakeError;

/// Errors reported by a detector backend.
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("detector initialization failed: {0}")]
    Init(String),

    #[error("detector failed to process frame: {0}")]
    Process(String),

    #[error("detector release failed: {0}")]
    Release(String),

    #[error("detector has already been released")]
    Released,
}

/// A stateful wake-word matcher.
pub trait Detector: Send {
    /// Samples per frame accepted by [`Detector::process`].
    fn frame_length(&self) -> usize;

    /// Sample rate the detector expects, in Hz.
    fn sample_rate(&self) -> u32;

    /// Process exactly one frame. Returns the matched keyword index, if any.
    fn process(&mut self, frame: &[i16]) -> Result<Option<usize>, DetectorError>;

    /// Free backend resources. Called at most once, by [`DetectorHandle`].
    fn release(&mut self) -> Result<(), DetectorError> {
        Ok(())
    }
}

/// Builds detectors for new sessions.
pub trait DetectorFactory: Send + Sync {
    fn create(&self, config: &DetectorConfig) -> Result<Box<dyn Detector>, DetectorError>;

    /// Backend name for logs and `/health`.
    fn name(&self) -> &'static str;
}

/// The detector backend compiled into this binary.
pub fn default_factory() -> Result<Arc<dyn DetectorFactory>, WakeError> {
    #[cfg(feature = "porcupine")]
    {
        Ok(Arc::new(porcupine::PorcupineFactory))
    }
    #[cfg(not(feature = "porcupine"))]
    {
        Err(WakeError::Configuration(
            "no detector backend compiled in; rebuild with `--features porcupine`".to_string(),
        ))
    }
}

/// Exclusive owner of one detector.
///
/// Releases the detector on [`DetectorHandle::release`] or on drop, whichever
/// comes first. Release failures are logged and swallowed.
pub struct DetectorHandle {
    inner: Option<Box<dyn Detector>>,
    frame_length: usize,
    sample_rate: u32,
}

impl DetectorHandle {
    pub fn new(detector: Box<dyn Detector>) -> Self {
        let frame_length = detector.frame_length();
        let sample_rate = detector.sample_rate();
        Self {
            inner: Some(detector),
            frame_length,
            sample_rate,
        }
    }

    pub fn frame_length(&self) -> usize {
        self.frame_length
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_released(&self) -> bool {
        self.inner.is_none()
    }

    pub fn process(&mut self, frame: &[i16]) -> Result<Option<usize>, DetectorError> {
        let detector = self.inner.as_mut().ok_or(DetectorError::Released)?;
        detector.process(frame)
    }

    /// Release the detector. Returns `true` only for the call that released it.
    pub fn release(&mut self) -> bool {
        let Some(mut detector) = self.inner.take() else {
            return false;
        };
        if let Err(e) = detector.release() {
            tracing::warn!(error = %e, "Ignoring detector release failure");
        }
        true
    }
}

impl Drop for DetectorHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for DetectorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectorHandle")
            .field("frame_length", &self.frame_length)
            .field("sample_rate", &self.sample_rate)
            .field("released", &self.is_released())
            .finish()
    }
}
