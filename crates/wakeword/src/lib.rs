//! Streaming wake-word detection service.
//!
//! Clients stream 16 kHz mono PCM16LE audio either by polling
//! (`POST /audio?sessionId=..`) or over a WebSocket (`GET /stream`). Each
//! session owns one detector; bytes are reassembled into detector-sized
//! frames, so chunk boundaries never need to line up with frames.
//!
//! - [`frame`]: byte stream to frame reassembly
//! - [`session`] / [`registry`]: per-stream state and its lifecycle
//! - [`scan`]: per-chunk detection shared by both transports
//! - [`web`]: HTTP and WebSocket surface
//! - [`serve`]: process wiring, graceful shutdown
//! - [`client`]: WAV-file test client

pub mod client;
pub mod detector;
pub mod error;
pub mod frame;
pub mod registry;
pub mod scan;
pub mod serve;
pub mod session;
pub mod telemetry;
pub mod web;

#[cfg(test)]
mod test_support;

/// Audio sample rate accepted by the service, in Hz.
pub const SAMPLE_RATE: u32 = 16_000;

pub use detector::{
    default_factory, Detector, DetectorConfig, DetectorError, DetectorFactory, DetectorHandle,
    KeywordSource, SessionOptions,
};
pub use error::WakeError;
pub use registry::{ScopedSession, SessionRegistry};
pub use scan::{handle_chunk, scan_chunk, Detection, DetectionResult, ScanPolicy};
pub use session::{Session, SessionInfo};
