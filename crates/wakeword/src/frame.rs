//! Frame reassembly.
//!
//! Turns an arbitrarily chunked PCM16LE byte stream into fixed-length frames
//! of `i16` samples. Bytes that do not fill a whole frame are carried forward
//! as the leftover for the next chunk.

/// Bytes per 16-bit sample.
pub const BYTES_PER_SAMPLE: usize = 2;

/// Output of one reassembly step.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Reassembled {
    /// Complete frames in stream order, each exactly `frame_length` samples.
    pub frames: Vec<Vec<i16>>,
    /// Trailing bytes shorter than one frame.
    pub leftover: Vec<u8>,
}

/// Split `leftover ++ chunk` into whole frames plus a new leftover.
///
/// `leftover` must be shorter than one frame (`frame_length * 2` bytes) and
/// `frame_length` must be non-zero. Windows are taken from offset 0 without
/// overlap, so no partial sample is ever decoded.
pub fn reassemble(leftover: &[u8], chunk: &[u8], frame_length: usize) -> Reassembled {
    assert!(frame_length > 0, "frame length must be non-zero");
    let frame_bytes = frame_length * BYTES_PER_SAMPLE;
    debug_assert!(leftover.len() < frame_bytes);

    let mut buf = Vec::with_capacity(leftover.len() + chunk.len());
    buf.extend_from_slice(leftover);
    buf.extend_from_slice(chunk);

    let windows = buf.chunks_exact(frame_bytes);
    let remainder = windows.remainder().to_vec();
    let frames = windows.map(decode_frame).collect();

    Reassembled {
        frames,
        leftover: remainder,
    }
}

fn decode_frame(window: &[u8]) -> Vec<i16> {
    window
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Reassembly state for one stream.
#[derive(Debug)]
pub struct FrameAssembler {
    frame_length: usize,
    leftover: Vec<u8>,
}

impl FrameAssembler {
    /// Returns `None` for a zero frame length.
    pub fn new(frame_length: usize) -> Option<Self> {
        (frame_length > 0).then(|| Self {
            frame_length,
            leftover: Vec::new(),
        })
    }

    pub fn frame_length(&self) -> usize {
        self.frame_length
    }

    pub fn frame_bytes(&self) -> usize {
        self.frame_length * BYTES_PER_SAMPLE
    }

    pub fn leftover(&self) -> &[u8] {
        &self.leftover
    }

    /// Consume `chunk`, store the new leftover and return the complete frames.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<i16>> {
        let Reassembled { frames, leftover } =
            reassemble(&self.leftover, chunk, self.frame_length);
        self.leftover = leftover;
        frames
    }
}
