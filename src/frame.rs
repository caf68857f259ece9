//! Per-tick frame container.
//!
//! - `Frame`: raw RGB pixels owned by exactly one tick. Not `Clone`.
//! - `Capture`: result of a non-blocking frame poll.
//!
//! A frame is handed to the detector by reference and dropped when the tick
//! ends, so nothing downstream of the decision can hold on to image data.

use anyhow::{anyhow, Result};

/// Bytes per pixel for packed RGB frames.
pub const RGB_CHANNELS: usize = 3;

/// Raw frame. Deliberately not `Clone`: frames never outlive their tick.
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Monotonic frame counter assigned by the source.
    pub sequence: u64,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(RGB_CHANNELS))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for a {}x{} frame, received {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            sequence,
        })
    }

    /// Read-only pixel access for detectors.
    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Outcome of polling a frame source once.
#[derive(Debug)]
pub enum Capture {
    /// A fresh frame for this tick.
    Frame(Frame),
    /// Nothing new yet. Not an error.
    Pending,
    /// The source has no more frames.
    Ended,
}
