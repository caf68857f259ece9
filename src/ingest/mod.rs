//! Frame acquisition sources.
//!
//! Sources are polled once per tick and must not block: a source with no new
//! frame answers `Capture::Pending` and the tick is skipped. Camera drivers
//! plug in behind `FrameSource`; the crate ships a synthetic `stub://` source
//! for dry runs and tests.
//!
//! Sources MUST NOT:
//! - Store frames to disk
//! - Retain frames beyond the tick that polled them

mod synthetic;

use anyhow::Result;

use crate::frame::Capture;

pub use synthetic::SyntheticSource;

pub const DEFAULT_SOURCE_URL: &str = "stub://camera";
pub const DEFAULT_TARGET_FPS: u32 = 15;
pub const DEFAULT_FRAME_HEIGHT: u32 = 480;

/// Where frames (or recorded observations) come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceSettings {
    /// `stub://<name>` for synthetic frames, `replay://<path>` for recordings.
    pub url: String,
    /// Tick rate the control loop paces itself to.
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
    /// Flip frames horizontally before detection, so a selfie-facing
    /// camera steers toward the subject's own left and right.
    pub mirror: bool,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_SOURCE_URL.to_string(),
            target_fps: DEFAULT_TARGET_FPS,
            width: crate::decision::DEFAULT_FRAME_WIDTH,
            height: DEFAULT_FRAME_HEIGHT,
            mirror: true,
        }
    }
}

/// Statistics for a frame source.
#[derive(Clone, Debug, Default)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub url: String,
}

/// Non-blocking frame source.
pub trait FrameSource: Send {
    /// Open the device or stream.
    fn connect(&mut self) -> Result<()>;

    /// Poll for the latest frame. Errors are unrecoverable source failures.
    fn poll_frame(&mut self) -> Result<Capture>;

    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;

    /// Release the device. Must be idempotent.
    fn release(&mut self);
}
