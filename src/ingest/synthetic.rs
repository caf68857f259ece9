//! Synthetic frame source (`stub://`).
//!
//! Produces patterned RGB frames at the configured size without any camera.
//! Used for dry runs of the full loop and for tests.

use anyhow::{anyhow, Result};

use super::{FrameSource, SourceSettings, SourceStats};
use crate::frame::{Capture, Frame, RGB_CHANNELS};

pub struct SyntheticSource {
    settings: SourceSettings,
    frame_count: u64,
    frame_limit: Option<u64>,
    /// Simulated scene state, bumped periodically.
    scene_state: u8,
    connected: bool,
    released: bool,
}

impl SyntheticSource {
    pub fn new(settings: SourceSettings) -> Result<Self> {
        if !settings.url.starts_with("stub://") {
            return Err(anyhow!(
                "synthetic source requires a stub:// url, got {}",
                settings.url
            ));
        }
        if settings.width == 0 || settings.height == 0 {
            return Err(anyhow!("synthetic frame size must be non-zero"));
        }
        Ok(Self {
            settings,
            frame_count: 0,
            frame_limit: None,
            scene_state: 0,
            connected: false,
            released: false,
        })
    }

    /// End the stream after `limit` frames.
    pub fn with_frame_limit(mut self, limit: u64) -> Self {
        self.frame_limit = Some(limit);
        self
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    fn generate_pixels(&mut self) -> Vec<u8> {
        let pixel_count =
            self.settings.width as usize * self.settings.height as usize * RGB_CHANNELS;

        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }

        let noise: u8 = rand::random();
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count + self.scene_state as u64) % 256) as u8 ^ noise;
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!("SyntheticSource: connected to {}", self.settings.url);
        Ok(())
    }

    fn poll_frame(&mut self) -> Result<Capture> {
        if self.released {
            return Err(anyhow!("{} was already released", self.settings.url));
        }
        if !self.connected {
            return Err(anyhow!("{} polled before connect", self.settings.url));
        }
        if self.frame_limit.is_some_and(|limit| self.frame_count >= limit) {
            return Ok(Capture::Ended);
        }

        self.frame_count += 1;
        let pixels = self.generate_pixels();
        let frame = Frame::new(
            pixels,
            self.settings.width,
            self.settings.height,
            self.frame_count,
        )?;
        Ok(Capture::Frame(frame))
    }

    fn is_healthy(&self) -> bool {
        self.connected && !self.released
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            url: self.settings.url.clone(),
        }
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        log::info!(
            "SyntheticSource: released {} after {} frames",
            self.settings.url,
            self.frame_count
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> SourceSettings {
        SourceSettings {
            url: "stub://test".to_string(),
            target_fps: 10,
            width: 8,
            height: 4,
            mirror: false,
        }
    }

    #[test]
    fn yields_frames_of_configured_size() {
        let mut source = SyntheticSource::new(settings()).unwrap();
        source.connect().unwrap();
        let Capture::Frame(frame) = source.poll_frame().unwrap() else {
            panic!("expected a frame");
        };
        assert_eq!(frame.width, 8);
        assert_eq!(frame.height, 4);
        assert_eq!(frame.byte_len(), 8 * 4 * 3);
        assert_eq!(frame.sequence, 1);
        assert_eq!(source.stats().frames_captured, 1);
    }

    #[test]
    fn ends_after_frame_limit() {
        let mut source = SyntheticSource::new(settings()).unwrap().with_frame_limit(2);
        source.connect().unwrap();
        assert!(matches!(source.poll_frame().unwrap(), Capture::Frame(_)));
        assert!(matches!(source.poll_frame().unwrap(), Capture::Frame(_)));
        assert!(matches!(source.poll_frame().unwrap(), Capture::Ended));
    }

    #[test]
    fn rejects_non_stub_urls() {
        let mut cfg = settings();
        cfg.url = "rtsp://camera".to_string();
        assert!(SyntheticSource::new(cfg).is_err());
    }

    #[test]
    fn release_is_idempotent_and_final() {
        let mut source = SyntheticSource::new(settings()).unwrap();
        source.connect().unwrap();
        source.release();
        source.release();
        assert!(source.is_released());
        assert!(!source.is_healthy());
        assert!(source.poll_frame().is_err());
    }
}
