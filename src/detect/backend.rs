use anyhow::Result;

use crate::detect::result::Observation;
use crate::frame::Frame;

/// Body-pose and hand-landmark detector.
///
/// Implementations receive the frame by reference for the duration of one
/// call and must not keep pixels beyond it. Model internals and accuracy are
/// the implementation's concern; the pilot only consumes the `Observation`.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    ///
    /// An error skips the tick; it does not end the session.
    fn detect(&mut self, frame: &Frame) -> Result<Observation>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<B: DetectorBackend + ?Sized> DetectorBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn detect(&mut self, frame: &Frame) -> Result<Observation> {
        (**self).detect(frame)
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }
}
