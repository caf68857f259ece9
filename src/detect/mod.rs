mod backend;
mod backends;
mod gesture;
mod result;

pub use backend::DetectorBackend;
pub use backends::StubBackend;
pub use gesture::{FistPolicy, DEFAULT_CLOSED_THRESHOLD, LANDMARK_COUNT};
pub use result::{BoundingBox, Detection, HandGesture, HandLandmarks, Observation};

#[cfg(test)]
pub(crate) use gesture::fixtures;
