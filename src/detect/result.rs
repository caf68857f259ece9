use serde::{Deserialize, Serialize};

/// Axis-aligned subject bounding box in image pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    #[serde(alias = "w")]
    pub width: i32,
    #[serde(alias = "h")]
    pub height: i32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Horizontal center, rounded toward zero like the pixel grid.
    pub fn center_x(&self) -> i64 {
        i64::from(self.x) + i64::from(self.width) / 2
    }

    /// The same box in a horizontally flipped frame of `frame_width` pixels.
    pub fn mirrored(&self, frame_width: u32) -> Self {
        let frame_width = i32::try_from(frame_width).unwrap_or(i32::MAX);
        Self {
            x: frame_width - self.x - self.width,
            ..*self
        }
    }
}

/// Per-hand joint coordinates in image space, indexed like the 21-point
/// hand model (0 = wrist, 4 = thumb tip, 8 = index tip, ...).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandLandmarks {
    pub points: Vec<[f32; 2]>,
}

impl HandLandmarks {
    pub fn new(points: Vec<[f32; 2]>) -> Self {
        Self { points }
    }

    /// Vertical image coordinate of a landmark. Larger is lower on screen.
    pub fn y(&self, index: usize) -> Option<f32> {
        self.points.get(index).map(|p| p[1])
    }
}

/// Hand pose classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandGesture {
    Open,
    Fist,
}

/// Raw detector output for one frame, before gesture classification.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    #[serde(default)]
    pub subject: Option<BoundingBox>,
    #[serde(default)]
    pub hands: Vec<HandLandmarks>,
}

impl Observation {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_subject(subject: BoundingBox) -> Self {
        Self {
            subject: Some(subject),
            hands: Vec::new(),
        }
    }
}

/// Per-tick snapshot consumed by the decision engine.
///
/// Gesture order carries no meaning.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Detection {
    pub subject: Option<BoundingBox>,
    pub gestures: Vec<HandGesture>,
}

impl Detection {
    pub fn with_subject(subject: BoundingBox) -> Self {
        Self {
            subject: Some(subject),
            gestures: Vec::new(),
        }
    }

    pub fn has_fist(&self) -> bool {
        self.gestures.contains(&HandGesture::Fist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirroring_flips_horizontal_position() {
        let bbox = BoundingBox::new(50, 10, 60, 200);
        let flipped = bbox.mirrored(640);
        assert_eq!(flipped, BoundingBox::new(530, 10, 60, 200));
        assert_eq!(flipped.center_x(), 560);
        assert_eq!(flipped.mirrored(640), bbox);
    }

    #[test]
    fn centered_box_stays_centered_when_mirrored() {
        let bbox = BoundingBox::new(260, 0, 120, 400);
        assert_eq!(bbox.mirrored(640).center_x(), 320);
    }
}
