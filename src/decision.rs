//! Decision engine: one detection snapshot in, one motion command out.
//!
//! Priority order, strictly:
//! 1. A fist on any tracked hand stops the robot.
//! 2. A tracked subject steers the robot toward the frame center.
//! 3. Anything else stops the robot.
//!
//! `decide` is pure. It keeps no memory between ticks, so identical inputs
//! always produce identical commands.

use anyhow::{anyhow, Result};

use crate::command::Command;
use crate::detect::Detection;

/// Default frame width of the follower camera preview.
pub const DEFAULT_FRAME_WIDTH: u32 = 640;

/// Frame geometry used to steer toward the subject.
///
/// `center_tolerance` is the half-width of the dead band around the frame
/// center inside which the robot drives straight.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GeometryConfig {
    frame_width: u32,
    center_tolerance: u32,
}

impl GeometryConfig {
    /// Geometry with the conventional tolerance of one tenth of the frame width.
    pub fn new(frame_width: u32) -> Result<Self> {
        Self::with_tolerance(frame_width, frame_width / 10)
    }

    pub fn with_tolerance(frame_width: u32, center_tolerance: u32) -> Result<Self> {
        if frame_width == 0 {
            return Err(anyhow!("frame width must be greater than zero"));
        }
        if center_tolerance == 0 {
            return Err(anyhow!("center tolerance must be greater than zero"));
        }
        if center_tolerance > frame_width / 2 {
            return Err(anyhow!(
                "center tolerance {} exceeds half the frame width ({})",
                center_tolerance,
                frame_width / 2
            ));
        }
        Ok(Self {
            frame_width,
            center_tolerance,
        })
    }

    /// Tolerance expressed as a fraction of the frame width.
    pub fn with_tolerance_ratio(frame_width: u32, ratio: f64) -> Result<Self> {
        if !ratio.is_finite() || ratio <= 0.0 || ratio > 0.5 {
            return Err(anyhow!(
                "center tolerance ratio must be in (0, 0.5], got {}",
                ratio
            ));
        }
        let tolerance = (f64::from(frame_width) * ratio).round() as u32;
        Self::with_tolerance(frame_width, tolerance)
    }

    pub fn frame_width(&self) -> u32 {
        self.frame_width
    }

    pub fn center_tolerance(&self) -> u32 {
        self.center_tolerance
    }

    pub fn frame_center(&self) -> i64 {
        i64::from(self.frame_width / 2)
    }
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            frame_width: DEFAULT_FRAME_WIDTH,
            center_tolerance: DEFAULT_FRAME_WIDTH / 10,
        }
    }
}

/// Map a detection snapshot to exactly one command.
pub fn decide(detection: Option<&Detection>, geometry: &GeometryConfig) -> Command {
    let Some(detection) = detection else {
        return Command::Stop;
    };

    if detection.has_fist() {
        return Command::Stop;
    }

    match &detection.subject {
        Some(subject) => steer(subject.center_x() - geometry.frame_center(), geometry),
        None => Command::Stop,
    }
}

fn steer(offset: i64, geometry: &GeometryConfig) -> Command {
    if offset.abs() < i64::from(geometry.center_tolerance) {
        Command::Forward
    } else if offset < 0 {
        Command::Left
    } else {
        Command::Right
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, HandGesture};

    fn geometry() -> GeometryConfig {
        GeometryConfig::with_tolerance(640, 64).unwrap()
    }

    fn subject(x: i32, y: i32, width: i32, height: i32) -> Detection {
        Detection::with_subject(BoundingBox::new(x, y, width, height))
    }

    /// Box of width 2 whose center lands exactly on `cx`.
    fn centered_at(cx: i32) -> Detection {
        subject(cx - 1, 0, 2, 10)
    }

    #[test]
    fn default_geometry_uses_tenth_of_width() {
        let g = GeometryConfig::default();
        assert_eq!(g.frame_width(), 640);
        assert_eq!(g.center_tolerance(), 64);
        assert_eq!(g.frame_center(), 320);
        assert_eq!(GeometryConfig::new(640).unwrap(), g);
    }

    #[test]
    fn tolerance_ratio_is_applied_to_width() {
        let g = GeometryConfig::with_tolerance_ratio(1280, 0.05).unwrap();
        assert_eq!(g.center_tolerance(), 64);
        assert!(GeometryConfig::with_tolerance_ratio(640, 0.0).is_err());
        assert!(GeometryConfig::with_tolerance_ratio(640, 0.75).is_err());
    }

    #[test]
    fn tolerance_ratio_rounds_to_nearest_pixel() {
        // 800 * 0.29 is 231.99999999999997 in f64.
        let g = GeometryConfig::with_tolerance_ratio(800, 0.29).unwrap();
        assert_eq!(g.center_tolerance(), 232);
        let g = GeometryConfig::with_tolerance_ratio(641, 0.1).unwrap();
        assert_eq!(g.center_tolerance(), 64);
    }

    #[test]
    fn rejects_degenerate_geometry() {
        assert!(GeometryConfig::with_tolerance(0, 10).is_err());
        assert!(GeometryConfig::with_tolerance(640, 0).is_err());
        assert!(GeometryConfig::with_tolerance(640, 321).is_err());
        assert!(GeometryConfig::new(5).is_err());
    }

    #[test]
    fn centered_subject_drives_forward() {
        let det = subject(260, 0, 120, 400);
        assert_eq!(decide(Some(&det), &geometry()), Command::Forward);
    }

    #[test]
    fn subject_on_the_left_turns_left() {
        let det = subject(50, 0, 60, 200);
        assert_eq!(decide(Some(&det), &geometry()), Command::Left);
    }

    #[test]
    fn subject_on_the_right_turns_right() {
        let det = subject(500, 0, 100, 200);
        assert_eq!(decide(Some(&det), &geometry()), Command::Right);
    }

    #[test]
    fn empty_snapshot_stops() {
        assert_eq!(decide(Some(&Detection::default()), &geometry()), Command::Stop);
    }

    #[test]
    fn missing_snapshot_stops() {
        assert_eq!(decide(None, &geometry()), Command::Stop);
    }

    #[test]
    fn fist_overrides_every_position() {
        for det in [centered_at(320), centered_at(10), centered_at(630)] {
            let mut det = det;
            det.gestures = vec![HandGesture::Open, HandGesture::Fist];
            assert_eq!(decide(Some(&det), &geometry()), Command::Stop);
        }
    }

    #[test]
    fn fist_without_subject_stops() {
        let det = Detection {
            subject: None,
            gestures: vec![HandGesture::Fist],
        };
        assert_eq!(decide(Some(&det), &geometry()), Command::Stop);
    }

    #[test]
    fn open_hands_do_not_block_steering() {
        let mut det = centered_at(100);
        det.gestures = vec![HandGesture::Open, HandGesture::Open];
        assert_eq!(decide(Some(&det), &geometry()), Command::Left);
    }

    #[test]
    fn dead_band_edges() {
        let g = geometry();
        for offset in -63..=63 {
            assert_eq!(
                decide(Some(&centered_at(320 + offset)), &g),
                Command::Forward,
                "offset {offset}"
            );
        }
        assert_eq!(decide(Some(&centered_at(320 - 64)), &g), Command::Left);
        assert_eq!(decide(Some(&centered_at(320 - 200)), &g), Command::Left);
        assert_eq!(decide(Some(&centered_at(320 + 64)), &g), Command::Right);
        assert_eq!(decide(Some(&centered_at(320 + 200)), &g), Command::Right);
    }

    #[test]
    fn odd_widths_use_integer_center() {
        // cx = 261 + 119 / 2 = 320
        let det = subject(261, 0, 119, 50);
        assert_eq!(det.subject.unwrap().center_x(), 320);
        assert_eq!(decide(Some(&det), &geometry()), Command::Forward);
    }

    #[test]
    fn mirrored_subject_steers_the_other_way() {
        let g = geometry();
        let bbox = BoundingBox::new(50, 0, 60, 200);
        let raw = Detection::with_subject(bbox);
        let flipped = Detection::with_subject(bbox.mirrored(g.frame_width()));
        assert_eq!(decide(Some(&raw), &g), Command::Left);
        assert_eq!(decide(Some(&flipped), &g), Command::Right);
    }

    #[test]
    fn decisions_are_repeatable() {
        let g = geometry();
        let det = subject(420, 12, 80, 300);
        let first = decide(Some(&det), &g);
        for _ in 0..10 {
            assert_eq!(decide(Some(&det), &g), first);
        }
    }
}
