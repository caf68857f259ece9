//! Fist classification from hand landmarks.
//!
//! A digit is curled when its tip sits lower on screen (larger `y`) than the
//! joint below it. A hand is a fist once enough digits are curled.

use anyhow::{anyhow, Result};

use super::result::{HandGesture, HandLandmarks};

/// Landmarks per hand in the 21-point hand model.
pub const LANDMARK_COUNT: usize = 21;

/// (tip, lower joint) for the thumb: tip vs IP joint.
const THUMB: (usize, usize) = (4, 3);

/// (tip, PIP joint) for index, middle, ring and pinky.
const FINGERS: [(usize, usize); 4] = [(8, 6), (12, 10), (16, 14), (20, 18)];

pub const DEFAULT_CLOSED_THRESHOLD: usize = 4;

/// How many curled digits make a fist, and whether the thumb is counted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FistPolicy {
    closed_threshold: usize,
    include_thumb: bool,
}

impl FistPolicy {
    pub fn new(closed_threshold: usize, include_thumb: bool) -> Result<Self> {
        let digits = digit_count(include_thumb);
        if closed_threshold == 0 || closed_threshold > digits {
            return Err(anyhow!(
                "closed-finger threshold must be between 1 and {} (thumb {}), got {}",
                digits,
                if include_thumb { "counted" } else { "ignored" },
                closed_threshold
            ));
        }
        Ok(Self {
            closed_threshold,
            include_thumb,
        })
    }

    pub fn closed_threshold(&self) -> usize {
        self.closed_threshold
    }

    pub fn include_thumb(&self) -> bool {
        self.include_thumb
    }

    pub fn digit_count(&self) -> usize {
        digit_count(self.include_thumb)
    }

    /// Number of curled digits, or `None` for an incomplete hand.
    pub fn curled_count(&self, hand: &HandLandmarks) -> Option<usize> {
        if hand.points.len() < LANDMARK_COUNT {
            return None;
        }
        let thumb = self.include_thumb.then_some(THUMB);
        let mut curled = 0;
        for (tip, joint) in FINGERS.iter().copied().chain(thumb) {
            if hand.y(tip)? > hand.y(joint)? {
                curled += 1;
            }
        }
        Some(curled)
    }

    pub fn classify(&self, hand: &HandLandmarks) -> Option<HandGesture> {
        let curled = self.curled_count(hand)?;
        if curled >= self.closed_threshold {
            Some(HandGesture::Fist)
        } else {
            Some(HandGesture::Open)
        }
    }

    /// Classify up to `max_hands` hands, skipping incomplete ones.
    pub fn classify_all(&self, hands: &[HandLandmarks], max_hands: usize) -> Vec<HandGesture> {
        hands
            .iter()
            .take(max_hands)
            .filter_map(|hand| self.classify(hand))
            .collect()
    }
}

impl Default for FistPolicy {
    fn default() -> Self {
        Self {
            closed_threshold: DEFAULT_CLOSED_THRESHOLD,
            include_thumb: true,
        }
    }
}

fn digit_count(include_thumb: bool) -> usize {
    FINGERS.len() + usize::from(include_thumb)
}


#[cfg(test)]
mod tests {
    use super::fixtures::{fist, hand, open};
    use super::*;

    #[test]
    fn default_policy_is_four_of_five() {
        let policy = FistPolicy::default();
        assert_eq!(policy.closed_threshold(), 4);
        assert!(policy.include_thumb());
        assert_eq!(policy.digit_count(), 5);
    }

    #[test]
    fn classifies_open_and_closed_hands() {
        let policy = FistPolicy::default();
        assert_eq!(policy.classify(&open()), Some(HandGesture::Open));
        assert_eq!(policy.classify(&fist()), Some(HandGesture::Fist));
    }

    #[test]
    fn thumb_out_still_counts_as_fist_at_four_of_five() {
        let policy = FistPolicy::default();
        let thumb_out = hand([true, true, true, true, false]);
        assert_eq!(policy.curled_count(&thumb_out), Some(4));
        assert_eq!(policy.classify(&thumb_out), Some(HandGesture::Fist));

        let two_out = hand([true, true, true, false, false]);
        assert_eq!(policy.classify(&two_out), Some(HandGesture::Open));
    }

    #[test]
    fn thumbless_policy_requires_all_four_fingers() {
        let policy = FistPolicy::new(4, false).unwrap();
        assert_eq!(policy.digit_count(), 4);
        let thumb_only_open = hand([true, true, true, true, false]);
        assert_eq!(policy.classify(&thumb_only_open), Some(HandGesture::Fist));
        let pinky_out = hand([true, true, true, false, true]);
        assert_eq!(policy.curled_count(&pinky_out), Some(3));
        assert_eq!(policy.classify(&pinky_out), Some(HandGesture::Open));
    }

    #[test]
    fn strict_policy_requires_every_digit() {
        let policy = FistPolicy::new(5, true).unwrap();
        assert_eq!(
            policy.classify(&hand([true, true, true, true, false])),
            Some(HandGesture::Open)
        );
        assert_eq!(policy.classify(&fist()), Some(HandGesture::Fist));
    }

    #[test]
    fn tip_level_with_joint_is_not_curled() {
        let policy = FistPolicy::default();
        let flat = HandLandmarks::new(vec![[0.0, 0.3]; LANDMARK_COUNT]);
        assert_eq!(policy.curled_count(&flat), Some(0));
    }

    #[test]
    fn incomplete_hands_are_ignored() {
        let policy = FistPolicy::default();
        let partial = HandLandmarks::new(vec![[0.0, 1.0]; 12]);
        assert_eq!(policy.classify(&partial), None);
        assert!(policy.classify_all(&[partial], 2).is_empty());
    }

    #[test]
    fn classify_all_honours_max_hands() {
        let policy = FistPolicy::default();
        let hands = [open(), fist(), fist()];
        assert_eq!(policy.classify_all(&hands, 1), vec![HandGesture::Open]);
        assert_eq!(
            policy.classify_all(&hands, 2),
            vec![HandGesture::Open, HandGesture::Fist]
        );
    }

    #[test]
    fn rejects_out_of_range_thresholds() {
        assert!(FistPolicy::new(0, true).is_err());
        assert!(FistPolicy::new(6, true).is_err());
        assert!(FistPolicy::new(5, false).is_err());
        assert!(FistPolicy::new(5, true).is_ok());
    }
}
