use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::landmarks::HAND_LANDMARK_COUNT;

/// Left/right classification of a hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Handedness {
    Left,
    Right,
}

impl Handedness {
    /// The other hand.
    pub fn opposite(self) -> Self {
        match self {
            Handedness::Left => Handedness::Right,
            Handedness::Right => Handedness::Left,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Handedness::Left => "Left",
            Handedness::Right => "Right",
        }
    }
}

/// Landmark position as emitted by a model.
///
/// `x` and `y` are normalized to the input image (nominally `[0, 1]`, may
/// overshoot near the borders); `z` is relative depth with the wrist as origin.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NormalizedLandmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl NormalizedLandmark {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Top handedness class for a detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub label: Handedness,
    pub score: f32,
}

/// One detected hand: a full landmark set plus its handedness.
#[derive(Debug, Clone, PartialEq)]
pub struct HandDetection {
    pub landmarks: [NormalizedLandmark; HAND_LANDMARK_COUNT],
    pub handedness: Classification,
}

impl HandDetection {
    pub fn new(
        landmarks: [NormalizedLandmark; HAND_LANDMARK_COUNT],
        handedness: Classification,
    ) -> Self {
        Self {
            landmarks,
            handedness,
        }
    }

    /// Build a detection from a model's landmark list, which must contain
    /// exactly [`HAND_LANDMARK_COUNT`] entries.
    pub fn from_vec(
        landmarks: Vec<NormalizedLandmark>,
        handedness: Classification,
    ) -> Result<Self, DetectorError> {
        let count = landmarks.len();
        let landmarks: [NormalizedLandmark; HAND_LANDMARK_COUNT] =
            landmarks.try_into().map_err(|_| {
                DetectorError::InvalidOutput(format!(
                    "expected {HAND_LANDMARK_COUNT} landmarks per hand, got {count}"
                ))
            })?;
        Ok(Self::new(landmarks, handedness))
    }

    /// False when any coordinate or the handedness score is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.handedness.score.is_finite() && self.landmarks.iter().all(|lm| lm.is_finite())
    }
}

/// Confidence thresholds and limits applied by a detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorOptions {
    /// Minimum score for a hand to be reported on a fresh detection.
    pub min_detection_confidence: f32,
    /// Minimum score for a hand to keep being reported while tracked.
    pub min_tracking_confidence: f32,
    /// Maximum number of hands reported per frame.
    pub max_num_hands: usize,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
            max_num_hands: 2,
        }
    }
}

impl DetectorOptions {
    pub fn validate(&self) -> Result<(), DetectorError> {
        for (name, value) in [
            ("min_detection_confidence", self.min_detection_confidence),
            ("min_tracking_confidence", self.min_tracking_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(DetectorError::InvalidOptions(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.max_num_hands == 0 {
            return Err(DetectorError::InvalidOptions(
                "max_num_hands must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Threshold to apply given whether hands were present on the previous frame.
    pub fn threshold(&self, tracking: bool) -> f32 {
        if tracking {
            self.min_tracking_confidence
        } else {
            self.min_detection_confidence
        }
    }

    /// Whether a presence score clears the current threshold. NaN never does.
    pub fn accepts(&self, score: f32, tracking: bool) -> bool {
        score.is_finite() && score >= self.threshold(tracking)
    }
}

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("invalid detector options: {0}")]
    InvalidOptions(String),
    #[error("invalid detector input: {0}")]
    InvalidInput(String),
    #[error("unexpected detector output: {0}")]
    InvalidOutput(String),
    #[error("model error: {0}")]
    Model(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A hand landmark model.
///
/// Given one RGB8 image, returns zero or more hands in model order.
pub trait HandDetector {
    fn detect(
        &mut self,
        rgb: &[u8],
        width: i32,
        height: i32,
    ) -> Result<Vec<HandDetection>, DetectorError>;
}

impl<T: HandDetector + ?Sized> HandDetector for Box<T> {
    fn detect(
        &mut self,
        rgb: &[u8],
        width: i32,
        height: i32,
    ) -> Result<Vec<HandDetection>, DetectorError> {
        (**self).detect(rgb, width, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposite_is_an_involution() {
        for hand in [Handedness::Left, Handedness::Right] {
            assert_ne!(hand.opposite(), hand);
            assert_eq!(hand.opposite().opposite(), hand);
        }
    }

    #[test]
    fn labels_match_the_wire_names() {
        assert_eq!(Handedness::Left.label(), "Left");
        assert_eq!(Handedness::Right.label(), "Right");
    }

    #[test]
    fn serializes_as_plain_label() {
        assert_eq!(
            serde_json::to_string(&Handedness::Left).unwrap(),
            "\"Left\""
        );
    }

    #[test]
    fn from_vec_requires_full_landmark_set() {
        let class = Classification {
            label: Handedness::Left,
            score: 0.9,
        };
        let short = vec![NormalizedLandmark::default(); HAND_LANDMARK_COUNT - 1];
        assert!(matches!(
            HandDetection::from_vec(short, class),
            Err(DetectorError::InvalidOutput(_))
        ));

        let full = vec![NormalizedLandmark::new(0.1, 0.2, 0.3); HAND_LANDMARK_COUNT];
        let detection = HandDetection::from_vec(full, class).unwrap();
        assert_eq!(detection.landmarks[20], NormalizedLandmark::new(0.1, 0.2, 0.3));
    }

    #[test]
    fn default_options_are_valid() {
        let options = DetectorOptions::default();
        options.validate().unwrap();
        assert_eq!(options.threshold(false), 0.5);
        assert_eq!(options.threshold(true), 0.5);
    }

    #[test]
    fn nan_presence_never_passes_the_threshold() {
        let options = DetectorOptions {
            min_detection_confidence: 0.6,
            min_tracking_confidence: 0.3,
            ..DetectorOptions::default()
        };
        assert!(options.accepts(0.6, false));
        assert!(!options.accepts(0.5, false));
        assert!(options.accepts(0.5, true));
        assert!(!options.accepts(f32::NAN, false));
        assert!(!options.accepts(f32::NAN, true));
        assert!(!options.accepts(f32::INFINITY, true));
    }

    #[test]
    fn non_finite_coordinates_are_detected() {
        let class = Classification {
            label: Handedness::Right,
            score: 0.8,
        };
        let mut landmarks = [NormalizedLandmark::new(0.4, 0.6, -0.02); HAND_LANDMARK_COUNT];
        assert!(HandDetection::new(landmarks, class).is_finite());

        landmarks[9].z = f32::NAN;
        assert!(!HandDetection::new(landmarks, class).is_finite());

        landmarks[9].z = 0.0;
        landmarks[3].x = f32::NEG_INFINITY;
        assert!(!HandDetection::new(landmarks, class).is_finite());

        let nan_score = Classification {
            score: f32::NAN,
            ..class
        };
        let origin = [NormalizedLandmark::default(); HAND_LANDMARK_COUNT];
        assert!(!HandDetection::new(origin, nan_score).is_finite());
    }

    #[test]
    fn options_reject_out_of_range_values() {
        let options = DetectorOptions {
            min_tracking_confidence: 1.5,
            ..DetectorOptions::default()
        };
        assert!(options.validate().is_err());

        let options = DetectorOptions {
            max_num_hands: 0,
            ..DetectorOptions::default()
        };
        assert!(options.validate().is_err());
    }
}
