//! Per-frame landmark report sent to the client.

use clap::ValueEnum;
use ml_core::{HandDetection, Handedness, NormalizedLandmark};
use serde::{Deserialize, Serialize};

/// How the detector's handedness label maps onto the reported label.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum HandednessPolicy {
    /// Report the opposite of the detected hand. Front-facing cameras show a
    /// mirrored image, so the model's label is swapped back for the viewer.
    #[default]
    Mirror,
    /// Report the detector's label unchanged.
    Passthrough,
}

impl HandednessPolicy {
    pub fn apply(self, reported: Handedness) -> Handedness {
        match self {
            HandednessPolicy::Mirror => reported.opposite(),
            HandednessPolicy::Passthrough => reported,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub id: u8,
    pub x: i32,
    pub y: i32,
    pub z: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hand {
    #[serde(rename = "type")]
    pub label: Handedness,
    pub landmarks: Vec<Landmark>,
}

/// All hands seen in one frame, in detector order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    pub hands: Vec<Hand>,
}

/// Scale a normalized landmark to pixel coordinates, truncating toward zero.
/// Depth is passed through unscaled.
pub fn scale_landmark(id: u8, landmark: &NormalizedLandmark, width: i32, height: i32) -> Landmark {
    Landmark {
        id,
        x: (f64::from(landmark.x) * f64::from(width)) as i32,
        y: (f64::from(landmark.y) * f64::from(height)) as i32,
        z: landmark.z,
    }
}

impl Hand {
    pub fn from_detection(
        detection: &HandDetection,
        width: i32,
        height: i32,
        policy: HandednessPolicy,
    ) -> Self {
        let landmarks = detection
            .landmarks
            .iter()
            .enumerate()
            .map(|(id, lm)| scale_landmark(id as u8, lm, width, height))
            .collect();
        Self {
            label: policy.apply(detection.handedness.label),
            landmarks,
        }
    }
}

impl FrameReport {
    pub fn from_detections(
        detections: &[HandDetection],
        width: i32,
        height: i32,
        policy: HandednessPolicy,
    ) -> Self {
        Self {
            hands: detections
                .iter()
                .map(|det| Hand::from_detection(det, width, height, policy))
                .collect(),
        }
    }

    /// Compact JSON encoding used on the wire.
    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use ml_core::{Classification, HAND_LANDMARK_COUNT};

    use super::*;

    /// One hand with every landmark at the origin except #9.
    pub(crate) fn detection_with_middle_mcp(
        label: Handedness,
        mcp: NormalizedLandmark,
    ) -> HandDetection {
        let mut landmarks = [NormalizedLandmark::default(); HAND_LANDMARK_COUNT];
        landmarks[9] = mcp;
        HandDetection::new(landmarks, Classification { label, score: 0.97 })
    }

    #[test]
    fn mirror_policy_swaps_and_passthrough_keeps() {
        for hand in [Handedness::Left, Handedness::Right] {
            assert_eq!(HandednessPolicy::Mirror.apply(hand), hand.opposite());
            assert_eq!(
                HandednessPolicy::Mirror.apply(HandednessPolicy::Mirror.apply(hand)),
                hand
            );
            assert_eq!(HandednessPolicy::Passthrough.apply(hand), hand);
        }
    }

    #[test]
    fn scaling_truncates_to_pixels() {
        let lm = NormalizedLandmark::new(0.5, 0.25, -0.03);
        let scaled = scale_landmark(4, &lm, 641, 479);
        assert_eq!(scaled.x, 320);
        assert_eq!(scaled.y, 119);
        assert_eq!(scaled.z, -0.03);

        let scaled = scale_landmark(4, &lm, 640, 480);
        assert_eq!((scaled.x, scaled.y), (320, 120));
    }

    #[test]
    fn scaling_tolerates_landmarks_outside_the_frame() {
        let lm = NormalizedLandmark::new(-0.01, 1.02, 0.0);
        let scaled = scale_landmark(0, &lm, 640, 480);
        assert_eq!((scaled.x, scaled.y), (-6, 489));
    }

    #[test]
    fn every_hand_carries_ids_zero_to_twenty_in_order() {
        let detections = vec![
            detection_with_middle_mcp(Handedness::Left, NormalizedLandmark::new(0.1, 0.1, 0.0)),
            detection_with_middle_mcp(Handedness::Right, NormalizedLandmark::new(0.9, 0.9, 0.0)),
        ];
        let report =
            FrameReport::from_detections(&detections, 640, 480, HandednessPolicy::Mirror);

        assert_eq!(report.hands.len(), 2);
        for hand in &report.hands {
            let ids: Vec<u8> = hand.landmarks.iter().map(|lm| lm.id).collect();
            assert_eq!(ids, (0..21).collect::<Vec<u8>>());
        }
        assert_eq!(report.hands[0].label, Handedness::Right);
        assert_eq!(report.hands[1].label, Handedness::Left);
    }

    #[test]
    fn right_hand_is_reported_as_left_with_pixel_landmarks() {
        let detection =
            detection_with_middle_mcp(Handedness::Right, NormalizedLandmark::new(0.5, 0.5, -0.1));
        let report = FrameReport::from_detections(&[detection], 640, 480, HandednessPolicy::Mirror);
        let json = String::from_utf8(report.to_json_bytes().unwrap()).unwrap();

        assert!(json.starts_with(
            r#"{"hands":[{"type":"Left","landmarks":[{"id":0,"x":0,"y":0,"z":0.0},"#
        ));
        assert!(json.contains(r#"{"id":9,"x":320,"y":240,"z":-0.1}"#));
        assert!(json.ends_with(r#"{"id":20,"x":0,"y":0,"z":0.0}]}]}"#));
        assert!(!json.contains('\n'));
    }

    #[test]
    fn report_decodes_back_from_wire_json() {
        let detection =
            detection_with_middle_mcp(Handedness::Left, NormalizedLandmark::new(0.25, 0.75, 0.5));
        let report =
            FrameReport::from_detections(&[detection], 320, 240, HandednessPolicy::Passthrough);
        let decoded: FrameReport =
            serde_json::from_slice(&report.to_json_bytes().unwrap()).unwrap();
        assert_eq!(decoded, report);
        assert_eq!(decoded.hands[0].label, Handedness::Left);
        assert_eq!(decoded.hands[0].landmarks[9].x, 80);
        assert_eq!(decoded.hands[0].landmarks[9].y, 180);
    }
}
