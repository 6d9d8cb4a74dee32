//! Hand landmark topology.

/// Number of landmarks produced for every detected hand.
pub const HAND_LANDMARK_COUNT: usize = 21;

/// Names for the hand landmarks, in the order landmark models emit them.
///
/// - **CMC**: carpometacarpal joint, the lowest thumb joint near the wrist.
/// - **MCP**: metacarpophalangeal joint, the knuckle joint near the palm.
/// - **PIP** / **DIP**: proximal and distal interphalangeal joints.
/// - **Tip**: the end of the finger, past the DIP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HandLandmark {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexFingerMcp,
    IndexFingerPip,
    IndexFingerDip,
    IndexFingerTip,
    MiddleFingerMcp,
    MiddleFingerPip,
    MiddleFingerDip,
    MiddleFingerTip,
    RingFingerMcp,
    RingFingerPip,
    RingFingerDip,
    RingFingerTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

impl HandLandmark {
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Bones drawn between landmarks when rendering a hand skeleton.
pub const HAND_CONNECTIONS: &[(HandLandmark, HandLandmark)] = {
    use HandLandmark::*;
    &[
        // Palm:
        (Wrist, ThumbCmc),
        (Wrist, IndexFingerMcp),
        (IndexFingerMcp, MiddleFingerMcp),
        (MiddleFingerMcp, RingFingerMcp),
        (RingFingerMcp, PinkyMcp),
        (Wrist, PinkyMcp),
        // Thumb:
        (ThumbCmc, ThumbMcp),
        (ThumbMcp, ThumbIp),
        (ThumbIp, ThumbTip),
        // Index:
        (IndexFingerMcp, IndexFingerPip),
        (IndexFingerPip, IndexFingerDip),
        (IndexFingerDip, IndexFingerTip),
        // Middle:
        (MiddleFingerMcp, MiddleFingerPip),
        (MiddleFingerPip, MiddleFingerDip),
        (MiddleFingerDip, MiddleFingerTip),
        // Ring:
        (RingFingerMcp, RingFingerPip),
        (RingFingerPip, RingFingerDip),
        (RingFingerDip, RingFingerTip),
        // Pinky:
        (PinkyMcp, PinkyPip),
        (PinkyPip, PinkyDip),
        (PinkyDip, PinkyTip),
    ]
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_follow_model_order() {
        assert_eq!(HandLandmark::Wrist.index(), 0);
        assert_eq!(HandLandmark::MiddleFingerMcp.index(), 9);
        assert_eq!(HandLandmark::PinkyTip.index(), HAND_LANDMARK_COUNT - 1);
    }

    #[test]
    fn every_landmark_is_connected() {
        let mut seen = [false; HAND_LANDMARK_COUNT];
        for (a, b) in HAND_CONNECTIONS {
            assert_ne!(a, b);
            seen[a.index()] = true;
            seen[b.index()] = true;
        }
        assert!(seen.iter().all(|s| *s));
        assert_eq!(HAND_CONNECTIONS.len(), 21);
    }
}
