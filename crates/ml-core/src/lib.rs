//! Hand landmark detection for the streaming app.
//!
//! The model itself is an external collaborator: anything implementing
//! [`HandDetector`] can drive the pipeline. Enable the `with-tch` feature to
//! pull in the TorchScript-backed [`detector::TorchHandDetector`].

mod hand;
mod landmarks;

#[cfg(feature = "with-tch")]
pub mod detector;

pub use hand::{
    Classification, DetectorError, DetectorOptions, HandDetection, HandDetector, Handedness,
    NormalizedLandmark,
};
pub use landmarks::{HAND_CONNECTIONS, HAND_LANDMARK_COUNT, HandLandmark};

#[cfg(feature = "with-tch")]
pub use tch;
