//! Frame acquisition for the hand streaming pipeline.
//!
//! Capture is pull-based and blocking: the caller asks a [`FrameSource`] for
//! one frame per loop iteration. The OpenCV camera lives behind the
//! `with-opencv` feature so the rest of the workspace builds and tests without
//! native OpenCV libraries.

#[cfg(feature = "with-opencv")]
mod camera;
mod types;

#[cfg(feature = "with-opencv")]
pub use camera::Camera;
pub use types::{CAPTURE_PRESET, CaptureError, Frame, FrameFormat, RELEASE_PRESET, Resolution};

/// A source of frames pulled one at a time by the capture loop.
pub trait FrameSource {
    /// Pull the next frame.
    ///
    /// `Ok(None)` signals a transient empty read; callers skip the iteration
    /// and try again.
    fn read(&mut self) -> Result<Option<Frame>, CaptureError>;

    /// Whether the underlying device is still open.
    fn is_open(&self) -> bool;

    /// Release the device. Calling this more than once is a no-op.
    fn release(&mut self);
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn read(&mut self) -> Result<Option<Frame>, CaptureError> {
        (**self).read()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn release(&mut self) {
        (**self).release()
    }
}
