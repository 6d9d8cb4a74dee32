//! Local preview of the annotated frames.

use thiserror::Error;
use tracing::debug;
use video_ingest::Frame;

/// Key code that ends the session when pressed in the preview window.
pub const ESC_KEY: i32 = 27;
/// How long the preview window waits for a key press per frame.
pub const KEY_POLL_MS: i32 = 5;
pub const WINDOW_TITLE: &str = "Hand Tracking";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SinkControl {
    Continue,
    Exit,
}

#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("preview window error: {0}")]
    Window(String),
}

/// Receives every annotated frame, whether or not it had hands.
pub trait FrameSink {
    fn show(&mut self, frame: &Frame) -> Result<SinkControl, DisplayError>;

    /// Close the sink. Calling this more than once is a no-op.
    fn close(&mut self);
}

impl<T: FrameSink + ?Sized> FrameSink for Box<T> {
    fn show(&mut self, frame: &Frame) -> Result<SinkControl, DisplayError> {
        (**self).show(frame)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Whether a polled key code is the exit key. Only the low byte is compared,
/// since some backends report modifier bits above it.
pub fn is_exit_key(key: i32) -> bool {
    key >= 0 && key & 0xFF == ESC_KEY
}

/// Sink used when no preview window is wanted. Never asks to exit.
#[derive(Debug, Default)]
pub struct HeadlessSink {
    shown: u64,
    closed: bool,
}

impl FrameSink for HeadlessSink {
    fn show(&mut self, _frame: &Frame) -> Result<SinkControl, DisplayError> {
        self.shown += 1;
        Ok(SinkControl::Continue)
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            debug!("Headless sink closed after {} frame(s)", self.shown);
        }
    }
}

#[cfg(feature = "with-opencv")]
pub use window::HighguiWindow;

#[cfg(feature = "with-opencv")]
mod window {
    use opencv::{
        core::{CV_8UC3, Mat, Scalar},
        highgui,
        prelude::*,
    };
    use tracing::{debug, warn};
    use video_ingest::{Frame, FrameFormat};

    use super::{DisplayError, FrameSink, KEY_POLL_MS, SinkControl, is_exit_key};

    /// OpenCV highgui window showing the annotated camera feed.
    pub struct HighguiWindow {
        title: String,
        canvas: Mat,
        open: bool,
    }

    impl HighguiWindow {
        pub fn open(title: &str) -> Result<Self, DisplayError> {
            highgui::named_window(title, highgui::WINDOW_AUTOSIZE).map_err(window_error)?;
            debug!("Opened preview window {title:?}");
            Ok(Self {
                title: title.to_string(),
                canvas: Mat::default(),
                open: true,
            })
        }

        fn upload(&mut self, frame: &Frame) -> Result<(), DisplayError> {
            let size = self.canvas.size().map_err(window_error)?;
            if size.width != frame.width || size.height != frame.height {
                self.canvas = Mat::new_rows_cols_with_default(
                    frame.height,
                    frame.width,
                    CV_8UC3,
                    Scalar::all(0.0),
                )
                .map_err(window_error)?;
            }

            let target = self.canvas.data_bytes_mut().map_err(window_error)?;
            if target.len() != frame.data.len() {
                return Err(DisplayError::Window(format!(
                    "frame holds {} bytes, window expects {}",
                    frame.data.len(),
                    target.len()
                )));
            }
            match frame.format {
                FrameFormat::Bgr8 => target.copy_from_slice(&frame.data),
                FrameFormat::Rgb8 => {
                    for (dst, src) in target
                        .chunks_exact_mut(3)
                        .zip(frame.data.chunks_exact(3))
                    {
                        dst[0] = src[2];
                        dst[1] = src[1];
                        dst[2] = src[0];
                    }
                }
            }
            Ok(())
        }
    }

    impl FrameSink for HighguiWindow {
        fn show(&mut self, frame: &Frame) -> Result<SinkControl, DisplayError> {
            if !self.open {
                return Err(DisplayError::Window(format!(
                    "window {:?} is closed",
                    self.title
                )));
            }
            self.upload(frame)?;
            highgui::imshow(&self.title, &self.canvas).map_err(window_error)?;
            let key = highgui::wait_key(KEY_POLL_MS).map_err(window_error)?;
            if is_exit_key(key) {
                debug!("Exit key pressed in {:?}", self.title);
                return Ok(SinkControl::Exit);
            }
            Ok(SinkControl::Continue)
        }

        fn close(&mut self) {
            if !self.open {
                return;
            }
            self.open = false;
            if let Err(err) = highgui::destroy_window(&self.title) {
                warn!("Failed to destroy window {:?}: {err}", self.title);
            }
        }
    }

    impl Drop for HighguiWindow {
        fn drop(&mut self) {
            self.close();
        }
    }

    fn window_error(err: opencv::Error) -> DisplayError {
        DisplayError::Window(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use video_ingest::FrameFormat;

    use super::*;

    #[test]
    fn only_escape_exits() {
        assert!(is_exit_key(ESC_KEY));
        assert!(is_exit_key(0x10_0000 | ESC_KEY));
        assert!(!is_exit_key(-1));
        assert!(!is_exit_key('q' as i32));
    }

    #[test]
    fn headless_sink_always_continues() {
        let mut sink = HeadlessSink::default();
        let frame = Frame::blank(4, 4, FrameFormat::Bgr8);
        for _ in 0..3 {
            assert_eq!(sink.show(&frame).unwrap(), SinkControl::Continue);
        }
        sink.close();
        sink.close();
        assert_eq!(sink.shown, 3);
        assert!(sink.closed);
    }
}
