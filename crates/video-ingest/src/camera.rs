//! OpenCV-backed camera capture.

use chrono::Utc;
use opencv::{
    core::{MatTraitConstManual, Size},
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTrait, VideoCaptureTraitConst},
};
use tracing::{debug, info, warn};

use crate::{
    FrameSource,
    types::{CaptureError, Frame, FrameFormat, RELEASE_PRESET, Resolution},
};

/// Camera handle that hands out one frame per [`FrameSource::read`] call.
///
/// The device is released exactly once, either through
/// [`FrameSource::release`] or when the handle is dropped.
pub struct Camera {
    uri: String,
    cap: Option<VideoCapture>,
    scratch: Mat,
}

impl Camera {
    /// Open `uri` (a device index such as `0`, `/dev/video0`, or a file path)
    /// and request `resolution` from the driver.
    pub fn open(uri: &str, resolution: Resolution) -> Result<Self, CaptureError> {
        let mut cap = open_video_capture(uri)?;
        configure_camera(&mut cap, resolution);

        let actual = negotiated_size(&cap);
        if actual.width != resolution.width || actual.height != resolution.height {
            warn!(
                "camera {uri} negotiated {}x{} instead of {}x{}",
                actual.width, actual.height, resolution.width, resolution.height
            );
        } else {
            info!("camera {uri} opened at {}x{}", actual.width, actual.height);
        }

        Ok(Self {
            uri: uri.to_string(),
            cap: Some(cap),
            scratch: Mat::default(),
        })
    }
}

impl FrameSource for Camera {
    fn read(&mut self) -> Result<Option<Frame>, CaptureError> {
        let cap = self.cap.as_mut().ok_or(CaptureError::Closed)?;

        let grabbed = cap
            .read(&mut self.scratch)
            .map_err(|e| CaptureError::Other(e.into()))?;
        if !grabbed {
            return Ok(None);
        }

        let size = self
            .scratch
            .size()
            .map_err(|e| CaptureError::Other(e.into()))?;
        if size.width <= 0 || size.height <= 0 {
            return Ok(None);
        }

        let data = self
            .scratch
            .data_bytes()
            .map_err(|e| CaptureError::Other(e.into()))?
            .to_vec();

        let mut frame = Frame::new(data, size.width, size.height, FrameFormat::Bgr8)?;
        frame.timestamp_ms = Utc::now().timestamp_millis();
        Ok(Some(frame))
    }

    fn is_open(&self) -> bool {
        self.cap
            .as_ref()
            .map(|cap| cap.is_opened().unwrap_or(false))
            .unwrap_or(false)
    }

    fn release(&mut self) {
        let Some(mut cap) = self.cap.take() else {
            return;
        };
        configure_camera(&mut cap, RELEASE_PRESET);
        if let Err(err) = cap.release() {
            warn!("failed to release camera {}: {err}", self.uri);
        } else {
            debug!("camera {} released", self.uri);
        }
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        self.release();
    }
}

/// Parse a `/dev/videoX` style URI and return the zero-based index if present.
pub(crate) fn parse_device_index(uri: &str) -> Option<i32> {
    if let Ok(index) = uri.parse::<i32>() {
        return Some(index);
    }
    if let Some(stripped) = uri.strip_prefix("/dev/video") {
        if !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit()) {
            return stripped.parse::<i32>().ok();
        }
    }
    None
}

/// Attempt to open a camera input either by index or URI.
fn open_video_capture(uri: &str) -> Result<VideoCapture, CaptureError> {
    if let Some(index) = parse_device_index(uri) {
        for backend in [videoio::CAP_V4L, videoio::CAP_ANY] {
            match VideoCapture::new(index, backend) {
                Ok(cap) => {
                    if cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? {
                        return Ok(cap);
                    }
                }
                Err(err) => {
                    warn!("failed to open device #{index} with backend {backend}: {err}");
                }
            }
        }
    }

    for backend in [videoio::CAP_V4L, videoio::CAP_ANY] {
        match VideoCapture::from_file(uri, backend) {
            Ok(cap) => {
                if cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? {
                    return Ok(cap);
                }
            }
            Err(err) => {
                warn!("failed to open {uri} with backend {backend}: {err}");
            }
        }
    }

    Err(CaptureError::Open {
        uri: uri.to_string(),
    })
}

fn configure_camera(cap: &mut VideoCapture, resolution: Resolution) {
    let _ = cap.set(videoio::CAP_PROP_FRAME_WIDTH, resolution.width as f64);
    let _ = cap.set(videoio::CAP_PROP_FRAME_HEIGHT, resolution.height as f64);
}

fn negotiated_size(cap: &VideoCapture) -> Size {
    let width = cap.get(videoio::CAP_PROP_FRAME_WIDTH).unwrap_or_default() as i32;
    let height = cap.get(videoio::CAP_PROP_FRAME_HEIGHT).unwrap_or_default() as i32;
    Size { width, height }
}
