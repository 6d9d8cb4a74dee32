use anyhow::Error;
use chrono::Utc;
use thiserror::Error;

/// Owned frame captured from a video source.
#[derive(Clone, Debug)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: i32,
    pub height: i32,
    pub timestamp_ms: i64,
    pub format: FrameFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameFormat {
    Bgr8,
    Rgb8,
}

impl FrameFormat {
    pub fn channels(self) -> usize {
        match self {
            FrameFormat::Bgr8 | FrameFormat::Rgb8 => 3,
        }
    }
}

/// Capture resolution requested from a device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub width: i32,
    pub height: i32,
}

/// Resolution requested when the device is opened.
pub const CAPTURE_PRESET: Resolution = Resolution {
    width: 640,
    height: 480,
};

/// Resolution handed back to the device right before it is released.
pub const RELEASE_PRESET: Resolution = Resolution {
    width: 1920,
    height: 1080,
};

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open video source {uri:?}")]
    Open { uri: String },
    #[error("video source is closed")]
    Closed,
    #[error("frame buffer holds {actual} bytes, expected {expected}")]
    InvalidFrame { expected: usize, actual: usize },
    #[error(transparent)]
    Other(#[from] Error),
}

impl Frame {
    /// Wrap a pixel buffer, checking that its length matches the dimensions.
    pub fn new(
        data: Vec<u8>,
        width: i32,
        height: i32,
        format: FrameFormat,
    ) -> Result<Self, CaptureError> {
        let expected = Self::expected_len(width, height, format);
        if width <= 0 || height <= 0 || data.len() != expected {
            return Err(CaptureError::InvalidFrame {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            timestamp_ms: Utc::now().timestamp_millis(),
            format,
        })
    }

    /// Black frame of the given size.
    pub fn blank(width: i32, height: i32, format: FrameFormat) -> Self {
        let len = Self::expected_len(width, height, format);
        Self {
            data: vec![0; len],
            width: width.max(0),
            height: height.max(0),
            timestamp_ms: Utc::now().timestamp_millis(),
            format,
        }
    }

    /// Copy of the frame with RGB channel order, as expected by landmark models.
    pub fn to_rgb(&self) -> Frame {
        let data = match self.format {
            FrameFormat::Rgb8 => self.data.clone(),
            FrameFormat::Bgr8 => swap_red_blue(&self.data),
        };
        Frame {
            data,
            width: self.width,
            height: self.height,
            timestamp_ms: self.timestamp_ms,
            format: FrameFormat::Rgb8,
        }
    }

    fn expected_len(width: i32, height: i32, format: FrameFormat) -> usize {
        (width.max(0) as usize) * (height.max(0) as usize) * format.channels()
    }
}

fn swap_red_blue(input: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(input.len());
    for chunk in input.chunks_exact(3) {
        output.push(chunk[2]);
        output.push(chunk[1]);
        output.push(chunk[0]);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_mismatched_buffer() {
        let err = Frame::new(vec![0; 10], 2, 2, FrameFormat::Bgr8).unwrap_err();
        assert!(matches!(
            err,
            CaptureError::InvalidFrame {
                expected: 12,
                actual: 10
            }
        ));
    }

    #[test]
    fn new_rejects_empty_dimensions() {
        assert!(Frame::new(Vec::new(), 0, 480, FrameFormat::Bgr8).is_err());
    }

    #[test]
    fn to_rgb_swaps_channels_of_bgr_frames() {
        let frame = Frame::new(vec![1, 2, 3, 4, 5, 6], 2, 1, FrameFormat::Bgr8).unwrap();
        let rgb = frame.to_rgb();
        assert_eq!(rgb.format, FrameFormat::Rgb8);
        assert_eq!(rgb.data, vec![3, 2, 1, 6, 5, 4]);
        assert_eq!((rgb.width, rgb.height), (frame.width, frame.height));
        assert_eq!(rgb.timestamp_ms, frame.timestamp_ms);
    }

    #[test]
    fn to_rgb_keeps_rgb_frames() {
        let frame = Frame::new(vec![9, 8, 7], 1, 1, FrameFormat::Rgb8).unwrap();
        assert_eq!(frame.to_rgb().data, vec![9, 8, 7]);
    }

    #[test]
    fn presets_differ() {
        assert_eq!((CAPTURE_PRESET.width, CAPTURE_PRESET.height), (640, 480));
        assert_eq!((RELEASE_PRESET.width, RELEASE_PRESET.height), (1920, 1080));
    }
}
