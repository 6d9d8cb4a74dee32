//! Per-frame detect → report step.

use std::time::Instant;

use anyhow::{Context, Result};
use ml_core::HandDetector;
use tracing::{debug, warn};
use video_ingest::Frame;

use crate::tracking::{
    annotation,
    report::{FrameReport, HandednessPolicy},
};

/// Result of processing one frame.
#[derive(Debug, Default)]
pub(crate) struct ProcessedFrame {
    /// Compact JSON report, present only when at least one hand was found.
    pub payload: Option<Vec<u8>>,
    pub hands: usize,
}

pub(crate) struct FramePipeline<D> {
    detector: D,
    policy: HandednessPolicy,
}

impl<D: HandDetector> FramePipeline<D> {
    pub fn new(detector: D, policy: HandednessPolicy) -> Self {
        Self { detector, policy }
    }

    /// Detect hands on `frame`, draw their skeletons onto it, and build the
    /// report to send. Detector failures are returned, not swallowed.
    pub fn process(&mut self, frame: &mut Frame) -> Result<ProcessedFrame> {
        let rgb = frame.to_rgb();
        let mut detections = self
            .detector
            .detect(&rgb.data, rgb.width, rgb.height)
            .context("hand detector failed")?;
        let found = detections.len();
        detections.retain(|detection| detection.is_finite());
        if detections.len() < found {
            warn!(
                "Dropped {} hand(s) with non-finite landmarks",
                found - detections.len()
            );
        }

        for detection in &detections {
            annotation::draw_hand_skeleton(frame, detection)?;
        }
        if detections.is_empty() {
            return Ok(ProcessedFrame::default());
        }

        let report =
            FrameReport::from_detections(&detections, frame.width, frame.height, self.policy);
        let payload = report
            .to_json_bytes()
            .context("failed to encode frame report")?;
        debug!(
            "{} hand(s) in frame, report is {} bytes",
            report.hands.len(),
            payload.len()
        );
        Ok(ProcessedFrame {
            payload: Some(payload),
            hands: report.hands.len(),
        })
    }
}

/// Exponentially smoothed frames-per-second estimate.
#[derive(Debug, Default)]
pub(crate) struct FpsMeter {
    smoothed: f32,
    last: Option<Instant>,
}

impl FpsMeter {
    pub fn tick(&mut self) -> f32 {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> f32 {
        if let Some(last) = self.last.replace(now) {
            let elapsed = now.duration_since(last).as_secs_f32();
            if elapsed > 0.0 {
                let instant = 1.0 / elapsed;
                self.smoothed = if self.smoothed == 0.0 {
                    instant
                } else {
                    0.9 * self.smoothed + 0.1 * instant
                };
            }
        }
        self.smoothed
    }
}
