use std::path::Path;

use anyhow::Result;
use tch::{self, Device, IValue, Kind, Tensor};
use tracing::{debug, warn};

use crate::{
    hand::{
        Classification, DetectorError, DetectorOptions, HandDetection, HandDetector, Handedness,
        NormalizedLandmark,
    },
    landmarks::HAND_LANDMARK_COUNT,
};

/// TorchScript-backed hand landmark detector.
///
/// The module takes a `[1, 3, H, W]` float RGB tensor scaled to `[0, 1]` and
/// returns a tuple `(landmarks [N, 21, 3], presence [N], handedness [N])`,
/// where landmark x/y are normalized to the input image and `handedness` is
/// the probability that the hand is a right hand.
pub struct TorchHandDetector {
    module: tch::CModule,
    device: Device,
    input_size: (i64, i64),
    options: DetectorOptions,
    tracking: bool,
}

impl TorchHandDetector {
    /// Load a TorchScript module and prepare it for execution on `device`.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        device: Device,
        input_size: (i64, i64),
        options: DetectorOptions,
    ) -> Result<Self> {
        options.validate()?;
        let mut module = tch::CModule::load_on_device(model_path, device)?;
        module.set_eval();
        Ok(Self {
            module,
            device,
            input_size,
            options,
            tracking: false,
        })
    }

    /// Converts an RGB frame into a normalized NCHW tensor at the model input size.
    pub fn rgb_to_tensor(
        &self,
        rgb: &[u8],
        width: i32,
        height: i32,
    ) -> Result<Tensor, DetectorError> {
        let expected = (width.max(0) as usize) * (height.max(0) as usize) * 3;
        if width <= 0 || height <= 0 || rgb.len() != expected {
            return Err(DetectorError::InvalidInput(format!(
                "unexpected frame buffer size: got {} bytes, expected {expected}",
                rgb.len()
            )));
        }

        let (in_w, in_h) = self.input_size;
        let tensor = Tensor::from_slice(rgb)
            .to_device(self.device)
            .to_kind(Kind::Float)
            .view([1, height as i64, width as i64, 3])
            .permute([0, 3, 1, 2])
            / 255.0;

        if (width as i64, height as i64) == (in_w, in_h) {
            return Ok(tensor);
        }
        Ok(tensor.upsample_bilinear2d([in_h, in_w], false, None::<f64>, None::<f64>))
    }

    fn forward(&self, input: &Tensor) -> Result<(Tensor, Tensor, Tensor), DetectorError> {
        let output = self
            .module
            .forward_is(&[IValue::Tensor(input.shallow_clone())])
            .map_err(|err| DetectorError::Model(err.to_string()))?;

        let IValue::Tuple(mut items) = output else {
            return Err(DetectorError::InvalidOutput(
                "expected a (landmarks, presence, handedness) tuple".to_string(),
            ));
        };
        if items.len() != 3 {
            return Err(DetectorError::InvalidOutput(format!(
                "expected 3 outputs, got {}",
                items.len()
            )));
        }

        let handedness = take_tensor(items.pop(), "handedness")?;
        let presence = take_tensor(items.pop(), "presence")?;
        let landmarks = take_tensor(items.pop(), "landmarks")?;
        Ok((landmarks, presence, handedness))
    }
}

impl HandDetector for TorchHandDetector {
    fn detect(
        &mut self,
        rgb: &[u8],
        width: i32,
        height: i32,
    ) -> Result<Vec<HandDetection>, DetectorError> {
        let input = self.rgb_to_tensor(rgb, width, height)?;
        let (landmarks, presence, handedness) = tch::no_grad(|| self.forward(&input))?;

        let shape = landmarks.size();
        if shape.len() != 3 || shape[1] != HAND_LANDMARK_COUNT as i64 || shape[2] != 3 {
            return Err(DetectorError::InvalidOutput(format!(
                "landmark tensor has shape {shape:?}, expected [N, {HAND_LANDMARK_COUNT}, 3]"
            )));
        }
        let count = shape[0] as usize;

        let coords = to_vec(&landmarks)?;
        let presence = to_vec(&presence)?;
        let handedness = to_vec(&handedness)?;
        if presence.len() != count || handedness.len() != count {
            return Err(DetectorError::InvalidOutput(format!(
                "{count} landmark set(s) but {} presence and {} handedness score(s)",
                presence.len(),
                handedness.len()
            )));
        }

        let threshold = self.options.threshold(self.tracking);
        let mut detections = Vec::with_capacity(count.min(self.options.max_num_hands));
        for index in 0..count {
            if !self.options.accepts(presence[index], self.tracking) {
                continue;
            }
            let base = index * HAND_LANDMARK_COUNT * 3;
            let points = coords[base..base + HAND_LANDMARK_COUNT * 3]
                .chunks_exact(3)
                .map(|p| NormalizedLandmark::new(p[0], p[1], p[2]))
                .collect();
            let right = handedness[index];
            let handedness = if right >= 0.5 {
                Classification {
                    label: Handedness::Right,
                    score: right,
                }
            } else {
                Classification {
                    label: Handedness::Left,
                    score: 1.0 - right,
                }
            };
            let detection = HandDetection::from_vec(points, handedness)?;
            if !detection.is_finite() {
                warn!("dropping hand candidate {index} with non-finite model output");
                continue;
            }
            detections.push(detection);
            if detections.len() >= self.options.max_num_hands {
                break;
            }
        }

        self.tracking = !detections.is_empty();
        debug!(
            "hand detector kept {}/{count} candidate(s) at threshold {threshold:.2}",
            detections.len()
        );
        Ok(detections)
    }
}

fn take_tensor(value: Option<IValue>, name: &str) -> Result<Tensor, DetectorError> {
    match value {
        Some(IValue::Tensor(tensor)) => Ok(tensor),
        _ => Err(DetectorError::InvalidOutput(format!(
            "{name} output is not a tensor"
        ))),
    }
}

fn to_vec(tensor: &Tensor) -> Result<Vec<f32>, DetectorError> {
    let flat = tensor
        .to_device(Device::Cpu)
        .to_kind(Kind::Float)
        .contiguous()
        .view([-1]);
    Vec::<f32>::try_from(&flat).map_err(|err| DetectorError::Model(err.to_string()))
}
