use std::path::Path;

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::{
    HandLandmarker,
    common::{self, HANDPOSE_INPUT_SIZE},
    palm::{PalmDetector, crop_from_palm},
};
use crate::{
    config::DetectorConfig,
    types::{DetectedHand, Frame, Handedness},
};

/// Two-stage landmarker: palm detection, then a hand pose estimate on a
/// rotated crop around each palm.
pub struct OrtHandLandmarker {
    handpose: Session,
    palm_detector: PalmDetector,
    min_confidence: f32,
}

impl OrtHandLandmarker {
    pub fn new(
        handpose_model_path: &Path,
        palm_detector_model_path: &Path,
        cfg: DetectorConfig,
    ) -> Result<Self> {
        let handpose = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(handpose_model_path)
            .with_context(|| {
                format!(
                    "failed to load hand pose model from {}",
                    handpose_model_path.display()
                )
            })?;

        let min_confidence = cfg.min_hand_confidence;
        let palm_detector = PalmDetector::new(palm_detector_model_path, cfg)?;

        log::info!(
            "hand landmarker ready using {} and palm detector {}",
            handpose_model_path.display(),
            palm_detector_model_path.display()
        );

        Ok(Self {
            handpose,
            palm_detector,
            min_confidence,
        })
    }

    fn estimate(
        &mut self,
        frame: &Frame,
        palm_score: f32,
        crop: ((f32, f32), f32, f32),
    ) -> Result<DetectedHand> {
        let (center, side, angle) = crop;
        let (input, transform) =
            common::prepare_rotated_crop(frame, center, side, angle, HANDPOSE_INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .handpose
            .run(ort::inputs![tensor])
            .context("failed to run hand pose session")?;

        if outputs.len() < 1 {
            return Err(anyhow!("hand pose model returned no outputs"));
        }

        let coords = outputs[0].try_extract_array::<f32>()?;
        let flattened: Vec<f32> = coords.iter().copied().collect();
        let landmarks = common::decode_landmarks(&flattened)?;

        let scalar_output = |idx: usize| {
            if outputs.len() > idx {
                outputs[idx]
                    .try_extract_array::<f32>()
                    .ok()
                    .and_then(|arr| arr.iter().next().copied())
                    .unwrap_or(0.0)
            } else {
                0.0
            }
        };
        let confidence = scalar_output(1);
        let handedness = scalar_output(2);

        Ok(DetectedHand {
            points: transform.normalize(&landmarks),
            handedness: Handedness::from_score(handedness),
            confidence: (confidence * palm_score).clamp(0.0, 1.0),
        })
    }
}

impl HandLandmarker for OrtHandLandmarker {
    fn detect(&mut self, frame: &Frame, max_hands: usize) -> Result<Vec<DetectedHand>> {
        let regions = self.palm_detector.detect(frame)?;

        let mut hands = Vec::with_capacity(max_hands);
        for region in regions.iter().take(max_hands) {
            let hand = self.estimate(frame, region.score, crop_from_palm(region))?;
            if hand.confidence >= self.min_confidence {
                hands.push(hand);
            } else {
                log::debug!(
                    "dropping {} hand with confidence {:.2}",
                    hand.handedness.label(),
                    hand.confidence
                );
            }
        }
        Ok(hands)
    }
}
