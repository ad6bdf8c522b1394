mod common;
mod ort;
mod palm;

pub use self::ort::OrtHandLandmarker;
pub use self::palm::{PalmDetector, PalmRegion};

use crate::types::{DetectedHand, Frame};

/// Hand landmark extraction capability.
///
/// Implementations return at most `max_hands` hands, each with 21 points
/// normalized to the frame.
pub trait HandLandmarker: Send + 'static {
    fn detect(&mut self, frame: &Frame, max_hands: usize) -> anyhow::Result<Vec<DetectedHand>>;
}

impl<T: HandLandmarker + ?Sized> HandLandmarker for Box<T> {
    fn detect(&mut self, frame: &Frame, max_hands: usize) -> anyhow::Result<Vec<DetectedHand>> {
        (**self).detect(frame, max_hands)
    }
}

/// Runs the landmarker, treating detector failures as an empty result.
pub fn detect_or_empty<L: HandLandmarker + ?Sized>(
    landmarker: &mut L,
    frame: &Frame,
    max_hands: usize,
) -> Vec<DetectedHand> {
    match landmarker.detect(frame, max_hands) {
        Ok(mut hands) => {
            hands.truncate(max_hands);
            hands
        }
        Err(err) => {
            log::warn!("hand landmark detection failed: {err:?}");
            Vec::new()
        }
    }
}
