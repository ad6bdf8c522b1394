mod knn;
mod labels;
mod onnx;

pub use self::knn::{NearestNeighbor, load_dataset};
pub use self::labels::{alphabet_labels, load_action_labels, load_label_file};
pub use self::onnx::{OnnxImageClassifier, OnnxSequenceModel};

use image::RgbaImage;

/// Single-image classifier. Returns one score per class.
pub trait ImageClassifier: Send + 'static {
    fn classify(&mut self, canvas: &RgbaImage) -> anyhow::Result<Vec<f32>>;
}

/// Classifier over a window of per-frame keypoint vectors, oldest first.
/// Returns one confidence per class.
pub trait SequenceModel: Send + 'static {
    fn predict(&mut self, window: &[Vec<f32>]) -> anyhow::Result<Vec<f32>>;
}

/// Index and value of the largest score. NaN scores never win.
pub fn argmax(scores: &[f32]) -> Option<(usize, f32)> {
    scores
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, score)| !score.is_nan())
        .fold(None, |best, (idx, score)| match best {
            Some((_, top)) if top >= score => best,
            _ => Some((idx, score)),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argmax_picks_first_of_ties_and_skips_nan() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), Some((1, 0.7)));
        assert_eq!(argmax(&[0.5, 0.5]), Some((0, 0.5)));
        assert_eq!(argmax(&[f32::NAN, 0.3]), Some((1, 0.3)));
        assert_eq!(argmax(&[]), None);
    }
}
