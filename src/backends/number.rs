use std::path::Path;

use super::GestureBackend;
use crate::{
    features::{normalize_landmarks, overlay_points, pixel_landmarks},
    landmarks::{HandLandmarker, detect_or_empty},
    models::{NearestNeighbor, load_dataset},
    overlay::{LabelPainter, RED, draw_skeleton},
    types::{Frame, ModelKind, Prediction},
};

const MAX_HANDS: usize = 2;
const ERROR_LABEL: &str = "Error";
const ERROR_MARKER: &str = "ERR: NO DATA";
const FAILED_HAND_LABEL: &str = "?";

/// Static pose backend: nearest neighbour over normalized landmark geometry.
pub struct NumberBackend {
    landmarker: Box<dyn HandLandmarker>,
    classifier: Option<NearestNeighbor>,
    painter: LabelPainter,
}

impl NumberBackend {
    /// Fits the classifier on the CSV dataset at `dataset_path`. A missing,
    /// empty or malformed dataset leaves the backend in degraded mode.
    pub fn new(
        landmarker: Box<dyn HandLandmarker>,
        dataset_path: &Path,
        painter: LabelPainter,
    ) -> Self {
        let classifier = match load_dataset(dataset_path).and_then(NearestNeighbor::fit) {
            Ok(knn) => {
                log::info!(
                    "number classifier fitted on {} samples of {} features from {}, classes {:?}",
                    knn.sample_count(),
                    knn.dim(),
                    dataset_path.display(),
                    knn.classes()
                );
                Some(knn)
            }
            Err(err) => {
                log::error!("number classifier unavailable: {err}");
                None
            }
        };
        Self::with_classifier(landmarker, classifier, painter)
    }

    pub fn with_classifier(
        landmarker: Box<dyn HandLandmarker>,
        classifier: Option<NearestNeighbor>,
        painter: LabelPainter,
    ) -> Self {
        Self {
            landmarker,
            classifier,
            painter,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.classifier.is_none()
    }
}

impl GestureBackend for NumberBackend {
    fn kind(&self) -> ModelKind {
        ModelKind::Number
    }

    fn predict(&mut self, frame: Frame) -> Prediction {
        let Some(classifier) = &self.classifier else {
            let mut frame = frame;
            self.painter.draw_text(&mut frame, ERROR_MARKER, (10, 50), 1.0, RED);
            return Prediction::new(frame, ERROR_LABEL);
        };

        let timestamp = frame.timestamp;
        let Some(mut image) = frame.to_image() else {
            return Prediction::unlabeled(frame);
        };
        // Mirror so the overlay matches an operator facing the camera.
        image::imageops::flip_horizontal_in_place(&mut image);
        let mut frame = Frame::from_image(image, timestamp);
        let (width, height) = (frame.width, frame.height);

        let hands = detect_or_empty(self.landmarker.as_mut(), &frame, MAX_HANDS);

        // With two hands the later one overwrites the label.
        let mut label = String::new();
        for hand in &hands {
            let features = normalize_landmarks(&pixel_landmarks(&hand.points, width, height));
            draw_skeleton(&mut frame, &overlay_points(&hand.points, width, height));

            label = match classifier.predict(&features) {
                Ok(predicted) => predicted.to_string(),
                Err(err) => {
                    log::warn!("number prediction failed: {err}");
                    FAILED_HAND_LABEL.to_string()
                }
            };
            log::debug!("number classifier predicted {label}");

            self.painter.draw_text(&mut frame, &label, (50, 50), 1.5, RED);
        }

        Prediction::new(frame, label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{features::NUM_LANDMARKS, types::DetectedHand};

    struct FixedHands(Vec<DetectedHand>);

    impl HandLandmarker for FixedHands {
        fn detect(
            &mut self,
            _frame: &Frame,
            max_hands: usize,
        ) -> anyhow::Result<Vec<DetectedHand>> {
            Ok(self.0.iter().take(max_hands).cloned().collect())
        }
    }

    fn landmarker(hands: Vec<DetectedHand>) -> Box<dyn HandLandmarker> {
        Box::new(FixedHands(hands))
    }

    fn backend(hands: Vec<DetectedHand>, knn: NearestNeighbor) -> NumberBackend {
        NumberBackend::with_classifier(landmarker(hands), Some(knn), LabelPainter::default())
    }

    /// Open palm spread to the right of the wrist.
    fn open_hand() -> DetectedHand {
        DetectedHand::new(
            (0..NUM_LANDMARKS)
                .map(|i| [0.3 + i as f32 * 0.01, 0.6 - i as f32 * 0.005, 0.0])
                .collect(),
        )
    }

    /// Fist: every point bunched straight above the wrist.
    fn fist() -> DetectedHand {
        DetectedHand::new(
            (0..NUM_LANDMARKS)
                .map(|i| [0.5, 0.6 - i as f32 * 0.004, 0.0])
                .collect(),
        )
    }

    fn features_of(hand: &DetectedHand) -> Vec<f32> {
        normalize_landmarks(&pixel_landmarks(&hand.points, 640, 480))
    }

    fn two_class_knn() -> NearestNeighbor {
        NearestNeighbor::fit(vec![
            (features_of(&fist()), "1".to_string()),
            (features_of(&open_hand()), "5".to_string()),
        ])
        .unwrap()
    }

    #[test]
    fn degraded_backend_reports_error_with_marker() {
        let mut backend = NumberBackend::new(
            landmarker(vec![open_hand()]),
            Path::new("/nonexistent/numbers.csv"),
            LabelPainter::default(),
        );
        assert!(backend.is_degraded());

        let frame = Frame::filled(320, 240, [0, 0, 0, 255]);
        let prediction = backend.predict(frame.clone());
        assert_eq!(prediction.label, "Error");
        assert_ne!(prediction.frame.rgba, frame.rgba);
    }

    #[test]
    fn no_hands_yields_empty_label() {
        let mut backend = backend(Vec::new(), two_class_knn());
        let prediction = backend.predict(Frame::filled(640, 480, [9, 9, 9, 255]));
        assert_eq!(prediction.label, "");
    }

    #[test]
    fn last_detected_hand_sets_the_label() {
        let mut open_last = backend(vec![fist(), open_hand()], two_class_knn());
        let prediction = open_last.predict(Frame::filled(640, 480, [0, 0, 0, 255]));
        assert_eq!(prediction.label, "5");

        let mut fist_last = backend(vec![open_hand(), fist()], two_class_knn());
        let prediction = fist_last.predict(Frame::filled(640, 480, [0, 0, 0, 255]));
        assert_eq!(prediction.label, "1");
    }

    #[test]
    fn classifier_failure_degrades_to_question_mark() {
        let knn = NearestNeighbor::fit(vec![(vec![0.0; 4], "1".to_string())]).unwrap();
        let mut backend = backend(vec![fist()], knn);
        let prediction = backend.predict(Frame::filled(640, 480, [0, 0, 0, 255]));
        assert_eq!(prediction.label, "?");
    }

    #[test]
    fn output_frame_is_mirrored() {
        let mut backend = backend(Vec::new(), two_class_knn());
        let mut image = image::RgbaImage::from_pixel(4, 1, image::Rgba([0, 0, 0, 255]));
        image.put_pixel(0, 0, image::Rgba([200, 0, 0, 255]));
        let prediction = backend.predict(Frame::from_image(image, std::time::Instant::now()));
        let mirrored = prediction.frame.to_image().unwrap();
        assert_eq!(mirrored.get_pixel(3, 0).0, [200, 0, 0, 255]);
        assert_eq!(mirrored.get_pixel(0, 0).0, [0, 0, 0, 255]);
    }
}
