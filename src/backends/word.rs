use super::GestureBackend;
use crate::{
    config::SequenceConfig,
    error::RecognitionError,
    features::{keypoint_vector, overlay_points},
    landmarks::{HandLandmarker, detect_or_empty},
    models::{SequenceModel, argmax},
    overlay::{GREEN, LabelPainter, draw_skeleton},
    types::{Frame, ModelKind, Prediction},
    window::SlidingWindow,
};

const MAX_HANDS: usize = 2;

/// Per-stream state of the sequence backend.
///
/// Every frame pushes one keypoint vector and bumps `frame_counter`.
/// Inference is due on every `stride`-th frame once the window is full. A
/// stable label only changes when an inference clears the threshold; an
/// unconfident round never clears it.
#[derive(Clone, Debug)]
pub struct SequenceState {
    window: SlidingWindow<Vec<f32>>,
    frame_counter: u64,
    stride: u64,
    last_label: String,
    last_confidence: f32,
}

impl SequenceState {
    pub fn new(window: usize, stride: u64) -> Self {
        Self {
            window: SlidingWindow::new(window),
            frame_counter: 0,
            stride: stride.max(1),
            last_label: String::new(),
            last_confidence: 0.0,
        }
    }

    /// Records one frame's keypoints. Returns whether inference should run on
    /// this frame.
    pub fn advance(&mut self, keypoints: Vec<f32>) -> bool {
        self.window.push(keypoints);
        self.frame_counter += 1;
        self.frame_counter % self.stride == 0 && self.window.is_full()
    }

    /// Applies one inference round. Returns the accepted class index, or
    /// `None` when the previous label is kept.
    pub fn accept(
        &mut self,
        scores: &[f32],
        actions: &[String],
        threshold: f32,
    ) -> Result<Option<usize>, RecognitionError> {
        let (index, confidence) = argmax(scores).ok_or_else(|| {
            RecognitionError::ClassificationFailure("sequence model returned no scores".into())
        })?;
        if confidence <= threshold {
            return Ok(None);
        }
        let label = actions.get(index).ok_or(RecognitionError::IndexOutOfRange {
            index,
            len: actions.len(),
        })?;
        self.last_label = label.clone();
        self.last_confidence = confidence;
        Ok(Some(index))
    }

    pub fn window(&mut self) -> &[Vec<f32>] {
        self.window.as_slice()
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    pub fn last_label(&self) -> &str {
        &self.last_label
    }

    pub fn last_confidence(&self) -> f32 {
        self.last_confidence
    }

    /// Overlay text for the stable label, if any.
    pub fn caption(&self) -> Option<String> {
        (!self.last_label.is_empty())
            .then(|| format!("{} ({:.2})", self.last_label, self.last_confidence))
    }
}

/// Sequence backend: a recurrent classifier over a sliding window of
/// two-hand keypoint vectors, run on a fixed cadence.
pub struct WordBackend {
    landmarker: Box<dyn HandLandmarker>,
    model: Box<dyn SequenceModel>,
    actions: Vec<String>,
    threshold: f32,
    state: SequenceState,
    painter: LabelPainter,
}

impl WordBackend {
    pub fn new(
        landmarker: Box<dyn HandLandmarker>,
        model: Box<dyn SequenceModel>,
        actions: Vec<String>,
        cfg: &SequenceConfig,
        painter: LabelPainter,
    ) -> Self {
        log::info!(
            "word backend ready: {} actions, window {}, stride {}, threshold {}",
            actions.len(),
            cfg.window,
            cfg.stride,
            cfg.threshold
        );
        Self {
            landmarker,
            model,
            actions,
            threshold: cfg.threshold,
            state: SequenceState::new(cfg.window, cfg.stride),
            painter,
        }
    }

    #[cfg(test)]
    fn state(&self) -> &SequenceState {
        &self.state
    }

    fn infer(&mut self) {
        log::trace!(
            "sequence inference at frame {} over {} entries",
            self.state.frame_counter(),
            self.state.window_len()
        );
        let scores = match self.model.predict(self.state.window()) {
            Ok(scores) => scores,
            Err(err) => {
                log::warn!("sequence inference failed: {err:#}");
                return;
            }
        };
        match self.state.accept(&scores, &self.actions, self.threshold) {
            Ok(Some(_)) => log::debug!(
                "word label now {} ({:.2})",
                self.state.last_label(),
                self.state.last_confidence()
            ),
            Ok(None) => log::debug!("unconfident sequence round, keeping previous label"),
            Err(err) => log::warn!("sequence prediction discarded: {err}"),
        }
    }
}

impl GestureBackend for WordBackend {
    fn kind(&self) -> ModelKind {
        ModelKind::Word
    }

    fn predict(&mut self, frame: Frame) -> Prediction {
        let mut frame = frame;
        let (width, height) = (frame.width, frame.height);

        let hands = detect_or_empty(self.landmarker.as_mut(), &frame, MAX_HANDS);
        for hand in &hands {
            draw_skeleton(&mut frame, &overlay_points(&hand.points, width, height));
        }

        if self.state.advance(keypoint_vector(&hands)) {
            self.infer();
        }

        if let Some(caption) = self.state.caption() {
            self.painter.draw_text(&mut frame, &caption, (10, 60), 1.2, GREEN);
        }

        let label = self.state.last_label().to_string();
        Prediction::new(frame, label)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::{
        features::{KEYPOINT_LEN, NUM_LANDMARKS},
        types::DetectedHand,
    };

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

    /// Replays scripted score vectors and records the window length of each
    /// call.
    struct Scripted {
        replies: Vec<Vec<f32>>,
        calls: Arc<Mutex<Vec<usize>>>,
    }

    impl SequenceModel for Scripted {
        fn predict(&mut self, window: &[Vec<f32>]) -> anyhow::Result<Vec<f32>> {
            assert!(window.iter().all(|row| row.len() == KEYPOINT_LEN));
            let mut calls = self.calls.lock().unwrap();
            calls.push(window.len());
            let reply = self.replies.get(calls.len() - 1).or(self.replies.last());
            Ok(reply.cloned().unwrap_or_default())
        }
    }

    fn actions() -> Vec<String> {
        ["hello", "iloveyou", "thanks"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn backend(
        replies: Vec<Vec<f32>>,
        hands: Vec<DetectedHand>,
    ) -> (WordBackend, Arc<Mutex<Vec<usize>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let backend = WordBackend::new(
            Box::new(FixedHands(hands)),
            Box::new(Scripted {
                replies,
                calls: calls.clone(),
            }),
            actions(),
            &SequenceConfig::default(),
            LabelPainter::default(),
        );
        (backend, calls)
    }

    fn frame() -> Frame {
        Frame::filled(64, 48, [0, 0, 0, 255])
    }

    #[test]
    fn inference_runs_every_fifth_frame_once_the_window_is_full() {
        let mut state = SequenceState::new(30, 5);
        let mut due = Vec::new();
        for _ in 0..50 {
            if state.advance(vec![0.0; KEYPOINT_LEN]) {
                due.push(state.frame_counter());
            }
        }
        assert_eq!(due, vec![30, 35, 40, 45, 50]);
        assert_eq!(state.window_len(), 30);
    }

    #[test]
    fn backend_calls_the_model_on_cadence() {
        let (mut backend, calls) = backend(vec![vec![0.1, 0.8, 0.1]], Vec::new());
        let mut invoked_at = Vec::new();
        for i in 1..=42 {
            let before = calls.lock().unwrap().len();
            backend.predict(frame());
            if calls.lock().unwrap().len() > before {
                invoked_at.push(i);
            }
        }
        assert_eq!(invoked_at, vec![30, 35, 40]);
        assert!(calls.lock().unwrap().iter().all(|len| *len == 30));
    }

    #[test]
    fn confident_label_is_sticky_across_unconfident_rounds() {
        let replies = vec![vec![0.05, 0.9, 0.05], vec![0.4, 0.3, 0.3]];
        let (mut backend, _) = backend(replies, Vec::new());

        let labels: Vec<String> = (1..=40).map(|_| backend.predict(frame()).label).collect();
        assert!(labels[..29].iter().all(String::is_empty));
        assert!(labels[29..].iter().all(|label| label == "iloveyou"));
        assert!((backend.state().last_confidence() - 0.9).abs() < 1e-6);
    }

    #[test]
    fn confidence_must_exceed_the_threshold() {
        let mut state = SequenceState::new(30, 5);
        assert_eq!(state.accept(&[0.7, 0.3], &actions(), 0.7).unwrap(), None);
        assert_eq!(state.last_label(), "");
        assert_eq!(state.accept(&[0.71, 0.29], &actions(), 0.7).unwrap(), Some(0));
        assert_eq!(state.last_label(), "hello");
        assert_eq!(state.caption().as_deref(), Some("hello (0.71)"));
    }

    #[test]
    fn out_of_range_class_keeps_previous_label() {
        let mut state = SequenceState::new(30, 5);
        state.accept(&[0.0, 0.0, 0.95], &actions(), 0.7).unwrap();
        let err = state.accept(&[0.0, 0.0, 0.0, 0.99], &actions(), 0.7);
        assert!(matches!(
            err,
            Err(RecognitionError::IndexOutOfRange { index: 3, len: 3 })
        ));
        assert_eq!(state.last_label(), "thanks");
    }

    #[test]
    fn empty_action_list_never_labels() {
        let mut state = SequenceState::new(30, 5);
        assert!(state.accept(&[0.99], &[], 0.7).is_err());
        assert_eq!(state.last_label(), "");
        assert_eq!(state.caption(), None);
    }

    #[test]
    fn detected_hands_fill_their_keypoint_slots() {
        let hand = DetectedHand::new(vec![[0.25, 0.5, -0.1]; NUM_LANDMARKS]);
        let replies = vec![vec![0.0, 0.0, 1.0]];
        let (mut backend, calls) = backend(replies, vec![hand]);
        for _ in 0..30 {
            backend.predict(frame());
        }
        assert_eq!(calls.lock().unwrap().len(), 1);
        let window = backend.state.window();
        let row = window.last().unwrap();
        assert_eq!(&row[..3], &[0.25, 0.5, -0.1]);
        assert!(row[63..].iter().all(|v| *v == 0.0));
        assert_eq!(backend.state().last_label(), "thanks");
    }

    #[test]
    fn skeleton_is_drawn_on_every_frame() {
        let hand = DetectedHand::new(
            (0..NUM_LANDMARKS)
                .map(|i| [0.2 + i as f32 * 0.02, 0.5, 0.0])
                .collect(),
        );
        let (mut backend, _) = backend(vec![vec![0.0, 0.0, 1.0]], vec![hand]);
        for _ in 0..3 {
            let prediction = backend.predict(frame());
            assert_ne!(prediction.frame.rgba, frame().rgba);
        }
    }
}
