use std::collections::HashMap;

use crate::{
    backends::GestureBackend,
    error::RecognitionError,
    types::{Frame, ModelKind, Prediction},
};

/// Builds backends on demand for the selector.
pub trait BackendFactory: Send {
    fn build(&self, kind: ModelKind) -> anyhow::Result<Box<dyn GestureBackend>>;
}

/// Outcome of a selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionStatus {
    Ready,
    /// Construction failed earlier or just now; frames pass through unlabeled.
    Unusable,
}

/// Model Registry plus the active selection.
///
/// Each kind is constructed at most once: a successful build is cached, a
/// failed one is remembered as an empty slot and never retried.
pub struct ModelSelector {
    factory: Box<dyn BackendFactory>,
    registry: HashMap<ModelKind, Option<Box<dyn GestureBackend>>>,
    active: Option<ModelKind>,
    last_label: String,
}

impl ModelSelector {
    pub fn new(factory: Box<dyn BackendFactory>) -> Self {
        Self {
            factory,
            registry: HashMap::new(),
            active: None,
            last_label: String::new(),
        }
    }

    pub fn select(&mut self, kind: ModelKind) -> SelectionStatus {
        self.active = Some(kind);
        let factory = &self.factory;
        let slot = self.registry.entry(kind).or_insert_with(|| {
            log::info!("loading {kind} backend");
            match factory.build(kind) {
                Ok(backend) => Some(backend),
                Err(err) => {
                    log::error!("{kind} backend unusable: {err:#}");
                    None
                }
            }
        });

        if slot.is_some() {
            SelectionStatus::Ready
        } else {
            SelectionStatus::Unusable
        }
    }

    /// Selects by name. Unknown names deactivate the current backend so that
    /// frames pass through unlabeled.
    pub fn select_name(&mut self, name: &str) -> Result<SelectionStatus, RecognitionError> {
        match name.parse::<ModelKind>() {
            Ok(kind) => Ok(self.select(kind)),
            Err(err) => {
                log::warn!("{err}, no backend active");
                self.deactivate();
                Err(err)
            }
        }
    }

    pub fn deactivate(&mut self) {
        self.active = None;
    }

    pub fn active(&self) -> Option<ModelKind> {
        self.active
    }

    /// Kinds that have been built successfully so far.
    pub fn loaded(&self) -> Vec<ModelKind> {
        let mut kinds: Vec<ModelKind> = self
            .registry
            .iter()
            .filter(|(_, slot)| slot.is_some())
            .map(|(kind, _)| *kind)
            .collect();
        kinds.sort_by_key(|kind| kind.as_str());
        kinds
    }

    /// Routes `frame` to the active backend. With nothing active, or with an
    /// unusable slot, the frame comes back untouched with an empty label.
    pub fn process(&mut self, frame: Frame) -> Prediction {
        let backend = self
            .active
            .and_then(|kind| self.registry.get_mut(&kind))
            .and_then(Option::as_mut);

        let prediction = match backend {
            Some(backend) => backend.predict(frame),
            None => Prediction::unlabeled(frame),
        };
        self.last_label.clone_from(&prediction.label);
        prediction
    }

    /// Label of the most recent `process` call.
    pub fn current_status(&self) -> &str {
        &self.last_label
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use anyhow::anyhow;

    use super::*;

    /// Labels every frame with its kind name and paints one pixel.
    struct Stamp(ModelKind);

    impl GestureBackend for Stamp {
        fn kind(&self) -> ModelKind {
            self.0
        }

        fn predict(&mut self, mut frame: Frame) -> Prediction {
            frame.rgba[0] = 255;
            Prediction::new(frame, self.0.as_str())
        }
    }

    struct CountingFactory {
        builds: Arc<AtomicUsize>,
        broken: Option<ModelKind>,
    }

    impl BackendFactory for CountingFactory {
        fn build(&self, kind: ModelKind) -> anyhow::Result<Box<dyn GestureBackend>> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            if self.broken == Some(kind) {
                return Err(anyhow!("model file missing"));
            }
            Ok(Box::new(Stamp(kind)))
        }
    }

    fn selector(broken: Option<ModelKind>) -> (ModelSelector, Arc<AtomicUsize>) {
        let builds = Arc::new(AtomicUsize::new(0));
        let factory = CountingFactory {
            builds: builds.clone(),
            broken,
        };
        (ModelSelector::new(Box::new(factory)), builds)
    }

    fn frame() -> Frame {
        Frame::filled(8, 8, [0, 0, 0, 255])
    }

    #[test]
    fn repeated_selection_builds_once() {
        let (mut selector, builds) = selector(None);
        assert_eq!(selector.select(ModelKind::Number), SelectionStatus::Ready);
        assert_eq!(selector.select(ModelKind::Word), SelectionStatus::Ready);
        assert_eq!(selector.select(ModelKind::Number), SelectionStatus::Ready);
        assert_eq!(builds.load(Ordering::SeqCst), 2);
        assert_eq!(selector.loaded(), vec![ModelKind::Number, ModelKind::Word]);
    }

    #[test]
    fn unselected_selector_passes_frames_through() {
        let (mut selector, _) = selector(None);
        let prediction = selector.process(frame());
        assert_eq!(prediction.label, "");
        assert_eq!(prediction.frame.rgba, frame().rgba);
        assert_eq!(selector.current_status(), "");
    }

    #[test]
    fn failed_slot_degrades_and_is_not_retried() {
        let (mut selector, builds) = selector(Some(ModelKind::Alphabet));
        assert_eq!(selector.select(ModelKind::Alphabet), SelectionStatus::Unusable);
        assert_eq!(selector.select(ModelKind::Alphabet), SelectionStatus::Unusable);
        assert_eq!(builds.load(Ordering::SeqCst), 1);

        let prediction = selector.process(frame());
        assert_eq!(prediction.label, "");
        assert_eq!(prediction.frame.rgba, frame().rgba);
        assert_eq!(selector.active(), Some(ModelKind::Alphabet));
    }

    #[test]
    fn status_tracks_the_latest_label() {
        let (mut selector, _) = selector(None);
        selector.select(ModelKind::Word);
        assert_eq!(selector.process(frame()).label, "word");
        assert_eq!(selector.current_status(), "word");

        selector.select(ModelKind::Number);
        selector.process(frame());
        assert_eq!(selector.current_status(), "number");
    }

    #[test]
    fn unknown_name_deactivates() {
        let (mut selector, builds) = selector(None);
        assert_eq!(selector.select_name("word").unwrap(), SelectionStatus::Ready);
        assert!(matches!(
            selector.select_name("emoji"),
            Err(RecognitionError::UnknownModel(name)) if name == "emoji"
        ));
        assert_eq!(selector.active(), None);
        let prediction = selector.process(frame());
        assert_eq!(prediction.label, "");
        assert_eq!(prediction.frame.rgba, frame().rgba);
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }
}
