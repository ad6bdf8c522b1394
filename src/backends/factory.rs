use anyhow::{Context, Result};

use super::{AlphabetBackend, GestureBackend, NumberBackend, WordBackend};
use crate::{
    config::Config,
    landmarks::{HandLandmarker, OrtHandLandmarker},
    model_download::{LandmarkModel, ensure_model_ready},
    models::{
        OnnxImageClassifier, OnnxSequenceModel, alphabet_labels, load_action_labels,
        load_label_file,
    },
    overlay::LabelPainter,
    selector::BackendFactory,
    types::ModelKind,
};

/// Builds the ONNX Runtime backed implementations from a [`Config`]. Every
/// backend gets its own landmarker.
pub struct DefaultBackendFactory {
    config: Config,
    painter: LabelPainter,
}

impl DefaultBackendFactory {
    pub fn new(config: Config) -> Self {
        let painter = LabelPainter::load(config.font_path.as_deref());
        Self { config, painter }
    }

    fn landmarker(&self) -> Result<Box<dyn HandLandmarker>> {
        let models = &self.config.models;
        ensure_model_ready(LandmarkModel::PalmDetector, &models.palm_detector)?;
        ensure_model_ready(LandmarkModel::HandposeEstimator, &models.handpose_estimator)?;
        let landmarker = OrtHandLandmarker::new(
            &models.handpose_estimator,
            &models.palm_detector,
            self.config.detector.clone(),
        )
        .context("failed to build hand landmarker")?;
        Ok(Box::new(landmarker))
    }

    fn alphabet_labels(&self) -> Vec<String> {
        let Some(path) = self.config.models.alphabet_labels.as_deref() else {
            return alphabet_labels();
        };
        match load_label_file(path) {
            Ok(labels) if !labels.is_empty() => labels,
            Ok(_) => {
                log::warn!("{} lists no labels, using A-Z", path.display());
                alphabet_labels()
            }
            Err(err) => {
                log::warn!("{err:#}, using A-Z");
                alphabet_labels()
            }
        }
    }
}

impl BackendFactory for DefaultBackendFactory {
    fn build(&self, kind: ModelKind) -> Result<Box<dyn GestureBackend>> {
        let models = &self.config.models;
        let backend: Box<dyn GestureBackend> = match kind {
            ModelKind::Number => Box::new(NumberBackend::new(
                self.landmarker()?,
                &models.number_dataset,
                self.painter.clone(),
            )),
            ModelKind::Alphabet => {
                let classifier = OnnxImageClassifier::new(
                    &models.alphabet_model,
                    self.config.alphabet.classifier_input,
                )?;
                Box::new(AlphabetBackend::new(
                    self.landmarker()?,
                    Box::new(classifier),
                    self.alphabet_labels(),
                    self.config.alphabet.clone(),
                    self.painter.clone(),
                ))
            }
            ModelKind::Word => {
                let model = OnnxSequenceModel::new(&models.word_model)?;
                Box::new(WordBackend::new(
                    self.landmarker()?,
                    Box::new(model),
                    load_action_labels(&models.word_actions),
                    &self.config.sequence,
                    self.painter.clone(),
                ))
            }
        };
        Ok(backend)
    }
}
