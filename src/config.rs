use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::{model_download::LandmarkModel, types::ModelKind};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub models: ModelPaths,
    pub detector: DetectorConfig,
    pub alphabet: AlphabetConfig,
    pub sequence: SequenceConfig,
    /// TrueType font overriding the bundled label font.
    pub font_path: Option<PathBuf>,
    pub camera_index: u32,
    pub output_dir: PathBuf,
    pub jpeg_quality: u8,
    pub initial_model: Option<ModelKind>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            models: ModelPaths::default(),
            detector: DetectorConfig::default(),
            alphabet: AlphabetConfig::default(),
            sequence: SequenceConfig::default(),
            font_path: None,
            camera_index: 0,
            output_dir: PathBuf::from("stream"),
            jpeg_quality: 80,
            initial_model: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelPaths {
    pub palm_detector: PathBuf,
    pub handpose_estimator: PathBuf,
    pub number_dataset: PathBuf,
    pub alphabet_model: PathBuf,
    pub alphabet_labels: Option<PathBuf>,
    pub word_model: PathBuf,
    pub word_actions: PathBuf,
}

impl Default for ModelPaths {
    fn default() -> Self {
        Self {
            palm_detector: LandmarkModel::PalmDetector.default_path(),
            handpose_estimator: LandmarkModel::HandposeEstimator.default_path(),
            number_dataset: PathBuf::from("NUM").join("models").join("numbers.csv"),
            alphabet_model: PathBuf::from("Model").join("alphabet.onnx"),
            alphabet_labels: Some(PathBuf::from("Model").join("labels.txt")),
            word_model: PathBuf::from("Word").join("word.onnx"),
            word_actions: PathBuf::from("Word").join("dataset"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub score_threshold: f32,
    pub nms_threshold: f32,
    pub top_k: usize,
    /// Hands whose pose confidence falls below this are discarded.
    pub min_hand_confidence: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.5,
            nms_threshold: 0.3,
            top_k: 32,
            min_hand_confidence: 0.5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlphabetConfig {
    /// Margin added on every side of the hand bounding box, in pixels.
    pub margin: u32,
    pub canvas_size: u32,
    pub classifier_input: u32,
}

impl Default for AlphabetConfig {
    fn default() -> Self {
        Self {
            margin: 20,
            canvas_size: 300,
            classifier_input: 224,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceConfig {
    pub window: usize,
    /// Inference runs on every `stride`-th frame once the window is full.
    pub stride: u64,
    pub threshold: f32,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            window: 30,
            stride: 5,
            threshold: 0.7,
        }
    }
}

impl Config {
    /// Reads the JSON file at `path`, or returns the defaults when no path is
    /// given. Missing fields fall back to their defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                serde_json::from_str::<Config>(&contents)
                    .with_context(|| format!("failed to parse config {}", path.display()))?
            }
            None => Config::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.sequence.threshold) {
            bail!(
                "sequence threshold must be within [0, 1], got {}",
                self.sequence.threshold
            );
        }
        if self.sequence.window == 0 || self.sequence.stride == 0 {
            bail!("sequence window and stride must be positive");
        }
        if self.alphabet.canvas_size == 0 || self.alphabet.classifier_input == 0 {
            bail!("alphabet canvas and classifier input sizes must be positive");
        }
        for (name, value) in [
            ("score_threshold", self.detector.score_threshold),
            ("nms_threshold", self.detector.nms_threshold),
            ("min_hand_confidence", self.detector.min_hand_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("detector {name} must be within [0, 1], got {value}");
            }
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            bail!("jpeg quality must be within 1..=100, got {}", self.jpeg_quality);
        }
        Ok(())
    }
}
