use std::{fmt, str::FromStr, time::Instant};

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::error::RecognitionError;

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
}

impl Frame {
    pub fn from_image(image: RgbaImage, timestamp: Instant) -> Self {
        let (width, height) = image.dimensions();
        Self {
            rgba: image.into_raw(),
            width,
            height,
            timestamp,
        }
    }

    #[cfg(test)]
    pub(crate) fn filled(width: u32, height: u32, color: [u8; 4]) -> Self {
        Self::from_image(
            RgbaImage::from_pixel(width, height, image::Rgba(color)),
            Instant::now(),
        )
    }

    /// Copies the pixel buffer into an owned image.
    pub fn to_image(&self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.rgba.clone())
    }

    pub fn into_image(self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.rgba)
    }

    pub fn is_valid(&self) -> bool {
        let expected_len = (self.width as usize)
            .saturating_mul(self.height as usize)
            .saturating_mul(4);
        self.rgba.len() == expected_len && expected_len > 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handedness {
    Left,
    Right,
    Unknown,
}

impl Handedness {
    pub fn from_score(score: f32) -> Self {
        if score >= 0.5 {
            Handedness::Right
        } else if score > 0.0 {
            Handedness::Left
        } else {
            Handedness::Unknown
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Handedness::Left => "Left",
            Handedness::Right => "Right",
            Handedness::Unknown => "Unknown",
        }
    }
}

/// One detected hand. `points` are normalized to the frame: x and y in
/// `[0, 1]`, z on the same scale as x.
#[derive(Clone, Debug)]
pub struct DetectedHand {
    pub points: Vec<[f32; 3]>,
    pub handedness: Handedness,
    pub confidence: f32,
}

impl DetectedHand {
    pub fn new(points: Vec<[f32; 3]>) -> Self {
        Self {
            points,
            handedness: Handedness::Unknown,
            confidence: 1.0,
        }
    }
}

/// Output of one backend call. An empty label means no confident prediction.
#[derive(Clone, Debug)]
pub struct Prediction {
    pub frame: Frame,
    pub label: String,
}

impl Prediction {
    pub fn new(frame: Frame, label: impl Into<String>) -> Self {
        Self {
            frame,
            label: label.into(),
        }
    }

    pub fn unlabeled(frame: Frame) -> Self {
        Self::new(frame, String::new())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Number,
    Alphabet,
    Word,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [ModelKind::Number, ModelKind::Alphabet, ModelKind::Word];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Number => "number",
            ModelKind::Alphabet => "alphabet",
            ModelKind::Word => "word",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = RecognitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "number" => Ok(ModelKind::Number),
            "alphabet" => Ok(ModelKind::Alphabet),
            "word" => Ok(ModelKind::Word),
            other => Err(RecognitionError::UnknownModel(other.to_string())),
        }
    }
}
