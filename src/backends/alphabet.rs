use anyhow::{Context, Result};
use fast_image_resize as fir;
use image::{Rgba, RgbaImage};

use super::GestureBackend;
use crate::{
    config::AlphabetConfig,
    error::RecognitionError,
    features::{overlay_points, pixel_landmarks},
    landmarks::{HandLandmarker, detect_or_empty},
    models::{ImageClassifier, argmax},
    overlay::{LabelPainter, MAGENTA, WHITE, draw_rect, draw_skeleton, fill_rect},
    types::{DetectedHand, Frame, ModelKind, Prediction},
};

const CANVAS_BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
const LABEL_BOX_WIDTH: i32 = 100;
const LABEL_BOX_HEIGHT: i32 = 50;
const LABEL_TEXT_LIFT: i32 = 26;
const OUTLINE_THICKNESS: i32 = 4;

/// Tight pixel box around a hand's landmarks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl BoundingBox {
    pub fn from_hand(hand: &DetectedHand, width: u32, height: u32) -> Option<Self> {
        let points = pixel_landmarks(&hand.points, width, height);
        let first = points.first()?;
        let (mut min_x, mut min_y) = (first[0], first[1]);
        let (mut max_x, mut max_y) = (first[0], first[1]);
        for p in &points[1..] {
            min_x = min_x.min(p[0]);
            min_y = min_y.min(p[1]);
            max_x = max_x.max(p[0]);
            max_y = max_y.max(p[1]);
        }
        Some(Self {
            x: min_x as i32,
            y: min_y as i32,
            w: (max_x - min_x) as i32,
            h: (max_y - min_y) as i32,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.w <= 0 || self.h <= 0
    }
}

/// Region of the frame actually cropped, always inside the frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// Grows `bbox` by `margin` on every side and clamps it to a
/// `width`x`height` frame. Degenerate boxes and boxes left with no area after
/// clamping yield `None`.
pub fn padded_crop(bbox: BoundingBox, margin: u32, width: u32, height: u32) -> Option<CropRect> {
    if bbox.is_empty() {
        return None;
    }
    let margin = margin as i64;
    let x0 = (bbox.x as i64 - margin).max(0);
    let y0 = (bbox.y as i64 - margin).max(0);
    let x1 = (bbox.x as i64 + bbox.w as i64 + margin).min(width as i64);
    let y1 = (bbox.y as i64 + bbox.h as i64 + margin).min(height as i64);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(CropRect {
        x: x0 as u32,
        y: y0 as u32,
        w: (x1 - x0) as u32,
        h: (y1 - y0) as u32,
    })
}

/// Fits `crop` onto a white `size`x`size` canvas, preserving its aspect
/// ratio. The longer side fills the canvas and the shorter one is centred.
pub fn square_canvas(crop: &RgbaImage, size: u32) -> Result<RgbaImage> {
    let (w, h) = crop.dimensions();
    anyhow::ensure!(w > 0 && h > 0 && size > 0, "cannot fit an empty crop");

    let (dst_w, dst_h) = if h > w {
        let k = size as f32 / h as f32;
        (((k * w as f32).ceil() as u32).clamp(1, size), size)
    } else {
        let k = size as f32 / w as f32;
        (size, ((k * h as f32).ceil() as u32).clamp(1, size))
    };

    let src_image =
        fir::images::Image::from_vec_u8(w, h, crop.as_raw().clone(), fir::PixelType::U8x4)?;
    let mut dst_image = fir::images::Image::new(dst_w, dst_h, fir::PixelType::U8x4);
    fir::Resizer::new()
        .resize(&src_image, &mut dst_image, None)
        .context("fast resize failed")?;
    let resized = RgbaImage::from_raw(dst_w, dst_h, dst_image.into_vec())
        .context("resized crop has unexpected length")?;

    let mut canvas = RgbaImage::from_pixel(size, size, CANVAS_BACKGROUND);
    let gap_x = (size - dst_w) / 2;
    let gap_y = (size - dst_h) / 2;
    image::imageops::replace(&mut canvas, &resized, gap_x as i64, gap_y as i64);
    Ok(canvas)
}

/// Single-hand backend classifying a square, letterboxed crop of the hand.
pub struct AlphabetBackend {
    landmarker: Box<dyn HandLandmarker>,
    classifier: Box<dyn ImageClassifier>,
    labels: Vec<String>,
    cfg: AlphabetConfig,
    painter: LabelPainter,
}

impl AlphabetBackend {
    pub fn new(
        landmarker: Box<dyn HandLandmarker>,
        classifier: Box<dyn ImageClassifier>,
        labels: Vec<String>,
        cfg: AlphabetConfig,
        painter: LabelPainter,
    ) -> Self {
        log::info!("alphabet backend ready with {} labels", labels.len());
        Self {
            landmarker,
            classifier,
            labels,
            cfg,
            painter,
        }
    }

    fn classify(&mut self, canvas: &RgbaImage) -> Result<&str, RecognitionError> {
        let scores = self
            .classifier
            .classify(canvas)
            .map_err(|err| RecognitionError::ClassificationFailure(format!("{err:#}")))?;
        let (index, _) = argmax(&scores).ok_or_else(|| {
            RecognitionError::ClassificationFailure("classifier returned no scores".into())
        })?;
        self.labels
            .get(index)
            .map(String::as_str)
            .ok_or(RecognitionError::IndexOutOfRange {
                index,
                len: self.labels.len(),
            })
    }
}

impl GestureBackend for AlphabetBackend {
    fn kind(&self) -> ModelKind {
        ModelKind::Alphabet
    }

    fn predict(&mut self, frame: Frame) -> Prediction {
        let (width, height) = (frame.width, frame.height);
        let hands = detect_or_empty(self.landmarker.as_mut(), &frame, 1);
        let Some(hand) = hands.first() else {
            return Prediction::unlabeled(frame);
        };

        let Some(bbox) = BoundingBox::from_hand(hand, width, height) else {
            return Prediction::unlabeled(frame);
        };
        let Some(crop_rect) = padded_crop(bbox, self.cfg.margin, width, height) else {
            log::debug!("hand bounding box {bbox:?} has no area, skipping");
            return Prediction::unlabeled(frame);
        };

        // The classifier was trained on crops that include the skeleton, the
        // returned frame only carries the box and label.
        let mut sketched = frame.clone();
        draw_skeleton(&mut sketched, &overlay_points(&hand.points, width, height));
        let Some(sketched) = sketched.into_image() else {
            return Prediction::unlabeled(frame);
        };
        let crop = image::imageops::crop_imm(
            &sketched,
            crop_rect.x,
            crop_rect.y,
            crop_rect.w,
            crop_rect.h,
        )
        .to_image();

        let label = match square_canvas(&crop, self.cfg.canvas_size) {
            Ok(canvas) => match self.classify(&canvas) {
                Ok(label) => label.to_string(),
                Err(err) => {
                    log::warn!("alphabet prediction failed: {err}");
                    String::new()
                }
            },
            Err(err) => {
                log::warn!("alphabet canvas failed: {err:#}");
                String::new()
            }
        };
        log::debug!("alphabet classifier predicted {label:?}");

        let mut frame = frame;
        let margin = self.cfg.margin as i32;
        let (left, top) = (bbox.x - margin, bbox.y - margin);
        fill_rect(
            &mut frame,
            (left, top - LABEL_BOX_HEIGHT),
            (left + LABEL_BOX_WIDTH, top),
            MAGENTA,
        );
        self.painter
            .draw_text(&mut frame, &label, (bbox.x, bbox.y - LABEL_TEXT_LIFT), 2.0, WHITE);
        draw_rect(
            &mut frame,
            (left, top),
            (bbox.x + bbox.w + margin, bbox.y + bbox.h + margin),
            MAGENTA,
            OUTLINE_THICKNESS,
        );

        Prediction::new(frame, label)
    }
}
