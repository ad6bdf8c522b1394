use std::path::Path;

use anyhow::{Context, Result, anyhow};
use fast_image_resize as fir;
use image::RgbaImage;
use ndarray::{Array3, Array4};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use rayon::prelude::*;

use super::{ImageClassifier, SequenceModel};

fn build_session(model_path: &Path, what: &str) -> Result<Session> {
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(2)?
        .commit_from_file(model_path)
        .with_context(|| format!("failed to load {what} from {}", model_path.display()))?;
    log::info!("loaded {what} from {}", model_path.display());
    Ok(session)
}

fn run_first_output(session: &mut Session, tensor: Tensor<f32>) -> Result<Vec<f32>> {
    let outputs = session
        .run(ort::inputs![tensor])
        .context("failed to run ORT session")?;
    if outputs.len() < 1 {
        return Err(anyhow!("model returned no outputs"));
    }
    let scores = outputs[0].try_extract_array::<f32>()?;
    Ok(scores.iter().copied().collect())
}

/// Image classifier exported from a Keras model: NHWC input, pixels scaled
/// to `[-1, 1]`.
pub struct OnnxImageClassifier {
    session: Session,
    input_size: u32,
}

impl OnnxImageClassifier {
    pub fn new(model_path: &Path, input_size: u32) -> Result<Self> {
        Ok(Self {
            session: build_session(model_path, "image classifier")?,
            input_size,
        })
    }
}

impl ImageClassifier for OnnxImageClassifier {
    fn classify(&mut self, canvas: &RgbaImage) -> Result<Vec<f32>> {
        let size = self.input_size;
        let src_image = fir::images::Image::from_vec_u8(
            canvas.width(),
            canvas.height(),
            canvas.as_raw().clone(),
            fir::PixelType::U8x4,
        )?;
        let mut dst_image = fir::images::Image::new(size, size, fir::PixelType::U8x4);
        fir::Resizer::new()
            .resize(&src_image, &mut dst_image, None)
            .context("fast resize failed")?;

        let pixels: Vec<f32> = dst_image
            .buffer()
            .par_chunks_exact(4)
            .flat_map_iter(|px| {
                [
                    px[0] as f32 / 127.5 - 1.0,
                    px[1] as f32 / 127.5 - 1.0,
                    px[2] as f32 / 127.5 - 1.0,
                ]
            })
            .collect();
        let input = Array4::<f32>::from_shape_vec((1, size as usize, size as usize, 3), pixels)
            .map_err(|err| anyhow!("failed to build classifier input: {err}"))?;

        run_first_output(&mut self.session, Tensor::from_array(input)?)
    }
}

/// Recurrent sequence classifier taking `[1, frames, features]`.
pub struct OnnxSequenceModel {
    session: Session,
}

impl OnnxSequenceModel {
    pub fn new(model_path: &Path) -> Result<Self> {
        Ok(Self {
            session: build_session(model_path, "sequence model")?,
        })
    }
}

impl SequenceModel for OnnxSequenceModel {
    fn predict(&mut self, window: &[Vec<f32>]) -> Result<Vec<f32>> {
        let features = window
            .first()
            .map(Vec::len)
            .ok_or_else(|| anyhow!("empty sequence window"))?;
        if window.iter().any(|row| row.len() != features) {
            return Err(anyhow!("sequence rows differ in length"));
        }

        let flat: Vec<f32> = window.iter().flatten().copied().collect();
        let input = Array3::<f32>::from_shape_vec((1, window.len(), features), flat)
            .map_err(|err| anyhow!("failed to build sequence input: {err}"))?;

        run_first_output(&mut self.session, Tensor::from_array(input)?)
    }
}
