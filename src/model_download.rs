use std::{
    fs,
    io::{Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;

/// ONNX models behind the hand landmark extractor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LandmarkModel {
    PalmDetector,
    HandposeEstimator,
}

impl LandmarkModel {
    pub fn file_name(self) -> &'static str {
        match self {
            LandmarkModel::PalmDetector => "palm_detection_mediapipe_2023feb.onnx",
            LandmarkModel::HandposeEstimator => "handpose_estimation_mediapipe_2023feb.onnx",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LandmarkModel::PalmDetector => "palm detector",
            LandmarkModel::HandposeEstimator => "handpose estimator",
        }
    }

    pub fn url(self) -> &'static str {
        match self {
            LandmarkModel::PalmDetector => {
                "https://github.com/opencv/opencv_zoo/raw/main/models/palm_detection_mediapipe/palm_detection_mediapipe_2023feb.onnx"
            }
            LandmarkModel::HandposeEstimator => {
                "https://github.com/opencv/opencv_zoo/raw/main/models/handpose_estimation_mediapipe/handpose_estimation_mediapipe_2023feb.onnx"
            }
        }
    }

    pub fn default_path(self) -> PathBuf {
        PathBuf::from("models").join(self.file_name())
    }
}

/// Makes sure `model_path` exists, downloading the model when it does not.
pub fn ensure_model_ready(model: LandmarkModel, model_path: &Path) -> anyhow::Result<()> {
    if model_path.exists() {
        log::debug!("{} present at {}", model.label(), model_path.display());
        return Ok(());
    }

    if let Some(parent) = model_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create model directory {}", parent.display()))?;
    }

    download_to_path(model, model.url(), model_path).with_context(|| {
        format!(
            "failed to download {} model to {}",
            model.label(),
            model_path.display()
        )
    })
}

fn download_to_path(model: LandmarkModel, url: &str, dest: &Path) -> anyhow::Result<()> {
    log::info!(
        "downloading {} model from {url} to {}",
        model.label(),
        dest.display()
    );

    let client = Client::new();
    let mut response = client
        .get(url)
        .send()
        .context("failed to start model download")?
        .error_for_status()
        .context("model download returned error status")?;

    let progress = create_progress_bar(response.content_length());

    let tmp_path = dest.with_extension("download");
    if let Err(err) = stream_into_place(&mut response, &tmp_path, dest, &progress) {
        progress.abandon();
        return Err(err);
    }

    progress.finish_with_message(format!("{} ready", model.label()));
    Ok(())
}

/// Copies `source` into `tmp_path`, then renames it to `dest`. A failed copy
/// removes the partial file.
fn stream_into_place(
    source: &mut impl Read,
    tmp_path: &Path,
    dest: &Path,
    progress: &ProgressBar,
) -> anyhow::Result<()> {
    let result = copy_then_rename(source, tmp_path, dest, progress);
    if result.is_err() && tmp_path.exists() {
        if let Err(err) = fs::remove_file(tmp_path) {
            log::warn!("could not remove partial download {}: {err}", tmp_path.display());
        }
    }
    result
}

fn copy_then_rename(
    source: &mut impl Read,
    tmp_path: &Path,
    dest: &Path,
    progress: &ProgressBar,
) -> anyhow::Result<()> {
    let mut file = fs::File::create(tmp_path)
        .with_context(|| format!("failed to create {}", tmp_path.display()))?;

    let mut downloaded: u64 = 0;
    let mut buffer = [0u8; 16 * 1024];
    loop {
        let bytes_read = source
            .read(&mut buffer)
            .context("failed while reading model bytes")?;
        if bytes_read == 0 {
            break;
        }

        file.write_all(&buffer[..bytes_read])
            .context("failed while writing model to disk")?;
        downloaded += bytes_read as u64;
        progress.set_position(downloaded);
    }

    file.sync_all()
        .context("failed to flush downloaded model to disk")?;
    fs::rename(tmp_path, dest).with_context(|| {
        format!(
            "failed to move temp model {} into place at {}",
            tmp_path.display(),
            dest.display()
        )
    })
}

fn create_progress_bar(total_size: Option<u64>) -> ProgressBar {
    match total_size {
        Some(total) if total > 0 => {
            let pb = ProgressBar::new(total);
            let style = ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
            pb.set_style(style);
            pb
        }
        _ => {
            let pb = ProgressBar::new_spinner();
            let style = ProgressStyle::with_template("{spinner:.green} downloading model")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            pb.set_style(style);
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        }
    }
}
