use std::{
    fs,
    path::{Path, PathBuf},
    thread,
};

use anyhow::{Context, Result};
use crossbeam_channel::Receiver;

use crate::session::EncodedFrame;

pub const FRAME_FILE: &str = "latest.jpg";
pub const STATUS_FILE: &str = "status.json";

/// Writes `bytes` next to `dest` and renames it into place, so readers never
/// observe a partial file.
pub fn write_atomic(dest: &Path, bytes: &[u8]) -> Result<()> {
    let tmp_path = dest.with_extension("tmp");
    fs::write(&tmp_path, bytes)
        .with_context(|| format!("failed to write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, dest).with_context(|| {
        format!(
            "failed to move {} into place at {}",
            tmp_path.display(),
            dest.display()
        )
    })
}

/// Publishes the latest annotated frame and status document into a directory.
pub struct Publisher {
    dir: PathBuf,
}

impl Publisher {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create output directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn publish(&self, frame: &EncodedFrame) -> Result<()> {
        let status =
            serde_json::to_vec(&frame.status).context("failed to serialize status report")?;
        write_atomic(&self.dir.join(FRAME_FILE), &frame.jpeg)?;
        write_atomic(&self.dir.join(STATUS_FILE), &status)
    }

    /// Publishes every frame from `frames` until the channel closes.
    pub fn spawn(self, frames: Receiver<EncodedFrame>) -> Result<thread::JoinHandle<()>> {
        thread::Builder::new()
            .name("publisher".into())
            .spawn(move || {
                log::info!("publishing frames to {}", self.dir.display());
                for frame in frames {
                    if let Err(err) = self.publish(&frame) {
                        log::warn!("publish failed: {err:#}");
                    }
                }
            })
            .context("failed to spawn publisher thread")
    }
}
