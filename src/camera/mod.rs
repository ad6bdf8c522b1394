mod rgba_converter;

pub use self::rgba_converter::convert_camera_frame;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Instant,
};

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Sender, TrySendError, bounded};
use nokhwa::{
    Camera,
    pixel_format::RgbFormat,
    utils::{CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType},
};

use crate::types::Frame;

// Some built-in cameras reject YUYV even though it is reported as supported.
const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
    FrameFormat::RAWRGB,
    FrameFormat::RAWBGR,
    FrameFormat::GRAY,
    FrameFormat::YUYV,
    FrameFormat::NV12,
    FrameFormat::MJPEG,
];

fn requested_formats() -> [RequestedFormat<'static>; 4] {
    [
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestFrameRate,
            PREFERRED_PIXEL_FORMATS,
        ),
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestResolution,
            PREFERRED_PIXEL_FORMATS,
        ),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
    ]
}

fn build_camera(index: CameraIndex) -> Result<Camera> {
    let mut last_err = None;

    for requested in requested_formats() {
        match Camera::new(index.clone(), requested) {
            Ok(mut camera) => match camera.open_stream() {
                Ok(()) => return Ok(camera),
                Err(err) => last_err = Some(err.into()),
            },
            Err(err) => last_err = Some(err.into()),
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("failed to open camera with any supported format")))
}

/// Capture thread feeding RGBA frames into a channel. Stops and joins on drop.
#[derive(Debug)]
pub struct CameraStream {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl CameraStream {
    /// Opens camera `index` on a capture thread and waits until the stream is
    /// running. Frames are dropped while the receiver is busy.
    pub fn start(index: u32, frame_tx: Sender<Frame>) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let (ready_tx, ready_rx) = bounded::<Result<(), String>>(1);

        let handle = thread::Builder::new()
            .name("camera".into())
            .spawn(move || {
                let mut camera = match build_camera(CameraIndex::Index(index)) {
                    Ok(camera) => {
                        let _ = ready_tx.send(Ok(()));
                        camera
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(format!("{err:#}")));
                        return;
                    }
                };
                log::info!(
                    "camera {index} streaming {:?} at {:?}",
                    camera.camera_format().format(),
                    camera.resolution()
                );

                while !stop_flag.load(Ordering::Relaxed) {
                    let buffer = match camera.frame() {
                        Ok(buffer) => buffer,
                        Err(err) => {
                            log::warn!("camera frame read failed: {err:?}");
                            continue;
                        }
                    };

                    let frame = match convert_camera_frame(&buffer, Instant::now()) {
                        Ok(frame) => frame,
                        Err(err) => {
                            log::warn!("failed to decode camera frame: {err:#}");
                            continue;
                        }
                    };

                    if let Err(TrySendError::Disconnected(_)) = frame_tx.try_send(frame) {
                        break;
                    }
                }

                if let Err(err) = camera.stop_stream() {
                    log::warn!("failed to stop camera stream: {err:?}");
                }
            })
            .context("failed to spawn camera thread")?;

        let mut stream = Self {
            stop,
            handle: Some(handle),
        };
        match ready_rx.recv() {
            Ok(Ok(())) => Ok(stream),
            Ok(Err(err)) => {
                stream.shutdown();
                Err(anyhow!("failed to open camera {index}: {err}"))
            }
            Err(_) => {
                stream.shutdown();
                Err(anyhow!("camera thread exited before opening camera {index}"))
            }
        }
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CameraStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}
