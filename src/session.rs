use std::{
    sync::{Arc, Mutex, PoisonError},
    thread,
};

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender, TrySendError, select, unbounded};
use image::{DynamicImage, codecs::jpeg::JpegEncoder};
use serde::Serialize;

use crate::{
    selector::{ModelSelector, SelectionStatus},
    types::{Frame, ModelKind},
};

/// Control messages for the session worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionCommand {
    Select(String),
    Shutdown,
}

/// Snapshot served as the status document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub prediction: String,
    pub model: Option<ModelKind>,
    #[serde(skip)]
    pub frames: u64,
}

/// Annotated frame ready for transport.
#[derive(Clone, Debug)]
pub struct EncodedFrame {
    pub jpeg: Vec<u8>,
    pub status: StatusReport,
}

pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>> {
    let image = frame
        .to_image()
        .context("frame buffer does not match its dimensions")?;
    let rgb = DynamicImage::ImageRgba8(image).to_rgb8();
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality)
        .encode_image(&rgb)
        .context("failed to encode frame as JPEG")?;
    Ok(jpeg)
}

/// Handle to the session worker. Dropping it shuts the worker down.
pub struct SessionHandle {
    commands: Sender<SessionCommand>,
    status: Arc<Mutex<StatusReport>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl SessionHandle {
    pub fn select(&self, name: &str) {
        let _ = self.commands.send(SessionCommand::Select(name.to_string()));
    }

    pub fn status(&self) -> StatusReport {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.commands.send(SessionCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("session worker panicked");
            }
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spawns the worker that owns `selector`. It takes the newest frame from
/// `frame_rx`, runs the active backend, and offers the encoded result on
/// `output_tx`, dropping it when the consumer is busy.
pub fn start_session(
    selector: ModelSelector,
    frame_rx: Receiver<Frame>,
    output_tx: Sender<EncodedFrame>,
    jpeg_quality: u8,
) -> Result<SessionHandle> {
    let (command_tx, command_rx) = unbounded();
    let status = Arc::new(Mutex::new(StatusReport {
        model: selector.active(),
        ..StatusReport::default()
    }));

    let worker = SessionWorker {
        selector,
        status: status.clone(),
        output_tx,
        jpeg_quality,
        frames: 0,
    };
    let handle = thread::Builder::new()
        .name("session".into())
        .spawn(move || worker.run(frame_rx, command_rx))
        .context("failed to spawn session worker")?;

    Ok(SessionHandle {
        commands: command_tx,
        status,
        handle: Some(handle),
    })
}

struct SessionWorker {
    selector: ModelSelector,
    status: Arc<Mutex<StatusReport>>,
    output_tx: Sender<EncodedFrame>,
    jpeg_quality: u8,
    frames: u64,
}

impl SessionWorker {
    fn run(mut self, frame_rx: Receiver<Frame>, command_rx: Receiver<SessionCommand>) {
        loop {
            select! {
                recv(command_rx) -> msg => match msg {
                    Ok(command) => {
                        if !self.apply(command) {
                            break;
                        }
                    }
                    Err(_) => break,
                },
                recv(frame_rx) -> msg => match msg {
                    Ok(frame) => {
                        // Commands issued before this frame take effect first.
                        if !self.apply_pending(&command_rx) {
                            break;
                        }
                        let frame = latest_frame(frame, &frame_rx);
                        if !self.process(frame) {
                            break;
                        }
                    }
                    Err(_) => break,
                },
            }
        }
        log::info!("session worker stopped after {} frames", self.frames);
    }

    /// Returns `false` on shutdown.
    fn apply(&mut self, command: SessionCommand) -> bool {
        match command {
            SessionCommand::Select(name) => {
                match self.selector.select_name(&name) {
                    Ok(SelectionStatus::Ready) => log::info!("switched to {name} model"),
                    Ok(SelectionStatus::Unusable) => {
                        log::warn!("{name} model is unusable, frames pass through unlabeled")
                    }
                    Err(err) => log::warn!("{err}"),
                }
                let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
                status.model = self.selector.active();
                true
            }
            SessionCommand::Shutdown => false,
        }
    }

    fn apply_pending(&mut self, command_rx: &Receiver<SessionCommand>) -> bool {
        while let Ok(command) = command_rx.try_recv() {
            if !self.apply(command) {
                return false;
            }
        }
        true
    }

    /// Returns `false` once the output consumer is gone.
    fn process(&mut self, frame: Frame) -> bool {
        let prediction = self.selector.process(frame);
        self.frames += 1;

        let report = {
            let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
            status.prediction.clone_from(&prediction.label);
            status.model = self.selector.active();
            status.frames = self.frames;
            status.clone()
        };

        let jpeg = match encode_jpeg(&prediction.frame, self.jpeg_quality) {
            Ok(jpeg) => jpeg,
            Err(err) => {
                log::warn!("dropping frame: {err:#}");
                return true;
            }
        };

        match self.output_tx.try_send(EncodedFrame {
            jpeg,
            status: report,
        }) {
            Err(TrySendError::Disconnected(_)) => false,
            _ => true,
        }
    }
}

fn latest_frame(mut frame: Frame, frame_rx: &Receiver<Frame>) -> Frame {
    while let Ok(newer) = frame_rx.try_recv() {
        frame = newer;
    }
    frame
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crossbeam_channel::bounded;

    use super::*;
    use crate::{backends::GestureBackend, selector::BackendFactory, types::Prediction};

    struct Echo(ModelKind);

    impl GestureBackend for Echo {
        fn kind(&self) -> ModelKind {
            self.0
        }

        fn predict(&mut self, frame: Frame) -> Prediction {
            Prediction::new(frame, format!("{}-ok", self.0))
        }
    }

    struct EchoFactory;

    impl BackendFactory for EchoFactory {
        fn build(&self, kind: ModelKind) -> anyhow::Result<Box<dyn GestureBackend>> {
            Ok(Box::new(Echo(kind)))
        }
    }

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn jpeg_encoding_produces_a_jpeg() {
        let jpeg = encode_jpeg(&Frame::filled(16, 8, [10, 200, 30, 255]), 80).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
    }

    #[test]
    fn status_document_shape() {
        let report = StatusReport {
            prediction: "A".into(),
            model: Some(ModelKind::Alphabet),
            frames: 3,
        };
        assert_eq!(
            serde_json::to_string(&report).unwrap(),
            r#"{"prediction":"A","model":"alphabet"}"#
        );
        assert_eq!(
            serde_json::to_string(&StatusReport::default()).unwrap(),
            r#"{"prediction":"","model":null}"#
        );
    }

    #[test]
    fn worker_labels_frames_with_the_selected_model() {
        let (frame_tx, frame_rx) = bounded(1);
        let (output_tx, output_rx) = bounded(1);
        let session =
            start_session(ModelSelector::new(Box::new(EchoFactory)), frame_rx, output_tx, 75)
                .unwrap();

        frame_tx.send(Frame::filled(8, 8, [0, 0, 0, 255])).unwrap();
        let first = output_rx.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(first.status.prediction, "");
        assert_eq!(first.status.model, None);

        session.select("word");
        frame_tx.send(Frame::filled(8, 8, [0, 0, 0, 255])).unwrap();
        let second = output_rx.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(second.status.prediction, "word-ok");
        assert_eq!(second.status.model, Some(ModelKind::Word));
        assert_eq!(session.status().prediction, "word-ok");
        assert_eq!(session.status().frames, 2);

        session.shutdown();
    }

    #[test]
    fn worker_stops_when_frames_end() {
        let (frame_tx, frame_rx) = bounded::<Frame>(1);
        let (output_tx, _output_rx) = bounded(1);
        let session =
            start_session(ModelSelector::new(Box::new(EchoFactory)), frame_rx, output_tx, 75)
                .unwrap();
        drop(frame_tx);
        session.shutdown();
    }
}
