use std::{
    io::{self, BufRead},
    path::PathBuf,
};

use anyhow::Result;
use clap::Parser;
use crossbeam_channel::bounded;
use sign_stream::{
    Config, ModelKind, ModelSelector,
    backends::DefaultBackendFactory,
    publish::Publisher,
    session::{SessionHandle, start_session},
};

/// Live hand sign recognition from a camera.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON configuration file; built-in defaults when omitted
    #[arg(value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Directory receiving latest.jpg and status.json
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Camera device index
    #[arg(long, value_name = "INDEX")]
    camera_index: Option<u32>,

    /// Model active from the first frame (number, alphabet or word)
    #[arg(long, value_name = "MODEL")]
    model: Option<ModelKind>,
}

impl Args {
    fn load_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;
        if let Some(dir) = &self.output_dir {
            config.output_dir.clone_from(dir);
        }
        if let Some(index) = self.camera_index {
            config.camera_index = index;
        }
        if self.model.is_some() {
            config.initial_model = self.model;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let config = args.load_config()?;

    let mut selector = ModelSelector::new(Box::new(DefaultBackendFactory::new(config.clone())));
    if let Some(kind) = config.initial_model {
        selector.select(kind);
    }

    let (frame_tx, frame_rx) = bounded(1);
    let (encoded_tx, encoded_rx) = bounded(1);

    let publisher = Publisher::new(&config.output_dir)?;
    let output_dir = publisher.dir().to_path_buf();
    let publisher_handle = publisher.spawn(encoded_rx)?;
    let session = start_session(selector, frame_rx, encoded_tx, config.jpeg_quality)?;

    #[cfg(feature = "camera-nokhwa")]
    let camera = sign_stream::camera::CameraStream::start(config.camera_index, frame_tx)?;
    #[cfg(not(feature = "camera-nokhwa"))]
    {
        drop(frame_tx);
        log::warn!("built without camera support, no frames will be processed");
    }

    log::info!(
        "streaming to {}; commands: number | alphabet | word | status | quit",
        output_dir.display()
    );
    run_commands(&session)?;

    session.shutdown();
    #[cfg(feature = "camera-nokhwa")]
    drop(camera);
    if publisher_handle.join().is_err() {
        log::error!("publisher thread panicked");
    }
    Ok(())
}

fn run_commands(session: &SessionHandle) -> Result<()> {
    for line in io::stdin().lock().lines() {
        let line = line?;
        match line.trim() {
            "" => {}
            "quit" | "exit" => break,
            "status" => {
                let status = session.status();
                println!("{}", serde_json::to_string(&status)?);
            }
            name => session.select(name),
        }
    }
    Ok(())
}
