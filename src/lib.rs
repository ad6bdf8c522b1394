//! Live hand sign recognition with hot-swappable model backends.
//!
//! A [`selector::ModelSelector`] routes each camera [`types::Frame`] to the
//! active [`backends::GestureBackend`]: a nearest-neighbour classifier over
//! landmark geometry (numbers), an image classifier over a square hand crop
//! (alphabet), or a sequence model over a sliding keypoint window (words).

pub mod backends;
#[cfg(feature = "camera-nokhwa")]
pub mod camera;
pub mod config;
pub mod error;
pub mod features;
pub mod landmarks;
pub mod model_download;
pub mod models;
pub mod overlay;
pub mod publish;
pub mod selector;
pub mod session;
pub mod types;
pub mod window;

pub use crate::backends::GestureBackend;
pub use crate::config::Config;
pub use crate::error::RecognitionError;
pub use crate::selector::{BackendFactory, ModelSelector, SelectionStatus};
pub use crate::types::{DetectedHand, Frame, ModelKind, Prediction};
