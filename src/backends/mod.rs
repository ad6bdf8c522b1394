mod alphabet;
mod factory;
mod number;
mod word;

pub use self::alphabet::{AlphabetBackend, BoundingBox, CropRect, padded_crop, square_canvas};
pub use self::factory::DefaultBackendFactory;
pub use self::number::NumberBackend;
pub use self::word::{SequenceState, WordBackend};

use crate::types::{Frame, ModelKind, Prediction};

/// Uniform prediction contract shared by every recognition backend.
///
/// `predict` never fails: recoverable problems surface as an empty or
/// placeholder label and, where useful, a marker drawn on the frame.
pub trait GestureBackend: Send {
    fn kind(&self) -> ModelKind;

    fn predict(&mut self, frame: Frame) -> Prediction;
}
