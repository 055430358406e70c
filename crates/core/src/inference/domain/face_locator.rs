use crate::shared::error::InferenceError;
use crate::shared::face_region::FaceRegion;
use crate::shared::frame::Frame;

/// Domain interface for face localization.
///
/// Deterministic for a given frame and model version; an empty result
/// means no face. Implementations may be stateful, hence `&mut self`.
/// An `InferenceError` is scoped to the frame that caused it; the
/// pipeline treats it as "no regions", never as fatal.
pub trait FaceLocator: Send {
    fn locate(&mut self, frame: &Frame) -> Result<Vec<FaceRegion>, InferenceError>;
}
