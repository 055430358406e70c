use crate::shared::error::InferenceError;
use crate::shared::face_region::FaceRegion;
use crate::shared::frame::Frame;

/// Computes the identity embedding of a face found in a frame.
///
/// Used exactly once, during startup, to turn the configured source
/// image into a `TargetIdentity`.
pub trait IdentityEmbedder: Send {
    fn embed(&mut self, frame: &Frame, region: &FaceRegion) -> Result<Vec<f32>, InferenceError>;
}
