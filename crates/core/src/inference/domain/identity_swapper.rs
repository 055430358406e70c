use crate::inference::domain::alignment::Affine2;
use crate::inference::domain::target_identity::TargetIdentity;
use crate::shared::error::InferenceError;
use crate::shared::face_image::FaceImage;
use crate::shared::face_region::FaceRegion;
use crate::shared::frame::Frame;

/// A replacement face produced by the swapper, plus the transform that
/// maps frame coordinates into its crop so the compositor can paste it
/// back where it came from.
#[derive(Clone, Debug)]
pub struct SwappedFace {
    pub image: FaceImage,
    pub to_crop: Affine2,
}

/// Domain interface for identity-swap inference.
///
/// Safe to invoke for independent regions/frames; the only shared state
/// is the read-only `TargetIdentity`. On `InferenceError` the caller
/// marks the region skipped and leaves the original pixels in place,
/// so output degrades to pass-through rather than a corrupted frame.
pub trait IdentitySwapper: Send {
    fn swap(
        &mut self,
        frame: &Frame,
        region: &FaceRegion,
        identity: &TargetIdentity,
    ) -> Result<SwappedFace, InferenceError>;
}
