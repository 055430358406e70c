use thiserror::Error;

use crate::inference::domain::identity_swapper::SwappedFace;
use crate::shared::error::InferenceStage;
use crate::shared::frame::Frame;

/// Per-region result of the swap stages, reported alongside the frame
/// so the pipeline can count skips without inspecting pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegionOutcome {
    Swapped { enhanced: bool },
    Skipped { stage: InferenceStage },
}

/// A fully processed frame plus what happened to each detected region.
#[derive(Debug)]
pub struct CompositeResult {
    pub frame: Frame,
    pub outcomes: Vec<RegionOutcome>,
}

#[derive(Error, Debug)]
#[error("composite failed: {0}")]
pub struct CompositeError(pub String);

/// Domain interface for pasting swapped face crops back into a frame.
///
/// Implementations modify the frame in place. An empty face list must
/// leave the frame byte-identical to its input.
pub trait FrameCompositor: Send + Sync {
    fn composite(&self, frame: &mut Frame, faces: &[SwappedFace]) -> Result<(), CompositeError>;
}
