use crate::shared::error::InferenceError;
use crate::shared::face_image::FaceImage;

/// Optional quality pass over a swapped face crop.
///
/// Purely a visual transform: same dimensions in and out. When no
/// enhancer is configured the stage is skipped entirely, which must be
/// pixel-identical to an enhancer that returns its input unchanged.
pub trait FaceEnhancer: Send {
    fn enhance(&mut self, face: &FaceImage) -> Result<FaceImage, InferenceError>;
}

/// Identity enhancer used when enhancement is disabled in tests.
pub struct PassthroughEnhancer;

impl FaceEnhancer for PassthroughEnhancer {
    fn enhance(&mut self, face: &FaceImage) -> Result<FaceImage, InferenceError> {
        Ok(face.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough_returns_input_unchanged() {
        let mut enhancer = PassthroughEnhancer;
        let face = FaceImage::filled(8, 8, 42);
        let out = enhancer.enhance(&face).unwrap();
        assert_eq!(out, face);
    }
}
