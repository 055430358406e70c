//! ArcFace identity embedding: aligns a face to the 112x112 recognition
//! crop and produces a 512-dim descriptor. Runs once at startup on the
//! configured source image.

use std::path::Path;

use crate::inference::domain::alignment::warp_frame_to_crop;
use crate::inference::domain::identity_embedder::IdentityEmbedder;
use crate::inference::infrastructure::execution_provider::preferred_execution_providers;
use crate::inference::infrastructure::onnx_identity_swapper::alignment_for;
use crate::shared::constants::EMBED_CROP_SIZE;
use crate::shared::error::{InferenceError, InferenceStage, StartupError};
use crate::shared::face_image::FaceImage;
use crate::shared::face_region::FaceRegion;
use crate::shared::frame::Frame;

pub struct OnnxFaceEmbedder {
    session: ort::session::Session,
}

impl OnnxFaceEmbedder {
    pub fn new(model_path: &Path) -> Result<Self, StartupError> {
        if !model_path.exists() {
            return Err(StartupError::ModelNotFound(model_path.to_path_buf()));
        }
        let session = ort::session::Session::builder()
            .and_then(|b| Ok(b.with_execution_providers(preferred_execution_providers())?))
            .and_then(|mut b| b.commit_from_file(model_path))
            .map_err(|e| StartupError::ModelLoad {
                path: model_path.to_path_buf(),
                message: e.to_string(),
            })?;
        Ok(Self { session })
    }
}

impl IdentityEmbedder for OnnxFaceEmbedder {
    fn embed(&mut self, frame: &Frame, region: &FaceRegion) -> Result<Vec<f32>, InferenceError> {
        let err = |m: String| InferenceError::new(InferenceStage::Embed, m);

        let to_crop = alignment_for(region, EMBED_CROP_SIZE)
            .ok_or_else(|| err("region has no complete landmark set".into()))?;
        let crop = warp_frame_to_crop(frame, &to_crop, EMBED_CROP_SIZE)
            .ok_or_else(|| err("alignment transform is singular".into()))?;

        let input = crop_to_arcface_tensor(&crop);
        let input_value = ort::value::Tensor::from_array(input).map_err(|e| err(e.to_string()))?;
        let outputs = self
            .session
            .run(ort::inputs![input_value])
            .map_err(|e| err(e.to_string()))?;
        if outputs.len() == 0 {
            return Err(err("model produced no outputs".into()));
        }

        let tensor = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| err(e.to_string()))?;
        let embedding: Vec<f32> = tensor.iter().copied().collect();
        if embedding.is_empty() {
            return Err(err("model produced an empty embedding".into()));
        }
        Ok(embedding)
    }
}

/// RGB crop to NCHW float tensor normalized to `[-1, 1]` (ArcFace
/// convention: `(x - 127.5) / 127.5`).
fn crop_to_arcface_tensor(crop: &FaceImage) -> ndarray::Array4<f32> {
    let (w, h) = (crop.width() as usize, crop.height() as usize);
    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, h, w));
    for y in 0..h {
        for x in 0..w {
            let rgb = crop.pixel(x as u32, y as u32);
            for c in 0..3 {
                tensor[[0, c, y, x]] = (rgb[c] as f32 - 127.5) / 127.5;
            }
        }
    }
    tensor
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_arcface_normalization_range() {
        let mut crop = FaceImage::filled(2, 2, 0);
        crop.set_pixel(1, 1, [255, 255, 255]);
        let tensor = crop_to_arcface_tensor(&crop);
        assert_relative_eq!(tensor[[0, 0, 0, 0]], -1.0, epsilon = 1e-6);
        assert_relative_eq!(tensor[[0, 0, 1, 1]], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_arcface_tensor_shape() {
        let crop = FaceImage::filled(112, 112, 127);
        let tensor = crop_to_arcface_tensor(&crop);
        assert_eq!(tensor.shape(), &[1, 3, 112, 112]);
    }
}
