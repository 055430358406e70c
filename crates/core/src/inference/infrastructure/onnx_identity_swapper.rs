//! Identity swap inference: aligns a detected face to the canonical
//! 128x128 crop, runs the swap model with the target identity latent,
//! and returns the replacement crop plus its frame transform.

use std::path::Path;

use crate::inference::domain::alignment::{face_template, warp_frame_to_crop, Affine2};
use crate::inference::domain::identity_swapper::{IdentitySwapper, SwappedFace};
use crate::inference::domain::target_identity::TargetIdentity;
use crate::inference::infrastructure::execution_provider::preferred_execution_providers;
use crate::shared::constants::SWAP_CROP_SIZE;
use crate::shared::error::{InferenceError, InferenceStage, StartupError};
use crate::shared::face_image::FaceImage;
use crate::shared::face_region::FaceRegion;
use crate::shared::frame::Frame;

/// Swapper backed by an ONNX Runtime session with two named inputs:
/// `target` (the aligned crop to repaint) and `source` (the identity
/// latent).
pub struct OnnxIdentitySwapper {
    session: ort::session::Session,
}

impl OnnxIdentitySwapper {
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

impl IdentitySwapper for OnnxIdentitySwapper {
    fn swap(
        &mut self,
        frame: &Frame,
        region: &FaceRegion,
        identity: &TargetIdentity,
    ) -> Result<SwappedFace, InferenceError> {
        let err = |m: String| InferenceError::new(InferenceStage::Swap, m);

        let to_crop = alignment_for(region, SWAP_CROP_SIZE)
            .ok_or_else(|| err("region has no complete landmark set".into()))?;
        let crop = warp_frame_to_crop(frame, &to_crop, SWAP_CROP_SIZE)
            .ok_or_else(|| err("alignment transform is singular".into()))?;

        let target = crop_to_tensor(&crop);
        let latent = ndarray::Array2::from_shape_vec(
            (1, identity.embedding().len()),
            identity.embedding().to_vec(),
        )
        .map_err(|e| err(e.to_string()))?;

        let target_value = ort::value::Tensor::from_array(target).map_err(|e| err(e.to_string()))?;
        let source_value = ort::value::Tensor::from_array(latent).map_err(|e| err(e.to_string()))?;
        let outputs = self
            .session
            .run(ort::inputs!["target" => target_value, "source" => source_value])
            .map_err(|e| err(e.to_string()))?;
        if outputs.len() == 0 {
            return Err(err("model produced no outputs".into()));
        }

        let tensor = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| err(e.to_string()))?;
        let image = tensor_to_crop(&tensor.view(), SWAP_CROP_SIZE)
            .ok_or_else(|| err(format!("unexpected output shape: {:?}", tensor.shape())))?;

        Ok(SwappedFace { image, to_crop })
    }
}

/// Similarity transform from frame coordinates into an aligned crop of
/// edge `size`, computed from the region's five landmarks. `None` when
/// any landmark is missing.
pub fn alignment_for(region: &FaceRegion, size: u32) -> Option<Affine2> {
    let landmarks = region.landmarks.as_ref()?;
    if !landmarks.is_complete() {
        return None;
    }
    Affine2::estimate_similarity(landmarks.points(), &face_template(size))
}

/// RGB crop to NCHW float tensor in `[0, 1]`.
fn crop_to_tensor(crop: &FaceImage) -> ndarray::Array4<f32> {
    let (w, h) = (crop.width() as usize, crop.height() as usize);
    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, h, w));
    for y in 0..h {
        for x in 0..w {
            let rgb = crop.pixel(x as u32, y as u32);
            for c in 0..3 {
                tensor[[0, c, y, x]] = rgb[c] as f32 / 255.0;
            }
        }
    }
    tensor
}

/// NCHW float tensor in `[0, 1]` back to an RGB crop of edge `size`.
fn tensor_to_crop(tensor: &ndarray::ArrayViewD<'_, f32>, size: u32) -> Option<FaceImage> {
    let s = size as usize;
    if tensor.shape() != [1, 3, s, s] {
        return None;
    }
    let mut out = FaceImage::filled(size, size, 0);
    for y in 0..s {
        for x in 0..s {
            let mut rgb = [0u8; 3];
            for c in 0..3 {
                rgb[c] = (tensor[[0, c, y, x]] * 255.0).round().clamp(0.0, 255.0) as u8;
            }
            out.set_pixel(x as u32, y as u32, rgb);
        }
    }
    Some(out)
}
