//! GFPGAN-style face enhancement: upsamples the swapped crop to the
//! model's 512x512 working resolution, runs the restoration pass, and
//! scales the result back to the crop's original size.

use std::path::Path;

use crate::inference::domain::face_enhancer::FaceEnhancer;
use crate::inference::infrastructure::execution_provider::preferred_execution_providers;
use crate::shared::constants::ENHANCE_CROP_SIZE;
use crate::shared::error::{InferenceError, InferenceStage, StartupError};
use crate::shared::face_image::FaceImage;

pub struct OnnxFaceEnhancer {
    session: ort::session::Session,
}

impl OnnxFaceEnhancer {
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

impl FaceEnhancer for OnnxFaceEnhancer {
    fn enhance(&mut self, face: &FaceImage) -> Result<FaceImage, InferenceError> {
        let err = |m: String| InferenceError::new(InferenceStage::Enhance, m);

        let upscaled = resize_bilinear(face, ENHANCE_CROP_SIZE, ENHANCE_CROP_SIZE);
        let input = crop_to_signed_tensor(&upscaled);
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
        let s = ENHANCE_CROP_SIZE as usize;
        if tensor.shape() != [1, 3, s, s] {
            return Err(err(format!("unexpected output shape: {:?}", tensor.shape())));
        }

        let mut enhanced = FaceImage::filled(ENHANCE_CROP_SIZE, ENHANCE_CROP_SIZE, 0);
        for y in 0..s {
            for x in 0..s {
                let mut rgb = [0u8; 3];
                for c in 0..3 {
                    let v = (tensor[[0, c, y, x]] + 1.0) * 127.5;
                    rgb[c] = v.round().clamp(0.0, 255.0) as u8;
                }
                enhanced.set_pixel(x as u32, y as u32, rgb);
            }
        }

        // Same dimensions in and out
        Ok(resize_bilinear(&enhanced, face.width(), face.height()))
    }
}

/// RGB crop to NCHW float tensor normalized to `[-1, 1]`.
fn crop_to_signed_tensor(crop: &FaceImage) -> ndarray::Array4<f32> {
    let (w, h) = (crop.width() as usize, crop.height() as usize);
    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, h, w));
    for y in 0..h {
        for x in 0..w {
            let rgb = crop.pixel(x as u32, y as u32);
            for c in 0..3 {
                tensor[[0, c, y, x]] = rgb[c] as f32 / 127.5 - 1.0;
            }
        }
    }
    tensor
}

/// Bilinear resize of an RGB crop. A no-op when dimensions already match.
fn resize_bilinear(src: &FaceImage, width: u32, height: u32) -> FaceImage {
    if src.width() == width && src.height() == height {
        return src.clone();
    }
    let mut out = FaceImage::filled(width, height, 0);
    let sx = src.width() as f64 / width as f64;
    let sy = src.height() as f64 / height as f64;
    for y in 0..height {
        // Sample at pixel centers to keep edges symmetric
        let fy = ((y as f64 + 0.5) * sy - 0.5).max(0.0);
        let y0 = fy.floor() as u32;
        let y1 = (y0 + 1).min(src.height() - 1);
        let wy = fy - y0 as f64;
        for x in 0..width {
            let fx = ((x as f64 + 0.5) * sx - 0.5).max(0.0);
            let x0 = fx.floor() as u32;
            let x1 = (x0 + 1).min(src.width() - 1);
            let wx = fx - x0 as f64;

            let p00 = src.pixel(x0, y0);
            let p10 = src.pixel(x1, y0);
            let p01 = src.pixel(x0, y1);
            let p11 = src.pixel(x1, y1);

            let mut rgb = [0u8; 3];
            for c in 0..3 {
                let top = p00[c] as f64 * (1.0 - wx) + p10[c] as f64 * wx;
                let bot = p01[c] as f64 * (1.0 - wx) + p11[c] as f64 * wx;
                rgb[c] = (top * (1.0 - wy) + bot * wy).round().clamp(0.0, 255.0) as u8;
            }
            out.set_pixel(x, y, rgb);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_resize_same_size_is_noop() {
        let mut src = FaceImage::filled(3, 3, 10);
        src.set_pixel(1, 1, [200, 0, 0]);
        let out = resize_bilinear(&src, 3, 3);
        assert_eq!(out, src);
    }

    #[test]
    fn test_resize_uniform_image_stays_uniform() {
        let src = FaceImage::filled(4, 4, 77);
        let out = resize_bilinear(&src, 16, 16);
        assert_eq!(out.width(), 16);
        for y in 0..16 {
            for x in 0..16 {
                assert_eq!(out.pixel(x, y), [77, 77, 77]);
            }
        }
    }

    #[test]
    fn test_resize_roundtrip_preserves_mean_brightness() {
        let mut src = FaceImage::filled(8, 8, 0);
        for y in 0..8 {
            for x in 0..8 {
                let v = ((x + y) * 16) as u8;
                src.set_pixel(x, y, [v, v, v]);
            }
        }
        let up = resize_bilinear(&src, 32, 32);
        let back = resize_bilinear(&up, 8, 8);

        let mean = |img: &FaceImage| {
            img.data().iter().map(|&v| v as f64).sum::<f64>() / img.data().len() as f64
        };
        assert_relative_eq!(mean(&src), mean(&back), epsilon = 4.0);
    }

    #[test]
    fn test_signed_tensor_range() {
        let mut crop = FaceImage::filled(2, 2, 0);
        crop.set_pixel(1, 0, [255, 255, 255]);
        let tensor = crop_to_signed_tensor(&crop);
        assert_relative_eq!(tensor[[0, 0, 0, 0]], -1.0, epsilon = 1e-6);
        assert_relative_eq!(tensor[[0, 0, 0, 1]], 1.0, epsilon = 1e-6);
    }
}
