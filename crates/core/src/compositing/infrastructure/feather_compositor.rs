//! CPU compositor that inverse-warps swapped crops into the frame and
//! blends them through an alpha mask that fades linearly to zero at the
//! crop border, hiding the paste seam.

use crate::compositing::domain::frame_compositor::{CompositeError, FrameCompositor};
use crate::inference::domain::identity_swapper::SwappedFace;
use crate::shared::constants::DEFAULT_FEATHER_RATIO;
use crate::shared::face_image::FaceImage;
use crate::shared::frame::Frame;

pub struct FeatherCompositor {
    feather_ratio: f64,
}

impl FeatherCompositor {
    /// `feather_ratio` is the fraction of the crop edge over which alpha
    /// ramps from 0 to 1. Clamped to `[0, 0.5]`.
    pub fn new(feather_ratio: f64) -> Self {
        Self {
            feather_ratio: feather_ratio.clamp(0.0, 0.5),
        }
    }
}

impl Default for FeatherCompositor {
    fn default() -> Self {
        Self::new(DEFAULT_FEATHER_RATIO)
    }
}

impl FrameCompositor for FeatherCompositor {
    fn composite(&self, frame: &mut Frame, faces: &[SwappedFace]) -> Result<(), CompositeError> {
        for face in faces {
            let from_crop = face
                .to_crop
                .invert()
                .ok_or_else(|| CompositeError("crop transform is singular".into()))?;

            let crop_w = face.image.width() as f64;
            let crop_h = face.image.height() as f64;

            // Frame-space bounding box of the warped crop
            let corners = [
                from_crop.apply(0.0, 0.0),
                from_crop.apply(crop_w, 0.0),
                from_crop.apply(0.0, crop_h),
                from_crop.apply(crop_w, crop_h),
            ];
            let min_x = corners.iter().map(|c| c.0).fold(f64::INFINITY, f64::min);
            let max_x = corners.iter().map(|c| c.0).fold(f64::NEG_INFINITY, f64::max);
            let min_y = corners.iter().map(|c| c.1).fold(f64::INFINITY, f64::min);
            let max_y = corners.iter().map(|c| c.1).fold(f64::NEG_INFINITY, f64::max);

            let x0 = (min_x.floor().max(0.0)) as u32;
            let y0 = (min_y.floor().max(0.0)) as u32;
            let x1 = (max_x.ceil() as i64).clamp(0, frame.width() as i64) as u32;
            let y1 = (max_y.ceil() as i64).clamp(0, frame.height() as i64) as u32;

            let margin = (self.feather_ratio * crop_w.min(crop_h)).max(f64::EPSILON);
            let fw = frame.width() as usize;
            let data = frame.data_mut();

            for y in y0..y1 {
                for x in x0..x1 {
                    let (cx, cy) = face.to_crop.apply(x as f64, y as f64);
                    if cx < 0.0 || cy < 0.0 || cx >= crop_w || cy >= crop_h {
                        continue;
                    }
                    let edge_dist = cx.min(cy).min(crop_w - 1.0 - cx).min(crop_h - 1.0 - cy);
                    let alpha = (edge_dist / margin).clamp(0.0, 1.0);
                    if alpha <= 0.0 {
                        continue;
                    }

                    let rgb = sample_crop_bilinear(&face.image, cx, cy);
                    let i = (y as usize * fw + x as usize) * 3;
                    for c in 0..3 {
                        let blended =
                            rgb[c] as f64 * alpha + data[i + c] as f64 * (1.0 - alpha);
                        data[i + c] = blended.round().clamp(0.0, 255.0) as u8;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Bilinear sample inside a crop; taps past the border clamp to it.
fn sample_crop_bilinear(crop: &FaceImage, x: f64, y: f64) -> [u8; 3] {
    let max_x = crop.width() - 1;
    let max_y = crop.height() - 1;
    let x0 = (x.floor() as u32).min(max_x);
    let y0 = (y.floor() as u32).min(max_y);
    let x1 = (x0 + 1).min(max_x);
    let y1 = (y0 + 1).min(max_y);
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let p00 = crop.pixel(x0, y0);
    let p10 = crop.pixel(x1, y0);
    let p01 = crop.pixel(x0, y1);
    let p11 = crop.pixel(x1, y1);

    let mut out = [0u8; 3];
    for c in 0..3 {
        let top = p00[c] as f64 * (1.0 - fx) + p10[c] as f64 * fx;
        let bot = p01[c] as f64 * (1.0 - fx) + p11[c] as f64 * fx;
        out[c] = (top * (1.0 - fy) + bot * fy).round().clamp(0.0, 255.0) as u8;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::domain::alignment::Affine2;

    fn make_frame(width: u32, height: u32, value: u8) -> Frame {
        let data = vec![value; (width * height * 3) as usize];
        Frame::new(data, width, height, 3, 0, 0)
    }

    /// Crop pasted 1:1 at (tx, ty) in the frame.
    fn face_at(tx: f64, ty: f64, crop: FaceImage) -> SwappedFace {
        SwappedFace {
            image: crop,
            to_crop: Affine2 {
                m: [1.0, 0.0, -tx, 0.0, 1.0, -ty],
            },
        }
    }

    #[test]
    fn test_no_faces_frame_byte_identical() {
        let mut frame = make_frame(64, 64, 90);
        let original = frame.data().to_vec();
        let compositor = FeatherCompositor::default();
        compositor.composite(&mut frame, &[]).unwrap();
        assert_eq!(frame.data(), &original[..]);
    }

    #[test]
    fn test_paste_replaces_crop_center() {
        let mut frame = make_frame(64, 64, 0);
        let crop = FaceImage::filled(16, 16, 255);
        let compositor = FeatherCompositor::new(0.1);
        compositor
            .composite(&mut frame, &[face_at(20.0, 20.0, crop)])
            .unwrap();

        // Center of the pasted area is fully opaque
        let i = (28 * 64 + 28) * 3;
        assert_eq!(frame.data()[i], 255);
    }

    #[test]
    fn test_pixels_outside_paste_unchanged() {
        let mut frame = make_frame(64, 64, 40);
        let crop = FaceImage::filled(16, 16, 255);
        let compositor = FeatherCompositor::new(0.1);
        compositor
            .composite(&mut frame, &[face_at(20.0, 20.0, crop)])
            .unwrap();

        assert_eq!(frame.data()[0], 40);
        let i = (60 * 64 + 60) * 3;
        assert_eq!(frame.data()[i], 40);
    }

    #[test]
    fn test_feather_blends_at_edge() {
        let mut frame = make_frame(64, 64, 0);
        let crop = FaceImage::filled(20, 20, 200);
        let compositor = FeatherCompositor::new(0.25);
        compositor
            .composite(&mut frame, &[face_at(10.0, 10.0, crop)])
            .unwrap();

        // One pixel in from the crop border: alpha = 1/5, partial blend
        let edge = (11 * 64 + 11) * 3;
        let center = (20 * 64 + 20) * 3;
        assert!(frame.data()[edge] > 0);
        assert!(frame.data()[edge] < frame.data()[center]);
        assert_eq!(frame.data()[center], 200);
    }

    #[test]
    fn test_paste_clips_to_frame_bounds() {
        let mut frame = make_frame(32, 32, 10);
        let crop = FaceImage::filled(16, 16, 250);
        let compositor = FeatherCompositor::new(0.1);
        // Partially off the top-left corner
        compositor
            .composite(&mut frame, &[face_at(-8.0, -8.0, crop)])
            .unwrap();

        // In-frame part of the crop landed
        let i = (4 * 32 + 4) * 3;
        assert_eq!(frame.data()[i], 250);
        // Far corner untouched
        let j = (30 * 32 + 30) * 3;
        assert_eq!(frame.data()[j], 10);
    }

    #[test]
    fn test_singular_transform_is_error() {
        let mut frame = make_frame(16, 16, 0);
        let face = SwappedFace {
            image: FaceImage::filled(8, 8, 100),
            to_crop: Affine2 {
                m: [0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            },
        };
        let compositor = FeatherCompositor::default();
        assert!(compositor.composite(&mut frame, &[face]).is_err());
    }

    #[test]
    fn test_multiple_faces_all_pasted() {
        let mut frame = make_frame(64, 64, 0);
        let compositor = FeatherCompositor::new(0.1);
        compositor
            .composite(
                &mut frame,
                &[
                    face_at(4.0, 4.0, FaceImage::filled(12, 12, 255)),
                    face_at(40.0, 40.0, FaceImage::filled(12, 12, 255)),
                ],
            )
            .unwrap();

        let a = (10 * 64 + 10) * 3;
        let b = (46 * 64 + 46) * 3;
        assert_eq!(frame.data()[a], 255);
        assert_eq!(frame.data()[b], 255);
    }

    #[test]
    fn test_zero_feather_is_hard_paste() {
        let mut frame = make_frame(32, 32, 0);
        let crop = FaceImage::filled(8, 8, 128);
        let compositor = FeatherCompositor::new(0.0);
        compositor
            .composite(&mut frame, &[face_at(10.0, 10.0, crop)])
            .unwrap();

        // With no feather every pixel inside the border is fully opaque
        let i = (11 * 32 + 11) * 3;
        assert_eq!(frame.data()[i], 128);
    }
}
