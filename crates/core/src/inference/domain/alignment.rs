//! Similarity-transform alignment between frame coordinates and the
//! canonical face template the models were trained on.
//!
//! The template is the standard ArcFace 5-point layout at 112x112,
//! scaled to whatever crop edge a model expects.

use crate::shared::face_image::FaceImage;
use crate::shared::frame::Frame;

/// ArcFace canonical landmark positions for a 112x112 aligned crop:
/// [left_eye, right_eye, nose, left_mouth, right_mouth].
const ARCFACE_112: [(f64, f64); 5] = [
    (38.2946, 51.6963),
    (73.5318, 51.5014),
    (56.0252, 71.7366),
    (41.5493, 92.3655),
    (70.7299, 92.2041),
];

/// Template landmarks scaled to a square crop of edge `size`.
pub fn face_template(size: u32) -> [(f64, f64); 5] {
    let s = size as f64 / 112.0;
    let mut out = [(0.0, 0.0); 5];
    for (i, (x, y)) in ARCFACE_112.iter().enumerate() {
        out[i] = (x * s, y * s);
    }
    out
}

/// 2D affine transform (row-major 2x3): maps (x, y) to
/// `(m[0]*x + m[1]*y + m[2], m[3]*x + m[4]*y + m[5])`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Affine2 {
    pub m: [f64; 6],
}

impl Affine2 {
    pub fn identity() -> Self {
        Self {
            m: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
        }
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.m[0] * x + self.m[1] * y + self.m[2],
            self.m[3] * x + self.m[4] * y + self.m[5],
        )
    }

    pub fn invert(&self) -> Option<Affine2> {
        let det = self.m[0] * self.m[4] - self.m[1] * self.m[3];
        if det.abs() < 1e-12 {
            return None;
        }
        let ia = self.m[4] / det;
        let ib = -self.m[1] / det;
        let ic = -self.m[3] / det;
        let id = self.m[0] / det;
        Some(Affine2 {
            m: [
                ia,
                ib,
                -(ia * self.m[2] + ib * self.m[5]),
                ic,
                id,
                -(ic * self.m[2] + id * self.m[5]),
            ],
        })
    }

    /// Least-squares similarity transform (rotation + uniform scale +
    /// translation) mapping `src` points onto `dst` points.
    ///
    /// Returns `None` for degenerate input (fewer than two points or
    /// zero spread). Closed-form Procrustes on centered coordinates.
    pub fn estimate_similarity(src: &[(f64, f64)], dst: &[(f64, f64)]) -> Option<Affine2> {
        if src.len() != dst.len() || src.len() < 2 {
            return None;
        }
        let n = src.len() as f64;

        let (mut sx, mut sy, mut dx, mut dy) = (0.0, 0.0, 0.0, 0.0);
        for ((x, y), (u, v)) in src.iter().zip(dst) {
            sx += x;
            sy += y;
            dx += u;
            dy += v;
        }
        let (sx, sy, dx, dy) = (sx / n, sy / n, dx / n, dy / n);

        let mut norm = 0.0;
        let mut cross_a = 0.0;
        let mut cross_b = 0.0;
        for ((x, y), (u, v)) in src.iter().zip(dst) {
            let (cx, cy) = (x - sx, y - sy);
            let (cu, cv) = (u - dx, v - dy);
            norm += cx * cx + cy * cy;
            cross_a += cx * cu + cy * cv;
            cross_b += cx * cv - cy * cu;
        }
        if norm < 1e-12 {
            return None;
        }

        let a = cross_a / norm;
        let b = cross_b / norm;
        Some(Affine2 {
            m: [
                a,
                -b,
                dx - a * sx + b * sy,
                b,
                a,
                dy - b * sx - a * sy,
            ],
        })
    }
}

/// Extracts an aligned square crop from a frame.
///
/// `to_crop` maps frame coordinates into crop coordinates; pixels are
/// sampled through the inverse mapping with bilinear interpolation.
/// Samples outside the frame come out black.
pub fn warp_frame_to_crop(frame: &Frame, to_crop: &Affine2, size: u32) -> Option<FaceImage> {
    let from_crop = to_crop.invert()?;
    let mut out = FaceImage::filled(size, size, 0);
    for y in 0..size {
        for x in 0..size {
            let (sx, sy) = from_crop.apply(x as f64, y as f64);
            let rgb = sample_bilinear(frame, sx, sy);
            out.set_pixel(x, y, rgb);
        }
    }
    Some(out)
}

/// Bilinear RGB sample at a fractional frame position; out-of-bounds
/// taps contribute black.
pub fn sample_bilinear(frame: &Frame, x: f64, y: f64) -> [u8; 3] {
    let w = frame.width() as i64;
    let h = frame.height() as i64;
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let tap = |px: i64, py: i64| -> [f64; 3] {
        if px < 0 || py < 0 || px >= w || py >= h {
            return [0.0; 3];
        }
        let i = ((py as usize * w as usize) + px as usize) * 3;
        let d = frame.data();
        [d[i] as f64, d[i + 1] as f64, d[i + 2] as f64]
    };

    let p00 = tap(x0, y0);
    let p10 = tap(x0 + 1, y0);
    let p01 = tap(x0, y0 + 1);
    let p11 = tap(x0 + 1, y0 + 1);

    let mut out = [0u8; 3];
    for c in 0..3 {
        let top = p00[c] * (1.0 - fx) + p10[c] * fx;
        let bot = p01[c] * (1.0 - fx) + p11[c] * fx;
        out[c] = (top * (1.0 - fy) + bot * fy).round().clamp(0.0, 255.0) as u8;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_identity_apply() {
        let t = Affine2::identity();
        assert_eq!(t.apply(3.0, 4.0), (3.0, 4.0));
    }

    #[test]
    fn test_invert_roundtrip() {
        // Scale 2, rotate a bit, translate.
        let t = Affine2 {
            m: [1.8, -0.6, 10.0, 0.6, 1.8, -4.0],
        };
        let inv = t.invert().unwrap();
        let (x, y) = t.apply(7.0, -2.0);
        let (bx, by) = inv.apply(x, y);
        assert_relative_eq!(bx, 7.0, epsilon = 1e-9);
        assert_relative_eq!(by, -2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_invert_singular_returns_none() {
        let t = Affine2 {
            m: [0.0, 0.0, 1.0, 0.0, 0.0, 2.0],
        };
        assert!(t.invert().is_none());
    }

    #[test]
    fn test_estimate_similarity_recovers_translation() {
        let src = [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)];
        let dst = [(5.0, -3.0), (6.0, -3.0), (5.0, -2.0)];
        let t = Affine2::estimate_similarity(&src, &dst).unwrap();
        for ((x, y), (u, v)) in src.iter().zip(&dst) {
            let (px, py) = t.apply(*x, *y);
            assert_relative_eq!(px, *u, epsilon = 1e-9);
            assert_relative_eq!(py, *v, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_estimate_similarity_recovers_scale_and_rotation() {
        // 90° rotation plus scale 2: (x, y) -> (-2y, 2x).
        let src = [(1.0, 0.0), (0.0, 1.0), (-1.0, 0.0), (0.0, -1.0)];
        let dst = [(0.0, 2.0), (-2.0, 0.0), (0.0, -2.0), (2.0, 0.0)];
        let t = Affine2::estimate_similarity(&src, &dst).unwrap();
        for ((x, y), (u, v)) in src.iter().zip(&dst) {
            let (px, py) = t.apply(*x, *y);
            assert_relative_eq!(px, *u, epsilon = 1e-9);
            assert_relative_eq!(py, *v, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_estimate_similarity_degenerate_input() {
        assert!(Affine2::estimate_similarity(&[(1.0, 1.0)], &[(2.0, 2.0)]).is_none());
        let same = [(3.0, 3.0), (3.0, 3.0)];
        assert!(Affine2::estimate_similarity(&same, &same).is_none());
    }

    #[test]
    fn test_face_template_scales_linearly() {
        let t112 = face_template(112);
        let t224 = face_template(224);
        for i in 0..5 {
            assert_relative_eq!(t224[i].0, t112[i].0 * 2.0, epsilon = 1e-9);
            assert_relative_eq!(t224[i].1, t112[i].1 * 2.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_sample_bilinear_interpolates() {
        // 2x1 frame: black then white; midpoint should be gray.
        let data = vec![0, 0, 0, 255, 255, 255];
        let frame = Frame::new(data, 2, 1, 3, 0, 0);
        let mid = sample_bilinear(&frame, 0.5, 0.0);
        assert_eq!(mid, [128, 128, 128]);
    }

    #[test]
    fn test_sample_bilinear_out_of_bounds_is_black() {
        let data = vec![255u8; 12];
        let frame = Frame::new(data, 2, 2, 3, 0, 0);
        assert_eq!(sample_bilinear(&frame, -5.0, -5.0), [0, 0, 0]);
    }

    #[test]
    fn test_warp_identity_copies_pixels() {
        let mut data = vec![0u8; 4 * 4 * 3];
        data[0] = 200; // (0,0) red channel
        let frame = Frame::new(data, 4, 4, 3, 0, 0);
        let crop = warp_frame_to_crop(&frame, &Affine2::identity(), 4).unwrap();
        assert_eq!(crop.pixel(0, 0), [200, 0, 0]);
        assert_eq!(crop.pixel(3, 3), [0, 0, 0]);
    }
}
