use crate::shared::landmarks::FaceLandmarks;

/// A detected face: bounding box clamped to the frame, landmarks, and the
/// sequence number of the frame it belongs to.
///
/// Regions are created by the locator, consumed by the swapper, and
/// discarded after compositing.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceRegion {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub confidence: f64,
    pub landmarks: Option<FaceLandmarks>,
    pub frame_seq: u64,
}

impl FaceRegion {
    /// Builds a region from an unclamped bbox, clipping to frame bounds.
    pub fn clamped(
        bbox: (f64, f64, f64, f64),
        frame_w: u32,
        frame_h: u32,
        confidence: f64,
        landmarks: Option<FaceLandmarks>,
        frame_seq: u64,
    ) -> Self {
        let (x1, y1, x2, y2) = bbox;
        let x = x1.max(0.0).round() as i32;
        let y = y1.max(0.0).round() as i32;
        let x2 = x2.min(frame_w as f64).round() as i32;
        let y2 = y2.min(frame_h as f64).round() as i32;
        Self {
            x,
            y,
            width: (x2 - x).max(0),
            height: (y2 - y).max(0),
            confidence,
            landmarks,
            frame_seq,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamped_inside_frame() {
        let r = FaceRegion::clamped((10.0, 20.0, 110.0, 140.0), 640, 480, 0.8, None, 3);
        assert_eq!((r.x, r.y, r.width, r.height), (10, 20, 100, 120));
        assert_eq!(r.frame_seq, 3);
        assert!(!r.is_empty());
    }

    #[test]
    fn test_clamped_clips_negative_origin() {
        let r = FaceRegion::clamped((-30.0, -10.0, 50.0, 40.0), 640, 480, 0.8, None, 0);
        assert_eq!((r.x, r.y), (0, 0));
        assert_eq!((r.width, r.height), (50, 40));
    }

    #[test]
    fn test_clamped_clips_to_frame_edges() {
        let r = FaceRegion::clamped((600.0, 450.0, 700.0, 500.0), 640, 480, 0.8, None, 0);
        assert_eq!((r.width, r.height), (40, 30));
    }

    #[test]
    fn test_clamped_fully_outside_is_empty() {
        let r = FaceRegion::clamped((700.0, 500.0, 800.0, 600.0), 640, 480, 0.8, None, 0);
        assert!(r.is_empty());
    }
}
