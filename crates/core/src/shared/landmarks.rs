//! 5-point face landmarks in frame coordinates.
//!
//! Point order follows the detector convention:
//! [left_eye, right_eye, nose, left_mouth, right_mouth].

const LEFT_EYE: usize = 0;
const RIGHT_EYE: usize = 1;
const NOSE: usize = 2;

#[derive(Clone, Debug, PartialEq)]
pub struct FaceLandmarks {
    /// Points with x <= 0 are treated as invisible.
    points: [(f64, f64); 5],
}

impl FaceLandmarks {
    pub fn new(points: [(f64, f64); 5]) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[(f64, f64); 5] {
        &self.points
    }

    pub fn left_eye(&self) -> (f64, f64) {
        self.points[LEFT_EYE]
    }

    pub fn right_eye(&self) -> (f64, f64) {
        self.points[RIGHT_EYE]
    }

    pub fn nose(&self) -> (f64, f64) {
        self.points[NOSE]
    }

    /// True when every landmark is visible. Alignment to the canonical
    /// face template needs all five correspondences.
    pub fn is_complete(&self) -> bool {
        self.points.iter().all(|(x, _)| *x > 0.0)
    }
}
