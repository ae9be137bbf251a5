//! Physical geometry of the planar rectangular target (the sign).

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::error::EstimationError;

/// A flat rectangle of known size, placed in its own local frame.
///
/// The corners lie on the `z = 0` plane in {A, B, C, D} order with the
/// x-axis along the top edge and the y-axis along the left edge:
///
/// ```text
/// A (0, 0) ------- B (W, 0)
/// |                       |
/// D (0, H) ------- C (W, H)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetGeometry {
    /// Width of the target (the long, horizontal edge AB) in meters.
    pub width: f64,
    /// Height of the target (edge AD) in meters.
    pub height: f64,
}

impl TargetGeometry {
    pub fn new(width: f64, height: f64) -> Result<Self, EstimationError> {
        let target = Self { width, height };
        target.validate()?;
        Ok(target)
    }

    pub fn validate(&self) -> Result<(), EstimationError> {
        if !(self.width.is_finite() && self.width > 0.0) {
            return Err(EstimationError::InvalidCalibration(format!(
                "Target width must be positive, got {}",
                self.width
            )));
        }
        if !(self.height.is_finite() && self.height > 0.0) {
            return Err(EstimationError::InvalidCalibration(format!(
                "Target height must be positive, got {}",
                self.height
            )));
        }
        Ok(())
    }

    /// The four corners in {A, B, C, D} order.
    pub fn corners(&self) -> [Point3<f64>; 4] {
        let (w, h) = (self.width, self.height);
        [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(w, 0.0, 0.0),
            Point3::new(w, h, 0.0),
            Point3::new(0.0, h, 0.0),
        ]
    }

    /// Center of the target face.
    pub fn center(&self) -> Point3<f64> {
        Point3::new(self.width / 2.0, self.height / 2.0, 0.0)
    }

    /// Start and end of the normal arrow drawn from the target center.
    ///
    /// The arrow has the length of the target width.
    pub fn center_normal(&self) -> [Point3<f64>; 2] {
        let center = self.center();
        [center, Point3::new(center.x, center.y, self.width)]
    }

    /// The corners shifted by the target width along the local z-axis.
    ///
    /// Paired with [`TargetGeometry::corners`] they give one normal arrow per corner.
    pub fn parallel_corners(&self) -> [Point3<f64>; 4] {
        self.corners()
            .map(|corner| Point3::new(corner.x, corner.y, self.width))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corner_order() {
        let target = TargetGeometry::new(0.32, 0.2).unwrap();
        let [a, b, c, d] = target.corners();
        assert_eq!(a, Point3::new(0.0, 0.0, 0.0));
        assert_eq!(b, Point3::new(0.32, 0.0, 0.0));
        assert_eq!(c, Point3::new(0.32, 0.2, 0.0));
        assert_eq!(d, Point3::new(0.0, 0.2, 0.0));
    }

    #[test]
    fn test_overlay_points() {
        let target = TargetGeometry::new(0.335, 0.195).unwrap();
        let [start, end] = target.center_normal();
        assert_eq!(start, Point3::new(0.1675, 0.0975, 0.0));
        assert_eq!(end.z, 0.335);
        for (corner, shifted) in target.corners().iter().zip(target.parallel_corners()) {
            assert_eq!(corner.x, shifted.x);
            assert_eq!(corner.y, shifted.y);
            assert_eq!(shifted.z, 0.335);
        }
    }

    #[test]
    fn test_rejects_non_positive_size() {
        assert!(matches!(
            TargetGeometry::new(0.0, 0.2),
            Err(EstimationError::InvalidCalibration(_))
        ));
        assert!(matches!(
            TargetGeometry::new(0.3, -1.0),
            Err(EstimationError::InvalidCalibration(_))
        ));
    }
}
