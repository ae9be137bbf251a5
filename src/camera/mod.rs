//! Calibrated camera plus the known target it observes.
//!
//! A [`CameraModel`] bundles pinhole intrinsics, Radial-Tangential lens
//! distortion and the physical size of the rectangular target. It is the only
//! place where points move between the target frame, the camera frame and
//! pixel coordinates, so the pose solver and the reprojector share one
//! projection model.

pub mod profile;
pub mod rad_tan;
pub mod target;

use nalgebra::{Point2, Point3, RealField, Vector2, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::EstimationError;
use crate::pose::Pose;

pub use profile::{CalibrationProfile, ProfileError};
pub use rad_tan::RadTanDistortion;
pub use target::TargetGeometry;

/// Depth below which a camera-frame point is treated as lying on the camera
/// center plane.
const MIN_DEPTH: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Common validation functions for camera parameters
pub mod validation {
    use super::*;

    pub fn validate_intrinsics(intrinsics: &Intrinsics) -> Result<(), EstimationError> {
        let Intrinsics { fx, fy, cx, cy } = *intrinsics;
        if [fx, fy, cx, cy].iter().any(|v| !v.is_finite()) {
            return Err(EstimationError::InvalidCalibration(
                "Intrinsics must be finite".to_string(),
            ));
        }
        if fx <= 0.0 || fy <= 0.0 {
            return Err(EstimationError::InvalidCalibration(format!(
                "Focal length must be positive, got fx: {fx} fy: {fy}"
            )));
        }
        if (fx * fy).abs() <= f64::EPSILON {
            return Err(EstimationError::InvalidCalibration(
                "Intrinsic matrix is not invertible".to_string(),
            ));
        }
        Ok(())
    }
}

/// Pinhole camera with Radial-Tangential distortion observing a known target.
///
/// Immutable once built; share it freely between threads.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraModel {
    intrinsics: Intrinsics,
    distortion: RadTanDistortion,
    target: TargetGeometry,
}

impl CameraModel {
    /// Builds a validated camera model.
    ///
    /// `distortion` may hold 0, 4 (`k1, k2, p1, p2`) or 5
    /// (`k1, k2, p1, p2, k3`) coefficients.
    ///
    /// # Errors
    ///
    /// [`EstimationError::InvalidCalibration`] if the intrinsics, the
    /// distortion vector or the target size is unusable.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sign_distance::camera::{CameraModel, Intrinsics, TargetGeometry};
    ///
    /// let intrinsics = Intrinsics { fx: 536.0, fy: 536.0, cx: 180.0, cy: 320.0 };
    /// let target = TargetGeometry::new(0.32, 0.20).unwrap();
    /// let camera = CameraModel::new(intrinsics, &[], target).unwrap();
    /// assert_eq!(camera.focal_length(), 536.0);
    /// ```
    pub fn new(
        intrinsics: Intrinsics,
        distortion: &[f64],
        target: TargetGeometry,
    ) -> Result<Self, EstimationError> {
        validation::validate_intrinsics(&intrinsics)?;
        target.validate()?;
        let distortion = RadTanDistortion::from_slice(distortion)?;
        Ok(Self {
            intrinsics,
            distortion,
            target,
        })
    }

    /// A camera without lens distortion.
    pub fn pinhole(intrinsics: Intrinsics, target: TargetGeometry) -> Result<Self, EstimationError> {
        Self::new(intrinsics, &[], target)
    }

    pub fn intrinsics(&self) -> &Intrinsics {
        &self.intrinsics
    }

    pub fn distortion(&self) -> &RadTanDistortion {
        &self.distortion
    }

    pub fn target(&self) -> &TargetGeometry {
        &self.target
    }

    /// Horizontal focal length in pixels, used by the pinhole-ratio distance.
    pub fn focal_length(&self) -> f64 {
        self.intrinsics.fx
    }

    /// Maps a camera-frame point to pixels without checking its depth.
    ///
    /// Generic over [`RealField`] so the pose refinement can differentiate
    /// through the exact projection used everywhere else.
    pub fn project_camera_point<T: RealField>(&self, point: &Vector3<T>) -> Vector2<T> {
        let x = point.x.clone() / point.z.clone();
        let y = point.y.clone() / point.z.clone();
        let (xd, yd) = self.distortion.distort(x, y);

        let fx: T = nalgebra::convert(self.intrinsics.fx);
        let fy: T = nalgebra::convert(self.intrinsics.fy);
        let cx: T = nalgebra::convert(self.intrinsics.cx);
        let cy: T = nalgebra::convert(self.intrinsics.cy);
        Vector2::new(fx * xd + cx, fy * yd + cy)
    }

    /// Projects a single target-frame point through `pose`.
    ///
    /// # Errors
    ///
    /// [`EstimationError::InvalidGeometry`] when the point lands on the camera
    /// center plane.
    pub fn project_point(
        &self,
        point: &Point3<f64>,
        pose: &Pose,
    ) -> Result<Point2<f64>, EstimationError> {
        let camera_point = pose.transform_point(point);
        if camera_point.z.abs() < MIN_DEPTH || !camera_point.z.is_finite() {
            return Err(EstimationError::InvalidGeometry(format!(
                "Point {:?} has depth {} in the camera frame",
                point.coords.as_slice(),
                camera_point.z
            )));
        }
        let pixel = self.project_camera_point(&camera_point.coords);
        Ok(Point2::from(pixel))
    }

    /// Projects target-frame points through `pose`, preserving their order.
    pub fn project(
        &self,
        points: &[Point3<f64>],
        pose: &Pose,
    ) -> Result<Vec<Point2<f64>>, EstimationError> {
        points
            .iter()
            .map(|point| self.project_point(point, pose))
            .collect()
    }

    /// Removes intrinsics and distortion from a pixel, giving the normalized
    /// image coordinates `(x/z, y/z)` of its ray.
    pub fn normalize(&self, pixel: &Point2<f64>) -> Result<Vector2<f64>, EstimationError> {
        let distorted = Vector2::new(
            (pixel.x - self.intrinsics.cx) / self.intrinsics.fx,
            (pixel.y - self.intrinsics.cy) / self.intrinsics.fy,
        );
        self.distortion.undistort(&distorted)
    }
}
