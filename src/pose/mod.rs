//! Pose of the target relative to the camera.
//!
//! [`solve_pose`] estimates the pose in two stages:
//!
//! 1. A closed-form seed from the plane-to-image homography of the four
//!    undistorted corners ([`homography`]).
//! 2. Levenberg-Marquardt refinement of the distorted pixel reprojection error
//!    with `tiny-solver` ([`refine`]).

pub mod homography;
pub mod refine;

use log::debug;
use nalgebra::{Matrix3, Point2, Point3, RealField, Rotation3, Vector3};
use serde::{Deserialize, Serialize};

use crate::camera::CameraModel;
use crate::error::EstimationError;
use crate::geometry::validate_corners;

/// Squared rotation angle below which the Rodrigues coefficients switch to
/// their Taylor expansions.
const SMALL_ANGLE_SQUARED: f64 = 1e-10;

/// Rigid transform from the target frame to the camera frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Axis-angle rotation vector (radians).
    pub rotation: Vector3<f64>,
    /// Translation in meters; the target origin (corner A) in camera coordinates.
    pub translation: Vector3<f64>,
}

impl Pose {
    pub fn new(rotation: Vector3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        Rotation3::new(self.rotation).into_inner()
    }

    /// Maps a target-frame point into the camera frame.
    pub fn transform_point(&self, point: &Point3<f64>) -> Point3<f64> {
        Point3::from(rotate_point(&self.rotation, &point.coords) + self.translation)
    }

    /// Target plane normal (local +z) expressed in the camera frame.
    pub fn target_normal(&self) -> Vector3<f64> {
        rotate_point(&self.rotation, &Vector3::z())
    }

    /// Whether the target origin lies in front of the camera.
    pub fn is_in_front(&self) -> bool {
        self.translation.z > 0.0
    }

    pub fn is_finite(&self) -> bool {
        self.rotation.iter().chain(self.translation.iter()).all(|v| v.is_finite())
    }
}

/// Rotates `point` by the axis-angle vector `rotation` (Rodrigues' formula).
///
/// Written over [`RealField`] so the refinement residual can be
/// auto-differentiated. Near zero angle the coefficients use their Taylor
/// series, which keeps the derivatives finite at the identity.
pub fn rotate_point<T: RealField>(rotation: &Vector3<T>, point: &Vector3<T>) -> Vector3<T> {
    let theta_squared = rotation.norm_squared();
    let one = T::one();
    let small: T = nalgebra::convert(SMALL_ANGLE_SQUARED);

    let (a, b) = if theta_squared > small {
        let theta = theta_squared.clone().sqrt();
        let a = theta.clone().sin() / theta.clone();
        let b = (one - theta.cos()) / theta_squared;
        (a, b)
    } else {
        let six: T = nalgebra::convert(6.0);
        let half: T = nalgebra::convert(0.5);
        let twenty_four: T = nalgebra::convert(24.0);
        (
            one - theta_squared.clone() / six,
            half - theta_squared / twenty_four,
        )
    };

    let r_cross_p = rotation.cross(point);
    let r_cross_r_cross_p = rotation.cross(&r_cross_p);
    point + r_cross_p * a + r_cross_r_cross_p * b
}

/// Recovers the pose of the target from its four canonical image corners.
///
/// `corners[i]` must be the image of `camera.target().corners()[i]`.
///
/// # Errors
///
/// * [`EstimationError::DegenerateGeometry`] when fewer than four distinct
///   points are given, three corners are (nearly) collinear, or the
///   homography system is singular.
/// * [`EstimationError::InvalidGeometry`] if a corner cannot be undistorted.
pub fn solve_pose(camera: &CameraModel, corners: &[Point2<f64>]) -> Result<Pose, EstimationError> {
    let corners = validate_corners(corners)?;

    let mut normalized = [nalgebra::Vector2::zeros(); 4];
    for (slot, corner) in normalized.iter_mut().zip(corners.iter()) {
        *slot = camera.normalize(corner)?;
    }
    let plane = camera.target().corners().map(|p| Point2::new(p.x, p.y));

    let h = homography::plane_homography(&plane, &normalized)?;
    let seed = homography::decompose_homography(&h)?;
    debug!(
        "Homography seed: rvec {:?} tvec {:?}",
        seed.rotation.as_slice(),
        seed.translation.as_slice()
    );

    Ok(refine::refine_pose(camera, &corners, seed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{Intrinsics, TargetGeometry};
    use approx::assert_abs_diff_eq;

    fn pnp_camera() -> CameraModel {
        CameraModel::pinhole(
            Intrinsics {
                fx: 536.0,
                fy: 536.0,
                cx: 180.0,
                cy: 320.0,
            },
            TargetGeometry::new(0.32, 0.20).unwrap(),
        )
        .unwrap()
    }

    fn street_camera() -> CameraModel {
        crate::camera::CalibrationProfile::preset("street_1008x756_iphone8s")
            .unwrap()
            .camera_model()
            .unwrap()
    }

    fn synthetic_corners(camera: &CameraModel, pose: &Pose) -> Vec<Point2<f64>> {
        camera.project(&camera.target().corners(), pose).unwrap()
    }

    #[test]
    fn test_rotate_point_matches_rotation_matrix() {
        let rotation = Vector3::new(0.3, -0.2, 0.7);
        let point = Vector3::new(1.0, 2.0, -0.5);
        let expected = Rotation3::new(rotation) * point;
        let actual = rotate_point(&rotation, &point);
        assert_abs_diff_eq!(actual, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_rotate_point_small_angle() {
        let rotation = Vector3::new(1e-7, 0.0, 0.0);
        let point = Vector3::new(0.0, 1.0, 0.0);
        let actual = rotate_point(&rotation, &point);
        assert_abs_diff_eq!(actual, Rotation3::new(rotation) * point, epsilon = 1e-12);
    }

    #[test]
    fn test_target_normal_identity() {
        let pose = Pose::new(Vector3::zeros(), Vector3::new(0.0, 0.0, 2.0));
        assert_eq!(pose.target_normal(), Vector3::z());
        assert!(pose.is_in_front());
    }

    #[test]
    fn test_fronto_parallel_roundtrip() {
        let camera = pnp_camera();
        let truth = Pose::new(Vector3::zeros(), Vector3::new(0.0, 0.0, 2.0));
        let corners = synthetic_corners(&camera, &truth);

        let pose = solve_pose(&camera, &corners).unwrap();
        assert_abs_diff_eq!(pose.translation, truth.translation, epsilon = 1e-3);
        assert_abs_diff_eq!(pose.rotation, truth.rotation, epsilon = 1e-6);
    }

    #[test]
    fn test_rotated_roundtrip() {
        let camera = pnp_camera();
        let truth = Pose::new(
            Vector3::new(0.1, -0.2, 0.05),
            Vector3::new(-0.1, 0.05, 2.5),
        );
        let corners = synthetic_corners(&camera, &truth);

        let pose = solve_pose(&camera, &corners).unwrap();
        assert_abs_diff_eq!(pose.translation, truth.translation, epsilon = 1e-3);
        assert_abs_diff_eq!(pose.rotation, truth.rotation, epsilon = 1e-4);

        let reprojected = camera.project(&camera.target().corners(), &pose).unwrap();
        for (observed, projected) in corners.iter().zip(&reprojected) {
            assert_abs_diff_eq!(observed, projected, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_distorted_roundtrip() {
        let camera = street_camera();
        let truth = Pose::new(
            Vector3::new(-0.05, 0.15, 0.02),
            Vector3::new(-0.3, -0.2, 6.0),
        );
        let corners = synthetic_corners(&camera, &truth);

        let pose = solve_pose(&camera, &corners).unwrap();
        assert_abs_diff_eq!(pose.translation, truth.translation, epsilon = 1e-3);
        assert!(pose.is_in_front());
    }

    #[test]
    fn test_noisy_corners_stay_close() {
        let camera = pnp_camera();
        let truth = Pose::new(Vector3::new(0.05, 0.1, 0.0), Vector3::new(0.02, -0.03, 2.0));
        let mut corners = synthetic_corners(&camera, &truth);
        corners[0].x += 0.4;
        corners[2].y -= 0.3;

        let normalized = corners
            .iter()
            .map(|c| camera.normalize(c).unwrap())
            .collect::<Vec<_>>();
        let plane = camera.target().corners().map(|p| Point2::new(p.x, p.y));
        let image = [normalized[0], normalized[1], normalized[2], normalized[3]];
        let h = homography::plane_homography(&plane, &image).unwrap();
        let seed = homography::decompose_homography(&h).unwrap();
        let seed_rmse = refine::corner_rmse(&camera, &corners, &seed).unwrap();

        let pose = solve_pose(&camera, &corners).unwrap();
        let pose_rmse = refine::corner_rmse(&camera, &corners, &pose).unwrap();
        assert!(pose.is_in_front());
        assert!(pose_rmse < seed_rmse);
        assert!((pose.translation - truth.translation).norm() < 0.05);
    }

    #[test]
    fn test_collinear_corners_are_degenerate() {
        let camera = pnp_camera();
        let corners = [
            Point2::new(100.0, 100.0),
            Point2::new(150.0, 100.0),
            Point2::new(200.0, 100.0),
            Point2::new(250.0, 100.0),
        ];
        assert!(matches!(
            solve_pose(&camera, &corners),
            Err(EstimationError::DegenerateGeometry(_))
        ));
    }

    #[test]
    fn test_wrong_point_count_is_degenerate() {
        let camera = pnp_camera();
        let corners = [Point2::new(100.0, 100.0), Point2::new(150.0, 100.0)];
        assert!(matches!(
            solve_pose(&camera, &corners),
            Err(EstimationError::DegenerateGeometry(_))
        ));
    }
}
