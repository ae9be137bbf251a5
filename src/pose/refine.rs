//! Levenberg-Marquardt refinement of a pose seed.
//!
//! The residual is the distorted pixel reprojection error of the four target
//! corners, minimized over the six pose parameters
//! `[rx, ry, rz, tx, ty, tz]` with `tiny-solver`.

use std::collections::HashMap;

use log::{debug, warn};
use nalgebra::{DVector, Point2, Point3, Vector2, Vector3};
use tiny_solver::factors::Factor;
use tiny_solver::{LevenbergMarquardtOptimizer, Optimizer as TinySolverOptimizer};

use super::{rotate_point, Pose};
use crate::camera::CameraModel;

/// Seeds already this accurate (RMSE in pixels) are returned unchanged.
const CONVERGED_RMSE: f64 = 1e-9;

const PARAMS: &str = "pose";

/// Reprojection residual of the target corners for `tiny_solver`.
#[derive(Debug, Clone)]
struct PoseReprojectionCost {
    camera: CameraModel,
    object_points: Vec<Vector3<f64>>,
    image_points: Vec<Vector2<f64>>,
}

impl PoseReprojectionCost {
    fn new(camera: &CameraModel, object_points: &[Point3<f64>], image_points: &[Point2<f64>]) -> Self {
        Self {
            camera: camera.clone(),
            object_points: object_points.iter().map(|p| p.coords).collect(),
            image_points: image_points.iter().map(|p| p.coords).collect(),
        }
    }

    fn num_residuals(&self) -> usize {
        self.image_points.len() * 2
    }
}

impl<T: nalgebra::RealField> Factor<T> for PoseReprojectionCost {
    fn residual_func(&self, params: &[DVector<T>]) -> DVector<T> {
        let pose = &params[0];
        let rotation = Vector3::new(pose[0].clone(), pose[1].clone(), pose[2].clone());
        let translation = Vector3::new(pose[3].clone(), pose[4].clone(), pose[5].clone());

        let mut residuals = DVector::zeros(self.num_residuals());
        for (i, (object, observed)) in self
            .object_points
            .iter()
            .zip(self.image_points.iter())
            .enumerate()
        {
            let object: Vector3<T> = object.map(nalgebra::convert);
            let camera_point = rotate_point(&rotation, &object) + translation.clone();
            let projected = self.camera.project_camera_point(&camera_point);

            let observed_u: T = nalgebra::convert(observed.x);
            let observed_v: T = nalgebra::convert(observed.y);
            residuals[i * 2] = projected.x.clone() - observed_u;
            residuals[i * 2 + 1] = projected.y.clone() - observed_v;
        }
        residuals
    }
}

/// Root-mean-square pixel distance between the projected target corners and
/// `corners`, or `None` if the pose cannot project them.
pub fn corner_rmse(camera: &CameraModel, corners: &[Point2<f64>], pose: &Pose) -> Option<f64> {
    let projected = camera.project(&camera.target().corners(), pose).ok()?;
    let sum_squared: f64 = projected
        .iter()
        .zip(corners.iter())
        .map(|(p, c)| (p - c).norm_squared())
        .sum();
    let rmse = (sum_squared / corners.len() as f64).sqrt();
    rmse.is_finite().then_some(rmse)
}

/// Refines `seed` against the observed corners.
///
/// The refined pose is kept only if it is finite, keeps the target in front
/// of the camera and does not increase the reprojection error; otherwise the
/// seed is returned.
pub fn refine_pose(camera: &CameraModel, corners: &[Point2<f64>], seed: Pose) -> Pose {
    let Some(seed_rmse) = corner_rmse(camera, corners, &seed) else {
        warn!("Pose seed cannot reproject the target, skipping refinement");
        return seed;
    };
    if seed_rmse < CONVERGED_RMSE {
        debug!("Pose seed already exact (rmse {seed_rmse:e} px)");
        return seed;
    }

    let cost = PoseReprojectionCost::new(camera, &camera.target().corners(), corners);
    let num_residuals = cost.num_residuals();

    let mut problem = tiny_solver::Problem::new();
    problem.add_residual_block(num_residuals, &[PARAMS], Box::new(cost), None);

    let initial_params = DVector::from_vec(vec![
        seed.rotation.x,
        seed.rotation.y,
        seed.rotation.z,
        seed.translation.x,
        seed.translation.y,
        seed.translation.z,
    ]);
    let mut initial_values = HashMap::new();
    initial_values.insert(PARAMS.to_string(), initial_params);

    let optimizer = LevenbergMarquardtOptimizer::default();
    let Some(result) = optimizer.optimize(&problem, &initial_values, None) else {
        warn!("Pose refinement failed, keeping homography seed");
        return seed;
    };
    let Some(params) = result.get(PARAMS).filter(|p| p.len() == 6) else {
        warn!("Pose refinement returned no parameters, keeping homography seed");
        return seed;
    };

    let refined = Pose::new(
        Vector3::new(params[0], params[1], params[2]),
        Vector3::new(params[3], params[4], params[5]),
    );
    if !refined.is_finite() || !refined.is_in_front() {
        warn!(
            "Refined pose is invalid (tvec {:?}), keeping homography seed",
            refined.translation.as_slice()
        );
        return seed;
    }

    match corner_rmse(camera, corners, &refined) {
        Some(refined_rmse) if refined_rmse <= seed_rmse => {
            debug!("Pose refined: rmse {seed_rmse:.6} -> {refined_rmse:.6} px");
            refined
        }
        other => {
            warn!(
                "Refinement did not improve the pose (seed rmse {seed_rmse:.6}, refined {other:?}), keeping seed"
            );
            seed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{Intrinsics, TargetGeometry};
    use approx::assert_abs_diff_eq;

    fn camera() -> CameraModel {
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

    #[test]
    fn test_residual_is_zero_at_truth() {
        let camera = camera();
        let pose = Pose::new(Vector3::new(0.1, 0.0, -0.05), Vector3::new(0.0, 0.1, 2.0));
        let corners = camera.project(&camera.target().corners(), &pose).unwrap();
        let cost = PoseReprojectionCost::new(&camera, &camera.target().corners(), &corners);

        let params = DVector::from_vec(vec![0.1, 0.0, -0.05, 0.0, 0.1, 2.0]);
        let residuals = Factor::<f64>::residual_func(&cost, &[params]);
        assert_eq!(residuals.len(), 8);
        assert!(residuals.amax() < 1e-9);
    }

    #[test]
    fn test_exact_seed_is_returned_unchanged() {
        let camera = camera();
        let pose = Pose::new(Vector3::zeros(), Vector3::new(0.0, 0.0, 2.0));
        let corners = camera.project(&camera.target().corners(), &pose).unwrap();
        assert_eq!(refine_pose(&camera, &corners, pose), pose);
    }

    #[test]
    fn test_refinement_converges_from_perturbed_seed() {
        let camera = camera();
        let truth = Pose::new(Vector3::new(0.05, -0.1, 0.02), Vector3::new(0.05, 0.0, 2.5));
        let corners = camera.project(&camera.target().corners(), &truth).unwrap();
        let seed = Pose::new(
            truth.rotation + Vector3::new(0.02, -0.01, 0.01),
            truth.translation + Vector3::new(0.01, 0.02, -0.05),
        );

        let seed_rmse = corner_rmse(&camera, &corners, &seed).unwrap();
        let refined = refine_pose(&camera, &corners, seed);
        let refined_rmse = corner_rmse(&camera, &corners, &refined).unwrap();
        assert!(seed_rmse > 1.0);
        assert_ne!(refined, seed);
        assert!(refined_rmse < 1e-6);
        assert!(refined.is_in_front());
        assert_abs_diff_eq!(refined.translation, truth.translation, epsilon = 1e-3);
        assert_abs_diff_eq!(refined.rotation, truth.rotation, epsilon = 1e-3);
    }
}
