//! Reprojection of the target model and the resulting pixel error.

use std::fmt;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::camera::CameraModel;
use crate::error::EstimationError;
use crate::pose::Pose;

/// Mean absolute per-axis pixel error between observed and reprojected corners.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AxisError {
    pub x: f64,
    pub y: f64,
}

impl AxisError {
    /// Length of the `(x, y)` error vector.
    pub fn magnitude(&self) -> f64 {
        self.x.hypot(self.y)
    }
}

/// Projects the four target corners through `pose`, in {A, B, C, D} order.
pub fn reproject(camera: &CameraModel, pose: &Pose) -> Result<[Point2<f64>; 4], EstimationError> {
    let corners = camera.target().corners();
    let mut projected = [Point2::origin(); 4];
    for (slot, corner) in projected.iter_mut().zip(corners.iter()) {
        *slot = camera.project_point(corner, pose)?;
    }
    Ok(projected)
}

pub fn reprojection_error(observed: &[Point2<f64>; 4], reprojected: &[Point2<f64>; 4]) -> AxisError {
    let n = observed.len() as f64;
    let (sum_x, sum_y) = observed
        .iter()
        .zip(reprojected.iter())
        .fold((0.0, 0.0), |(sx, sy), (o, r)| {
            (sx + (o.x - r.x).abs(), sy + (o.y - r.y).abs())
        });
    AxisError {
        x: sum_x / n,
        y: sum_y / n,
    }
}

/// Dataset-level mean of per-record errors; `None` for an empty set.
pub fn mean_axis_error<'a, I>(errors: I) -> Option<AxisError>
where
    I: IntoIterator<Item = &'a AxisError>,
{
    let (count, sum_x, sum_y) = errors
        .into_iter()
        .fold((0usize, 0.0, 0.0), |(n, sx, sy), e| (n + 1, sx + e.x, sy + e.y));
    (count > 0).then(|| AxisError {
        x: sum_x / count as f64,
        y: sum_y / count as f64,
    })
}

/// Auxiliary points drawn over the image: the center normal arrow and the
/// corners lifted along the target normal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Overlay {
    pub center_normal: [Point2<f64>; 2],
    pub parallel_corners: [Point2<f64>; 4],
}

impl Overlay {
    pub fn project(camera: &CameraModel, pose: &Pose) -> Result<Self, EstimationError> {
        let target = camera.target();
        let [start, end] = target.center_normal();
        let center_normal = [
            camera.project_point(&start, pose)?,
            camera.project_point(&end, pose)?,
        ];

        let mut parallel_corners = [Point2::origin(); 4];
        for (slot, corner) in parallel_corners.iter_mut().zip(target.parallel_corners().iter()) {
            *slot = camera.project_point(corner, pose)?;
        }

        Ok(Self {
            center_normal,
            parallel_corners,
        })
    }
}

/// Integer drawing coordinates, truncated toward zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayPixels {
    pub corners: [[i32; 2]; 4],
    pub center_normal: [[i32; 2]; 2],
    pub parallel_corners: [[i32; 2]; 4],
}

fn truncate(point: &Point2<f64>) -> [i32; 2] {
    [point.x as i32, point.y as i32]
}

pub fn overlay_pixels(reprojected: &[Point2<f64>; 4], overlay: &Overlay) -> OverlayPixels {
    OverlayPixels {
        corners: reprojected.map(|p| truncate(&p)),
        center_normal: overlay.center_normal.map(|p| truncate(&p)),
        parallel_corners: overlay.parallel_corners.map(|p| truncate(&p)),
    }
}

/// Summary statistics of a set of pixel errors.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProjectionError {
    pub rmse: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stddev: f64,
    pub median: f64,
}

impl ProjectionError {
    /// Statistics over `errors`, or `None` when there are no samples.
    pub fn from_samples(errors: &[f64]) -> Option<Self> {
        if errors.is_empty() {
            return None;
        }

        let n = errors.len() as f64;
        let mean = errors.iter().sum::<f64>() / n;
        let variance = errors.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        let rmse = (errors.iter().map(|x| x.powi(2)).sum::<f64>() / n).sqrt();
        let min = errors.iter().fold(f64::INFINITY, |a, &b| a.min(b));
        let max = errors.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));

        let mut sorted = errors.to_vec();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        };

        Some(Self {
            rmse,
            min,
            max,
            mean,
            stddev: variance.sqrt(),
            median,
        })
    }
}

impl fmt::Debug for ProjectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Projection Error [ rmse: {}, min: {}, max: {}, mean: {}, stddev: {}, median: {} ]",
            self.rmse, self.min, self.max, self.mean, self.stddev, self.median
        )
    }
}
