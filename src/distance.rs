//! Camera-to-target distance estimators.
//!
//! Three estimators are available, selected through [`DistanceModel`]:
//!
//! * [`DistanceModel::PinholeRatio`] uses only the pixel length of the top
//!   edge: `W * fx / |AB|`.
//! * [`DistanceModel::Radial`] is the Euclidean distance from the camera
//!   center to the target origin, `‖t‖`.
//! * [`DistanceModel::HorizontalDepth`] is the perpendicular distance from
//!   the camera center to the target plane.

use std::fmt;
use std::str::FromStr;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::camera::CameraModel;
use crate::error::EstimationError;
use crate::geometry::edge_length;
use crate::pose::Pose;

/// Distances and edge lengths at or below this are treated as zero.
const MIN_DISTANCE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceModel {
    PinholeRatio,
    Radial,
    HorizontalDepth,
}

impl DistanceModel {
    pub const ALL: [DistanceModel; 3] = [
        DistanceModel::PinholeRatio,
        DistanceModel::Radial,
        DistanceModel::HorizontalDepth,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceModel::PinholeRatio => "pinhole_ratio",
            DistanceModel::Radial => "radial",
            DistanceModel::HorizontalDepth => "horizontal_depth",
        }
    }

    /// Evaluates this model for canonical `corners` observed under `pose`.
    pub fn estimate(
        &self,
        camera: &CameraModel,
        corners: &[Point2<f64>; 4],
        pose: &Pose,
    ) -> Result<f64, EstimationError> {
        match self {
            DistanceModel::PinholeRatio => {
                pinhole_ratio_distance(camera, &corners[0], &corners[1])
            }
            DistanceModel::Radial => radial_distance(pose),
            DistanceModel::HorizontalDepth => horizontal_distance(pose),
        }
    }
}

impl fmt::Display for DistanceModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pinhole" | "pinhole_ratio" => Ok(DistanceModel::PinholeRatio),
            "radial" => Ok(DistanceModel::Radial),
            "horizontal" | "horizontal_depth" => Ok(DistanceModel::HorizontalDepth),
            other => Err(format!(
                "unknown distance model '{other}', expected pinhole, radial or horizontal"
            )),
        }
    }
}

/// `W * fx / |AB|` from the top edge of the canonical quadrilateral.
///
/// # Errors
///
/// [`EstimationError::InvalidGeometry`] if `a` and `b` coincide.
pub fn pinhole_ratio_distance(
    camera: &CameraModel,
    a: &Point2<f64>,
    b: &Point2<f64>,
) -> Result<f64, EstimationError> {
    let edge = edge_length(a, b);
    if !edge.is_finite() || edge <= MIN_DISTANCE {
        return Err(EstimationError::InvalidGeometry(format!(
            "Top edge length {edge} px cannot give a pinhole distance"
        )));
    }
    Ok(camera.target().width * camera.focal_length() / edge)
}

/// Norm of the translation vector.
pub fn radial_distance(pose: &Pose) -> Result<f64, EstimationError> {
    let distance = pose.translation.norm();
    if !distance.is_finite() || distance <= MIN_DISTANCE {
        return Err(EstimationError::InvalidGeometry(format!(
            "Radial distance {distance} is not positive"
        )));
    }
    Ok(distance)
}

/// Distance from the camera center to the target plane, `|t · (R e3)|`.
pub fn horizontal_distance(pose: &Pose) -> Result<f64, EstimationError> {
    let distance = pose.translation.dot(&pose.target_normal()).abs();
    if !distance.is_finite() || distance <= MIN_DISTANCE {
        return Err(EstimationError::InvalidGeometry(format!(
            "Horizontal depth {distance} is not positive"
        )));
    }
    Ok(distance)
}

/// Values of the selected distance models for one record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Distances {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pinhole_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub radial: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub horizontal_depth: Option<f64>,
}

impl Distances {
    /// Evaluates every model in `models`; the first failure aborts.
    pub fn compute(
        camera: &CameraModel,
        corners: &[Point2<f64>; 4],
        pose: &Pose,
        models: &[DistanceModel],
    ) -> Result<Self, EstimationError> {
        let mut distances = Self::default();
        for model in models {
            let value = model.estimate(camera, corners, pose)?;
            *distances.slot_mut(*model) = Some(value);
        }
        Ok(distances)
    }

    pub fn get(&self, model: DistanceModel) -> Option<f64> {
        match model {
            DistanceModel::PinholeRatio => self.pinhole_ratio,
            DistanceModel::Radial => self.radial,
            DistanceModel::HorizontalDepth => self.horizontal_depth,
        }
    }

    fn slot_mut(&mut self, model: DistanceModel) -> &mut Option<f64> {
        match model {
            DistanceModel::PinholeRatio => &mut self.pinhole_ratio,
            DistanceModel::Radial => &mut self.radial,
            DistanceModel::HorizontalDepth => &mut self.horizontal_depth,
        }
    }
}
