//! Sign Distance Library
//!
//! Estimates the distance from a calibrated camera to a flat rectangular
//! target (a sign) of known size, given the four image corners of the target.
//!
//! The pipeline for one observation is:
//! - canonicalize the four unordered corners into {A, B, C, D} ([`geometry`])
//! - solve the target pose with a homography seed and tiny-solver
//!   Levenberg-Marquardt refinement ([`pose`])
//! - derive distances from the pose or the pixel geometry ([`distance`])
//! - reproject the target model to measure the fit ([`reprojection`])
//!
//! [`Quadrilateral`] runs these steps eagerly for one record, and
//! [`dataset`] batches them over labelled datasets.

pub mod camera;
pub mod dataset;
pub mod distance;
pub mod error;
pub mod geometry;
pub mod pose;
pub mod quadrilateral;
pub mod reprojection;

// Re-export commonly used types
pub use camera::{
    CalibrationProfile, CameraModel, Intrinsics, ProfileError, RadTanDistortion, Resolution,
    TargetGeometry,
};
pub use dataset::{DatasetError, DatasetSummary, InputFormat, LabelRecord, RecordFailure};
pub use distance::{DistanceModel, Distances};
pub use error::EstimationError;
pub use geometry::canonicalize;
pub use pose::{solve_pose, Pose};
pub use quadrilateral::Quadrilateral;
pub use reprojection::{reproject, reprojection_error, AxisError, ProjectionError};
