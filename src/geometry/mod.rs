//! Planar helpers shared by the canonicalizer and the pose solver.
//!
//! The functions here work directly on pixel coordinates and never depend on
//! the camera calibration.

pub mod canonical;

pub use canonical::canonicalize;

use nalgebra::Point2;

use crate::error::EstimationError;

/// Relative distance under which two corners are considered the same point.
const DUPLICATE_TOLERANCE: f64 = 1e-9;

/// Sine of the smallest angle a corner triple may span before it is treated
/// as collinear.
const COLLINEAR_TOLERANCE: f64 = 1e-6;

/// Euclidean distance between two image points.
pub fn edge_length(a: &Point2<f64>, b: &Point2<f64>) -> f64 {
    (b - a).norm()
}

/// Twice the signed area of the triangle `(a, b, c)`.
pub fn cross(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>) -> f64 {
    let ab = b - a;
    let ac = c - a;
    ab.x * ac.y - ab.y * ac.x
}

/// Checks that four corners can anchor a unique plane-to-image mapping.
///
/// # Errors
///
/// [`EstimationError::DegenerateGeometry`] if the slice does not hold exactly
/// four points, if two points coincide, or if any three points are collinear
/// (within [`COLLINEAR_TOLERANCE`]).
pub fn validate_corners(points: &[Point2<f64>]) -> Result<[Point2<f64>; 4], EstimationError> {
    let corners: [Point2<f64>; 4] = points.try_into().map_err(|_| {
        EstimationError::DegenerateGeometry(format!(
            "Expected 4 corner points, got {}",
            points.len()
        ))
    })?;

    if corners
        .iter()
        .any(|p| !p.x.is_finite() || !p.y.is_finite())
    {
        return Err(EstimationError::DegenerateGeometry(
            "Corner coordinates must be finite".to_string(),
        ));
    }

    let mut scale = 0.0f64;
    for i in 0..4 {
        for j in (i + 1)..4 {
            scale = scale.max(edge_length(&corners[i], &corners[j]));
        }
    }
    if scale <= f64::EPSILON {
        return Err(EstimationError::DegenerateGeometry(
            "All corners coincide".to_string(),
        ));
    }

    for i in 0..4 {
        for j in (i + 1)..4 {
            if edge_length(&corners[i], &corners[j]) <= DUPLICATE_TOLERANCE * scale {
                return Err(EstimationError::DegenerateGeometry(format!(
                    "Corners {i} and {j} coincide, fewer than 4 distinct points"
                )));
            }
        }
    }

    const TRIPLES: [(usize, usize, usize); 4] = [(0, 1, 2), (0, 1, 3), (0, 2, 3), (1, 2, 3)];
    for (i, j, k) in TRIPLES {
        let (a, b, c) = (&corners[i], &corners[j], &corners[k]);
        let longest = edge_length(a, b)
            .max(edge_length(a, c))
            .max(edge_length(b, c));
        if cross(a, b, c).abs() <= COLLINEAR_TOLERANCE * longest * longest {
            return Err(EstimationError::DegenerateGeometry(format!(
                "Corners {i}, {j} and {k} are collinear"
            )));
        }
    }

    Ok(corners)
}
