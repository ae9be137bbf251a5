//! Radial-Tangential (Brown-Conrady) lens distortion.
//!
//! The distortion acts on normalized image coordinates `(x/z, y/z)`. The
//! forward mapping is written generically over [`nalgebra::RealField`] so the
//! same formula serves plain projection and the auto-differentiated residual
//! of the pose refinement.

use nalgebra::{Matrix2, RealField, Vector2};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::EstimationError;

/// The five distortion coefficients `[k1, k2, p1, p2, k3]`.
///
/// * `k1`, `k2`, `k3`: radial distortion coefficients.
/// * `p1`, `p2`: tangential distortion coefficients.
#[derive(Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RadTanDistortion {
    pub coefficients: [f64; 5],
}

impl RadTanDistortion {
    /// Builds the coefficients from a calibration vector.
    ///
    /// Accepts an empty vector (no distortion), the four-coefficient form
    /// `[k1, k2, p1, p2]` or the full `[k1, k2, p1, p2, k3]`.
    ///
    /// # Errors
    ///
    /// [`EstimationError::InvalidCalibration`] for any other length or for
    /// non-finite values.
    pub fn from_slice(values: &[f64]) -> Result<Self, EstimationError> {
        let mut coefficients = [0.0; 5];
        match values.len() {
            0 => {}
            4 | 5 => coefficients[..values.len()].copy_from_slice(values),
            n => {
                return Err(EstimationError::InvalidCalibration(format!(
                    "RadTan distortion requires 0, 4 or 5 coefficients, got {n}"
                )))
            }
        }
        if coefficients.iter().any(|c| !c.is_finite()) {
            return Err(EstimationError::InvalidCalibration(
                "Distortion coefficients must be finite".to_string(),
            ));
        }
        Ok(Self { coefficients })
    }

    pub fn is_zero(&self) -> bool {
        self.coefficients.iter().all(|c| *c == 0.0)
    }

    /// Applies distortion to a normalized image point.
    pub fn distort<T: RealField>(&self, x: T, y: T) -> (T, T) {
        let [k1, k2, p1, p2, k3] = self.coefficients.map(nalgebra::convert::<f64, T>);
        let two: T = nalgebra::convert(2.0);

        let r2 = x.clone() * x.clone() + y.clone() * y.clone();
        let r4 = r2.clone() * r2.clone();
        let r6 = r4.clone() * r2.clone();
        let radial = T::one() + k1 * r2.clone() + k2 * r4 + k3 * r6;

        let xy = x.clone() * y.clone();
        let x_distorted = x.clone() * radial.clone()
            + two.clone() * p1.clone() * xy.clone()
            + p2.clone() * (r2.clone() + two.clone() * x.clone() * x);
        let y_distorted = y.clone() * radial
            + p1 * (r2 + two.clone() * y.clone() * y)
            + two * p2 * xy;

        (x_distorted, y_distorted)
    }

    /// Inverts [`RadTanDistortion::distort`] with Newton iterations.
    ///
    /// # Errors
    ///
    /// [`EstimationError::InvalidGeometry`] when the Jacobian becomes singular
    /// or the iteration does not converge.
    pub fn undistort(&self, distorted: &Vector2<f64>) -> Result<Vector2<f64>, EstimationError> {
        if self.is_zero() {
            return Ok(*distorted);
        }

        const EPS: f64 = 1e-12;
        const MAX_ITERATIONS: u32 = 100;

        let [k1, k2, p1, p2, k3] = self.coefficients;
        let mut point = *distorted;

        for _ in 0..MAX_ITERATIONS {
            let (x, y) = (point.x, point.y);
            let (xd, yd) = self.distort(x, y);
            let error = Vector2::new(xd, yd) - distorted;
            if error.norm() < EPS {
                return Ok(point);
            }

            let r2 = x * x + y * y;
            let r4 = r2 * r2;
            let radial = 1.0 + k1 * r2 + k2 * r4 + k3 * r4 * r2;
            // d(radial)/d(r2)
            let d_radial = k1 + 2.0 * k2 * r2 + 3.0 * k3 * r4;

            let j00 = radial + 2.0 * x * x * d_radial + 2.0 * p1 * y + 6.0 * p2 * x;
            let j01 = 2.0 * x * y * d_radial + 2.0 * p1 * x + 2.0 * p2 * y;
            let j10 = 2.0 * x * y * d_radial + 2.0 * p1 * x + 2.0 * p2 * y;
            let j11 = radial + 2.0 * y * y * d_radial + 6.0 * p1 * y + 2.0 * p2 * x;

            let jacobian = Matrix2::new(j00, j01, j10, j11);
            let inv_jacobian = jacobian.try_inverse().ok_or_else(|| {
                EstimationError::InvalidGeometry("Distortion Jacobian is singular".to_string())
            })?;
            let delta = inv_jacobian * error;
            point -= delta;

            if delta.norm() < EPS {
                return Ok(point);
            }
        }

        Err(EstimationError::InvalidGeometry(format!(
            "Undistortion did not converge after {MAX_ITERATIONS} iterations"
        )))
    }
}

impl fmt::Debug for RadTanDistortion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [k1, k2, p1, p2, k3] = self.coefficients;
        write!(
            f,
            "RadTan [k1: {k1} k2: {k2} p1: {p1} p2: {p2} k3: {k3}]"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn street_distortion() -> RadTanDistortion {
        RadTanDistortion::from_slice(&[
            0.3625525153631118,
            -3.2679279813000974,
            -0.0021839532687696257,
            0.005111306480977345,
            9.299685322344486,
        ])
        .unwrap()
    }

    #[test]
    fn test_from_slice_lengths() {
        assert!(RadTanDistortion::from_slice(&[]).unwrap().is_zero());

        let four = RadTanDistortion::from_slice(&[0.1, 0.2, 0.3, 0.4]).unwrap();
        assert_eq!(four.coefficients, [0.1, 0.2, 0.3, 0.4, 0.0]);

        assert!(matches!(
            RadTanDistortion::from_slice(&[0.1, 0.2]),
            Err(EstimationError::InvalidCalibration(_))
        ));
        assert!(matches!(
            RadTanDistortion::from_slice(&[f64::NAN, 0.0, 0.0, 0.0]),
            Err(EstimationError::InvalidCalibration(_))
        ));
    }

    #[test]
    fn test_zero_distortion_is_identity() {
        let distortion = RadTanDistortion::default();
        let (x, y) = distortion.distort(0.25, -0.4);
        assert_eq!((x, y), (0.25, -0.4));
    }

    #[test]
    fn test_distort_undistort_roundtrip() {
        let distortion = street_distortion();
        for (x, y) in [(0.0, 0.0), (0.1, -0.05), (-0.2, 0.15), (0.05, 0.2)] {
            let (xd, yd) = distortion.distort(x, y);
            let undistorted = distortion.undistort(&Vector2::new(xd, yd)).unwrap();
            assert_abs_diff_eq!(undistorted.x, x, epsilon = 1e-9);
            assert_abs_diff_eq!(undistorted.y, y, epsilon = 1e-9);
        }
    }
}
