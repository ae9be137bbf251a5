//! Closed-form pose seed from the target-plane homography.
//!
//! For a planar target at `z = 0` the undistorted normalized image points
//! satisfy `x ~ H * (X, Y, 1)` with `H ~ [r1 r2 t]`. Solving the four-point
//! homography exactly and decomposing it yields a rotation and translation
//! without any iteration.

use nalgebra::{Matrix3, Point2, Rotation3, SMatrix, SVector, Vector2};

use super::Pose;
use crate::error::EstimationError;

/// Smallest usable `|h33|` and column norm in the decomposition.
const EPS: f64 = 1e-12;

/// Similarity transform moving the centroid to the origin with mean
/// distance `sqrt(2)`.
fn hartley_normalization(points: &[Vector2<f64>; 4]) -> Matrix3<f64> {
    let centroid = points.iter().sum::<Vector2<f64>>() / 4.0;
    let mean_dist = points.iter().map(|p| (p - centroid).norm()).sum::<f64>() / 4.0;
    let s = if mean_dist > EPS {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };
    Matrix3::new(
        s, 0.0, -s * centroid.x, //
        0.0, s, -s * centroid.y, //
        0.0, 0.0, 1.0,
    )
}

fn apply(t: &Matrix3<f64>, p: &Vector2<f64>) -> Vector2<f64> {
    let v = t * p.push(1.0);
    Vector2::new(v.x / v.z, v.y / v.z)
}

/// Exact homography mapping `plane[i]` onto `image[i]`, scaled so `h33 = 1`.
///
/// # Errors
///
/// [`EstimationError::DegenerateGeometry`] if the 8x8 system is singular or
/// the result cannot be scaled.
pub fn plane_homography(
    plane: &[Point2<f64>; 4],
    image: &[Vector2<f64>; 4],
) -> Result<Matrix3<f64>, EstimationError> {
    let singular = || {
        EstimationError::DegenerateGeometry("Homography system is singular".to_string())
    };

    let src = plane.map(|p| p.coords);
    let t_src = hartley_normalization(&src);
    let t_dst = hartley_normalization(image);

    // Unknowns [h11 h12 h13 h21 h22 h23 h31 h32] with h33 = 1:
    //   h11 x + h12 y + h13 - u h31 x - u h32 y = u
    //   h21 x + h22 y + h23 - v h31 x - v h32 y = v
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();
    for k in 0..4 {
        let s = apply(&t_src, &src[k]);
        let d = apply(&t_dst, &image[k]);
        let (x, y, u, v) = (s.x, s.y, d.x, d.y);

        let r0 = 2 * k;
        a[(r0, 0)] = x;
        a[(r0, 1)] = y;
        a[(r0, 2)] = 1.0;
        a[(r0, 6)] = -u * x;
        a[(r0, 7)] = -u * y;
        b[r0] = u;

        let r1 = 2 * k + 1;
        a[(r1, 3)] = x;
        a[(r1, 4)] = y;
        a[(r1, 5)] = 1.0;
        a[(r1, 6)] = -v * x;
        a[(r1, 7)] = -v * y;
        b[r1] = v;
    }

    let x = a.lu().solve(&b).ok_or_else(singular)?;
    let hn = Matrix3::new(
        x[0], x[1], x[2], //
        x[3], x[4], x[5], //
        x[6], x[7], 1.0,
    );

    let t_dst_inv = t_dst.try_inverse().ok_or_else(singular)?;
    let h = t_dst_inv * hn * t_src;
    let h33 = h[(2, 2)];
    if !h33.is_finite() || h33.abs() < EPS {
        return Err(singular());
    }
    let h = h / h33;
    if h.iter().any(|v| !v.is_finite()) {
        return Err(singular());
    }
    Ok(h)
}

/// Splits `H ~ [r1 r2 t]` into a pose with the target in front of the camera.
///
/// The rotation columns are rescaled by the geometric mean of their norms and
/// the resulting matrix is projected onto SO(3).
pub fn decompose_homography(h: &Matrix3<f64>) -> Result<Pose, EstimationError> {
    let h1 = h.column(0).into_owned();
    let h2 = h.column(1).into_owned();
    let h3 = h.column(2).into_owned();

    let (n1, n2) = (h1.norm(), h2.norm());
    if n1 < EPS || n2 < EPS {
        return Err(EstimationError::DegenerateGeometry(
            "Homography has a vanishing rotation column".to_string(),
        ));
    }

    // h33 = 1 and a positive scale put the target origin at positive depth.
    let mut scale = 1.0 / (n1 * n2).sqrt();
    if h3.z * scale < 0.0 {
        scale = -scale;
    }
    let r1 = h1 * scale;
    let r2 = h2 * scale;
    let r3 = r1.cross(&r2);
    let translation = h3 * scale;

    let approx_rotation = Matrix3::from_columns(&[r1, r2, r3]);
    let rotation = nearest_rotation(&approx_rotation)?;
    let rotation = Rotation3::from_matrix_unchecked(rotation).scaled_axis();

    Ok(Pose::new(rotation, translation))
}

/// Closest rotation matrix in the Frobenius sense (`U * Vᵀ`).
fn nearest_rotation(m: &Matrix3<f64>) -> Result<Matrix3<f64>, EstimationError> {
    let svd_failed = || EstimationError::DegenerateGeometry("SVD of rotation failed".to_string());
    let svd = m.svd(true, true);
    let u = svd.u.ok_or_else(svd_failed)?;
    let v_t = svd.v_t.ok_or_else(svd_failed)?;
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let mut u_fix = u;
        u_fix.column_mut(2).neg_mut();
        r = u_fix * v_t;
    }
    Ok(r)
}
