//! Deterministic {A, B, C, D} labelling of four unordered corners.
//!
//! ```text
//! A -------- B
//! |          |
//! D -------- C
//! ```
//!
//! A quadrilateral whose top edge comes out shorter than its left edge is
//! treated as a portrait view of the landscape target and rotated one step:
//!
//! ```text
//! A -- B                B -- C
//! |    |                |    |
//! |    |   becomes      |    |
//! |    |                |    |
//! D -- C                A -- D
//! ```
//!
//! Only this single rotation is attempted. Quadrilaterals that need a different
//! rotation keep an internally consistent but physically wrong labelling.

use std::cmp::Ordering;

use nalgebra::Point2;

use super::edge_length;

/// Orders four corners as (A top-left, B top-right, C bottom-right, D bottom-left).
///
/// The result depends only on the set of points, never on their input order,
/// so canonicalizing twice returns the same corners.
pub fn canonicalize(points: &[Point2<f64>; 4]) -> [Point2<f64>; 4] {
    let mut sorted = *points;
    sorted.sort_by(compare_xy);

    // The two left-most points hold A and D, the two right-most hold B and C.
    let (a, d) = split_by_y(sorted[0], sorted[1]);
    let (b, c) = split_by_y(sorted[2], sorted[3]);

    if edge_length(&a, &b) < edge_length(&a, &d) {
        [d, a, b, c]
    } else {
        [a, b, c, d]
    }
}

/// Lexicographic `(x, y)` ordering; NaN compares equal so sorting stays total.
fn compare_xy(p: &Point2<f64>, q: &Point2<f64>) -> Ordering {
    p.x.partial_cmp(&q.x)
        .unwrap_or(Ordering::Equal)
        .then(p.y.partial_cmp(&q.y).unwrap_or(Ordering::Equal))
}

/// Returns `(upper, lower)` by image y (smaller y is higher in the image).
fn split_by_y(first: Point2<f64>, second: Point2<f64>) -> (Point2<f64>, Point2<f64>) {
    if first.y < second.y {
        (first, second)
    } else {
        (second, first)
    }
}
