//! Error taxonomy shared by every stage of the estimation pipeline.
//!
//! All variants are scoped to a single record: a batch driver reports them and
//! moves on to the next record. The computation is deterministic, so a failing
//! input fails identically on every attempt.

/// Errors raised while canonicalizing, solving or measuring one quadrilateral.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EstimationError {
    /// The camera model cannot be used (non-invertible intrinsics, bad target size, ...).
    #[error("Invalid calibration: {0}")]
    InvalidCalibration(String),
    /// The point correspondence has no unique pose (duplicate or collinear corners).
    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),
    /// A distance model received a zero-length edge or a zero-norm result.
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),
}
