// THEORY:
// All fatal conditions in the engine are precondition failures: mismatched
// channel/mask geometry, a displacement range that encloses no offsets, or a
// configuration value outside its valid domain. Every one of them is
// detectable before any pixel is touched, so the engine checks them up front
// and returns a typed error instead of computing a wrong answer.
//
// Undefined *statistics* (a correlation over zero overlapping pixels) are NOT
// errors: they propagate as NaN and surface as an "undefined significance"
// verdict downstream.

use thiserror::Error;

/// Width/height/depth of a channel or mask stack, used in error reports.
pub type Dimensions = (u32, u32, u32);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CdaError {
    /// Channel-1, channel-2, and mask stacks must share one geometry.
    #[error("dimension mismatch: expected {expected:?}, got {actual:?} for {what}")]
    DimensionMismatch {
        what: &'static str,
        expected: Dimensions,
        actual: Dimensions,
    },

    /// A backing buffer does not hold width * height * depth samples.
    #[error("{what} buffer holds {actual} samples, geometry requires {expected}")]
    BufferLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// `random_radius` must not exceed `maximum_radius`.
    #[error("invalid shift range: random radius {random_radius} exceeds maximum radius {maximum_radius}")]
    InvalidShiftRange {
        random_radius: u32,
        maximum_radius: u32,
    },

    /// The configured annulus contains no integer offsets at all.
    #[error("empty annulus: no offsets with {min_radius}^2 <= dx^2+dy^2 <= {max_radius}^2")]
    EmptyAnnulus { min_radius: u32, max_radius: u32 },

    /// A configuration field is outside its valid domain.
    #[error("invalid configuration: {field}: {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: String,
    },

    /// The sweep was cancelled before the unshifted baseline was evaluated,
    /// so there is no observed statistic to classify.
    #[error("sweep cancelled before the unshifted baseline was evaluated")]
    CancelledBeforeBaseline,

    /// A permutation worker task failed to complete.
    #[error("permutation worker failed: {0}")]
    Worker(String),
}
