// THEORY:
// A `CalculationResult` is the "dumb" record produced by one permutation
// trial: the colocalisation statistics of the channel pair after one
// displacement of channel 2. It has no behavior beyond field access; the
// null-distribution layer consumes a whole sweep's worth of these, keyed by
// displacement distance, to build its empirical nulls.

/// Which colocalisation statistic a null distribution describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Statistic {
    /// Manders' M1: fraction of channel-1 intensity inside the overlap.
    M1,
    /// Manders' M2: fraction of channel-2 intensity inside the overlap.
    M2,
    /// Pearson's correlation coefficient over the overlapping pixels.
    R,
}

impl Statistic {
    pub fn label(&self) -> &'static str {
        match self {
            Statistic::M1 => "M1",
            Statistic::M2 => "M2",
            Statistic::R => "R",
        }
    }
}

/// The colocalisation statistics of a single displacement trial.
#[derive(Debug, Clone, PartialEq)]
pub struct CalculationResult {
    /// Euclidean magnitude of the applied displacement (0 for the baseline).
    pub distance: f64,
    /// Manders' M1 coefficient; NaN when the denominator is zero.
    pub m1: f64,
    /// Manders' M2 coefficient; NaN when the denominator is zero.
    pub m2: f64,
    /// Pearson's R over overlapping pixels; NaN when undefined.
    pub r: f64,
    /// Count of pixels where both channel masks and the ROI were active.
    pub overlapping_pixels: u64,
    /// Overlap as a percentage of the confinement-active area.
    pub percent_area_overlap: f64,
}

impl CalculationResult {
    /// The value of one named statistic, for null-pool extraction.
    pub fn statistic(&self, which: Statistic) -> f64 {
        match which {
            Statistic::M1 => self.m1,
            Statistic::M2 => self.m2,
            Statistic::R => self.r,
        }
    }

    /// Whether this trial is the unshifted baseline.
    pub fn is_baseline(&self) -> bool {
        self.distance == 0.0
    }
}
