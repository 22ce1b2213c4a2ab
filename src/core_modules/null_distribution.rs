// THEORY:
// The null-distribution layer turns a sweep's trial results into a
// significance verdict. Trials displaced further than the random radius are
// assumed independent of the true configuration; their statistics form an
// empirical null. The observed (unshifted) statistic is then placed against
// exact sorted-sample percentiles of that null.
//
// Key architectural principles:
// 1.  **Exact Percentiles Decide**: The verdict comes from sorted samples and
//     the index formula `lower = ceil(N*p)`, `upper = N - ceil(N*p) - 1`
//     (clamped to [0, N-1]). The equal-width histogram built alongside is
//     display material only and is never consulted for the decision.
// 2.  **NaN Carries No Order**: Undefined trial statistics cannot rank
//     against real ones, so they are excluded from the pool and counted.
//     An undefined *observed* statistic yields no verdict at all
//     (`None`), never a silent "not significant."
// 3.  **One Pool Per Statistic**: M1, M2, and R get independent distributions
//     over the same trial set; a channel pair can be significant in one
//     statistic and not another.

use log::warn;

use crate::core_modules::sweep_result::{CalculationResult, Statistic};

/// Three-way outcome of the permutation test for one statistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignificanceVerdict {
    /// Observed value at or above the upper percentile limit.
    SignificantColocated,
    /// Observed value at or below the lower percentile limit.
    SignificantNotColocated,
    /// Observed value inside the null's central mass.
    NotSignificant,
}

/// The two-tailed percentile limits of a null distribution at some level p.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PercentileLimits {
    pub lower_index: usize,
    pub upper_index: usize,
    /// Null sample value at `lower_index`.
    pub lower_limit: f64,
    /// Null sample value at `upper_index`.
    pub upper_limit: f64,
}

/// Equal-width binning of a null distribution, for display only.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    /// Smallest finite sample; left edge of bin 0.
    pub min: f64,
    /// Largest finite sample; right edge of the last bin.
    pub max: f64,
    pub bin_width: f64,
    pub counts: Vec<u32>,
}

impl Histogram {
    /// Fraction of samples per bin (probability mass for plotting).
    pub fn fractions(&self) -> Vec<f64> {
        let total: u32 = self.counts.iter().sum();
        if total == 0 {
            return vec![0.0; self.counts.len()];
        }
        self.counts
            .iter()
            .map(|&c| c as f64 / total as f64)
            .collect()
    }
}

/// Sorted empirical null of one statistic over the displaced trials.
#[derive(Debug, Clone)]
pub struct NullDistribution {
    /// Finite samples, ascending.
    samples: Vec<f64>,
    /// Trials whose statistic was undefined and therefore excluded.
    nan_count: usize,
}

impl NullDistribution {
    /// Builds the pool for `which` from every trial strictly further out
    /// than `random_radius`. The strict cut is deliberate: the boundary
    /// trial at exactly the random radius is not assumed independent.
    pub fn from_results(
        results: &[CalculationResult],
        which: Statistic,
        random_radius: u32,
    ) -> Self {
        let cut = random_radius as f64;
        let mut samples = Vec::new();
        let mut nan_count = 0usize;
        for result in results {
            if result.distance <= cut {
                continue;
            }
            let value = result.statistic(which);
            if value.is_nan() {
                nan_count += 1;
            } else {
                samples.push(value);
            }
        }
        if nan_count > 0 {
            warn!(
                "{} null pool: {} undefined sample(s) excluded",
                which.label(),
                nan_count
            );
        }
        samples.sort_by(|a, b| a.total_cmp(b));
        Self { samples, nan_count }
    }

    /// Builds a pool directly from raw samples (NaN excluded and counted).
    pub fn from_samples(values: impl IntoIterator<Item = f64>) -> Self {
        let mut samples = Vec::new();
        let mut nan_count = 0usize;
        for value in values {
            if value.is_nan() {
                nan_count += 1;
            } else {
                samples.push(value);
            }
        }
        samples.sort_by(|a, b| a.total_cmp(b));
        Self { samples, nan_count }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn nan_count(&self) -> usize {
        self.nan_count
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// Two-tailed limits at level `p_value`; `None` for an empty pool.
    pub fn limits(&self, p_value: f64) -> Option<PercentileLimits> {
        let n = self.samples.len();
        if n == 0 {
            return None;
        }
        let tail = (n as f64 * p_value).ceil() as usize;
        let lower_index = tail.min(n - 1);
        let upper_index = (n as i64 - tail as i64 - 1).clamp(0, n as i64 - 1) as usize;
        Some(PercentileLimits {
            lower_index,
            upper_index,
            lower_limit: self.samples[lower_index],
            upper_limit: self.samples[upper_index],
        })
    }

    /// Places the observed statistic against the percentile limits.
    /// `None` means the significance is undefined (NaN observed, empty pool).
    pub fn classify(&self, observed: f64, p_value: f64) -> Option<SignificanceVerdict> {
        if observed.is_nan() {
            return None;
        }
        let limits = self.limits(p_value)?;
        if observed >= limits.upper_limit {
            Some(SignificanceVerdict::SignificantColocated)
        } else if observed <= limits.lower_limit {
            Some(SignificanceVerdict::SignificantNotColocated)
        } else {
            Some(SignificanceVerdict::NotSignificant)
        }
    }

    /// Equal-width histogram of the pool for display; `None` when empty.
    pub fn histogram(&self, bins: usize) -> Option<Histogram> {
        if self.samples.is_empty() || bins == 0 {
            return None;
        }
        let min = self.samples[0];
        let max = self.samples[self.samples.len() - 1];
        let span = max - min;
        let bin_width = span / bins as f64;
        let mut counts = vec![0u32; bins];
        for &value in &self.samples {
            let bin = if span == 0.0 {
                0
            } else {
                (((value - min) / bin_width) as usize).min(bins - 1)
            };
            counts[bin] += 1;
        }
        Some(Histogram {
            min,
            max,
            bin_width,
            counts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_pool(n: usize) -> NullDistribution {
        NullDistribution::from_samples((0..n).map(|i| i as f64))
    }

    #[test]
    fn percentile_formula_excludes_the_expected_tails() {
        // 100 uniform samples at p = 0.05: indices 5 and 94, so exactly
        // 5 samples sit strictly below the lower limit and 5 strictly above
        // the upper limit.
        let pool = uniform_pool(100);
        let limits = pool.limits(0.05).unwrap();
        assert_eq!(limits.lower_index, 5);
        assert_eq!(limits.upper_index, 94);

        let below = pool
            .samples()
            .iter()
            .filter(|&&v| v < limits.lower_limit)
            .count();
        let above = pool
            .samples()
            .iter()
            .filter(|&&v| v > limits.upper_limit)
            .count();
        assert_eq!(below, 5);
        assert_eq!(above, 5);
    }

    #[test]
    fn indices_clamp_on_tiny_pools() {
        let pool = uniform_pool(3);
        let limits = pool.limits(0.4).unwrap();
        // ceil(3 * 0.4) = 2: lower clamps inside, upper clamps to 0.
        assert_eq!(limits.lower_index, 2);
        assert_eq!(limits.upper_index, 0);

        let single = uniform_pool(1);
        let limits = single.limits(0.05).unwrap();
        assert_eq!(limits.lower_index, 0);
        assert_eq!(limits.upper_index, 0);
    }

    #[test]
    fn classification_covers_all_three_verdicts() {
        let pool = uniform_pool(100);
        assert_eq!(
            pool.classify(99.0, 0.05),
            Some(SignificanceVerdict::SignificantColocated)
        );
        assert_eq!(
            pool.classify(1.0, 0.05),
            Some(SignificanceVerdict::SignificantNotColocated)
        );
        assert_eq!(
            pool.classify(50.0, 0.05),
            Some(SignificanceVerdict::NotSignificant)
        );
    }

    #[test]
    fn nan_observed_and_empty_pool_have_no_verdict() {
        let pool = uniform_pool(100);
        assert_eq!(pool.classify(f64::NAN, 0.05), None);

        let empty = NullDistribution::from_samples(std::iter::empty());
        assert_eq!(empty.classify(0.5, 0.05), None);
        assert!(empty.limits(0.05).is_none());
    }

    #[test]
    fn nan_samples_are_excluded_and_counted() {
        let pool =
            NullDistribution::from_samples(vec![0.2, f64::NAN, 0.4, f64::NAN, 0.1]);
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.nan_count(), 2);
        assert_eq!(pool.samples(), &[0.1, 0.2, 0.4]);
    }

    #[test]
    fn strict_distance_cut_builds_the_pool() {
        let trial = |distance: f64, r: f64| CalculationResult {
            distance,
            m1: 0.0,
            m2: 0.0,
            r,
            overlapping_pixels: 1,
            percent_area_overlap: 0.0,
        };
        let results = vec![
            trial(0.0, 0.9),  // baseline: never pooled
            trial(5.0, 0.5),  // at the cut: excluded (strict)
            trial(5.1, 0.3),
            trial(8.0, 0.1),
        ];
        let pool = NullDistribution::from_results(&results, Statistic::R, 5);
        assert_eq!(pool.samples(), &[0.1, 0.3]);
    }

    #[test]
    fn histogram_partitions_the_observed_range() {
        let pool = NullDistribution::from_samples(vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        let histogram = pool.histogram(4).unwrap();
        assert_eq!(histogram.min, 0.0);
        assert_eq!(histogram.max, 1.0);
        assert_eq!(histogram.counts, vec![1, 1, 1, 2]); // max lands in the last bin
        assert_eq!(histogram.counts.iter().sum::<u32>() as usize, pool.len());

        let fractions = histogram.fractions();
        assert!((fractions.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn degenerate_histogram_collapses_to_one_bin() {
        let pool = NullDistribution::from_samples(vec![0.5; 10]);
        let histogram = pool.histogram(8).unwrap();
        assert_eq!(histogram.counts[0], 10);
        assert_eq!(histogram.counts[1..].iter().sum::<u32>(), 0);
    }
}
