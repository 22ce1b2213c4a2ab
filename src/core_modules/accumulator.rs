// THEORY:
// The `StatisticsAccumulator` is the numerical core of every permutation
// trial. Each trial feeds it the paired intensities of every pixel where both
// channel masks and the confinement mask are active, and reads back Pearson's
// R plus the intensity sums that become Manders' M1/M2 numerators.
//
// Key architectural principles:
// 1.  **Streaming Sums**: Only `sum_x, sum_y, sum_xx, sum_yy, sum_xy, n` are
//     kept, so one accumulator per worker can be `clear()`ed between shifts
//     with no reallocation and no stored pixel data.
// 2.  **Widened Arithmetic**: `n * sum_xx` and friends exceed 64-bit range for
//     large stacks at 16-bit intensity. The cross products are therefore
//     formed in `i128` and converted to `f64` only for the final division.
//     This is a correctness requirement, not an optimization: skipping it
//     produces plausible-looking wrong correlations.
// 3.  **NaN Is an Answer**: Zero overlap or zero variance leaves the
//     correlation undefined. The accumulator reports NaN and lets the caller
//     decide what "undefined" means; it never substitutes 0.
//
// `DirectAccumulator` is the second, pair-storing computation mode. The two
// modes must agree within floating-point tolerance (including on NaN-ness),
// which the tests below and the property tests in `tests/` enforce.

/// Overflow-safe streaming accumulator for Pearson's R and Manders' sums.
#[derive(Debug, Clone, Default)]
pub struct StatisticsAccumulator {
    n: u64,
    sum_x: u64,
    sum_y: u64,
    sum_xx: u64,
    sum_yy: u64,
    sum_xy: u64,
}

impl StatisticsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one intensity pair.
    #[inline]
    pub fn add(&mut self, x: u16, y: u16) {
        let x = x as u64;
        let y = y as u64;
        self.n += 1;
        self.sum_x += x;
        self.sum_y += y;
        self.sum_xx += x * x;
        self.sum_yy += y * y;
        self.sum_xy += x * y;
    }

    /// Adds every aligned pair from two equal-length slices.
    pub fn add_slices(&mut self, xs: &[u16], ys: &[u16]) {
        self.add_slices_len(xs, ys, xs.len().min(ys.len()));
    }

    /// Adds the first `len` aligned pairs from two slices.
    pub fn add_slices_len(&mut self, xs: &[u16], ys: &[u16], len: usize) {
        for (&x, &y) in xs[..len].iter().zip(ys[..len].iter()) {
            self.add(x, y);
        }
    }

    /// Resets all sums to zero. No allocation is involved either way.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Number of pairs accumulated so far.
    pub fn n(&self) -> u64 {
        self.n
    }

    /// Sum of channel-1 intensities over the accumulated pairs (M1 numerator).
    pub fn sum_x(&self) -> u64 {
        self.sum_x
    }

    /// Sum of channel-2 intensities over the accumulated pairs (M2 numerator).
    pub fn sum_y(&self) -> u64 {
        self.sum_y
    }

    /// Pearson's R over the accumulated pairs; NaN when undefined
    /// (no pairs, or zero variance in either channel).
    pub fn correlation(&self) -> f64 {
        if self.n == 0 {
            return f64::NAN;
        }
        let n = self.n as i128;
        let numerator = n * self.sum_xy as i128 - self.sum_x as i128 * self.sum_y as i128;
        let denom_x = n * self.sum_xx as i128 - (self.sum_x as i128) * (self.sum_x as i128);
        let denom_y = n * self.sum_yy as i128 - (self.sum_y as i128) * (self.sum_y as i128);
        // Zero variance makes the denominator 0 and (by Cauchy-Schwarz) the
        // numerator 0 as well, so 0/0 yields the required NaN.
        numerator as f64 / ((denom_x as f64) * (denom_y as f64)).sqrt()
    }
}

/// Pair-storing accumulator computing R by the mean-centered formula.
/// The validation counterpart of `StatisticsAccumulator`; the two must agree.
#[derive(Debug, Clone, Default)]
pub struct DirectAccumulator {
    xs: Vec<f64>,
    ys: Vec<f64>,
}

impl DirectAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn add(&mut self, x: u16, y: u16) {
        self.xs.push(x as f64);
        self.ys.push(y as f64);
    }

    pub fn add_slices(&mut self, xs: &[u16], ys: &[u16]) {
        for (&x, &y) in xs.iter().zip(ys.iter()) {
            self.add(x, y);
        }
    }

    /// Drops the stored pairs but keeps the backing capacity.
    pub fn clear(&mut self) {
        self.xs.clear();
        self.ys.clear();
    }

    pub fn n(&self) -> u64 {
        self.xs.len() as u64
    }

    pub fn correlation(&self) -> f64 {
        let n = self.xs.len();
        if n == 0 {
            return f64::NAN;
        }
        let mean_x = self.xs.iter().sum::<f64>() / n as f64;
        let mean_y = self.ys.iter().sum::<f64>() / n as f64;
        let mut covariance = 0.0;
        let mut var_x = 0.0;
        let mut var_y = 0.0;
        for (&x, &y) in self.xs.iter().zip(self.ys.iter()) {
            let dx = x - mean_x;
            let dy = y - mean_y;
            covariance += dx * dy;
            var_x += dx * dx;
            var_y += dy * dy;
        }
        covariance / (var_x * var_y).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-12;

    fn both(xs: &[u16], ys: &[u16]) -> (f64, f64) {
        let mut streaming = StatisticsAccumulator::new();
        let mut direct = DirectAccumulator::new();
        streaming.add_slices(xs, ys);
        direct.add_slices(xs, ys);
        (streaming.correlation(), direct.correlation())
    }

    #[test]
    fn perfectly_linear_pairs_give_exactly_one() {
        let (streaming, direct) = both(&[1, 2, 3, 4, 5], &[2, 4, 6, 8, 10]);
        assert_eq!(streaming, 1.0);
        assert!((direct - 1.0).abs() < EPSILON);
    }

    #[test]
    fn anti_correlated_pairs_give_minus_one() {
        let (streaming, direct) = both(&[1, 2, 3, 4], &[8, 6, 4, 2]);
        assert!((streaming + 1.0).abs() < EPSILON);
        assert!((direct + 1.0).abs() < EPSILON);
    }

    #[test]
    fn zero_variance_is_nan_in_both_modes() {
        let (streaming, direct) = both(&[1, 1, 1, 1], &[5, 3, 8, 1]);
        assert!(streaming.is_nan());
        assert!(direct.is_nan());
    }

    #[test]
    fn empty_accumulator_is_nan() {
        assert!(StatisticsAccumulator::new().correlation().is_nan());
        assert!(DirectAccumulator::new().correlation().is_nan());
    }

    #[test]
    fn modes_agree_on_irregular_data() {
        let xs = [0u16, 7, 19, 2, 65535, 11, 900, 31];
        let ys = [5u16, 65000, 3, 44, 2, 19, 700, 65535];
        let (streaming, direct) = both(&xs, &ys);
        assert!((streaming - direct).abs() < 1e-9);
        assert!((-1.0 - EPSILON..=1.0 + EPSILON).contains(&streaming));
    }

    #[test]
    fn widened_products_survive_saturating_intensities() {
        // 200k pairs alternating between 0 and full 16-bit intensity:
        // n * sum_xx is ~2^66 and would wrap any 64-bit product.
        let mut streaming = StatisticsAccumulator::new();
        let mut direct = DirectAccumulator::new();
        for i in 0..200_000u32 {
            let x = if i % 2 == 0 { 0 } else { 65_535 };
            let y = 65_535 - x;
            streaming.add(x, y);
            direct.add(x, y);
        }
        let r = streaming.correlation();
        assert!((r - direct.correlation()).abs() < 1e-9);
        assert!((r + 1.0).abs() < 1e-9);
    }

    #[test]
    fn clear_matches_fresh_instance() {
        let xs = [3u16, 1, 4, 1, 5, 9, 2, 6];
        let ys = [2u16, 7, 1, 8, 2, 8, 1, 8];

        let mut reused = StatisticsAccumulator::new();
        reused.add_slices(&[9, 9, 9], &[1, 2, 3]);
        reused.clear();
        reused.add_slices(&xs, &ys);

        let mut fresh = StatisticsAccumulator::new();
        fresh.add_slices(&xs, &ys);

        assert_eq!(reused.n(), fresh.n());
        assert_eq!(reused.sum_x(), fresh.sum_x());
        assert_eq!(reused.correlation(), fresh.correlation());
    }

    #[test]
    fn slice_length_cap_is_honoured() {
        let mut acc = StatisticsAccumulator::new();
        acc.add_slices_len(&[1, 2, 3, 4], &[1, 2, 3, 4], 2);
        assert_eq!(acc.n(), 2);
        assert_eq!(acc.sum_x(), 3);
    }
}
