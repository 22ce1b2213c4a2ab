// THEORY:
// The `ShiftSampler` decides *which* displacements a sweep evaluates. It
// enumerates every integer offset inside the configured annulus, packs each
// one into a compact key, and (when the annulus holds more offsets than the
// permutation budget) Fisher-Yates shuffles the keys and keeps the first N.
//
// Key architectural principles:
// 1.  **Inclusive Annulus, Strict Null Cut**: Membership here is
//     `min_radius^2 <= dx^2+dy^2 <= max_radius^2`, inclusive on both bounds.
//     The null-distribution pool applies its own, strict `distance >
//     random_radius` cut later. One boundary policy, applied everywhere.
// 2.  **The Baseline Is Not a Sample**: The zero shift is always prepended
//     exactly once, outside the randomized budget. It is the observed
//     configuration under test, never part of the null.
// 3.  **Single-Threaded Selection**: Sampling finishes on the caller's thread
//     before any parallel dispatch, so a fixed seed reproduces *which* shifts
//     run even though workers interleave freely.
// 4.  **Caller-Owned Seed Policy**: Whether the shuffle is reproducible
//     (`Fixed`) or fresh per run (`Entropy`) is configuration, not something
//     this module hardcodes.
// 5.  **Sub-Random Sampling**: When requested, enumeration widens to the full
//     punctured disc `1 <= dx^2+dy^2 <= max_radius^2` so the region inside
//     the random radius is sampled for the distance curve as well.

use crate::core_modules::shift::{MAX_PACKABLE_RADIUS, Shift};
use crate::error::CdaError;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Whether a run's random choices are reproducible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedPolicy {
    /// Seed the generator explicitly; identical runs pick identical shifts.
    Fixed(u64),
    /// Seed from the operating system; every run picks afresh.
    Entropy,
}

impl SeedPolicy {
    fn rng(&self) -> StdRng {
        match *self {
            SeedPolicy::Fixed(seed) => StdRng::seed_from_u64(seed),
            SeedPolicy::Entropy => StdRng::from_os_rng(),
        }
    }
}

/// Enumerates and subsamples the integer displacements of one sweep.
#[derive(Debug, Clone)]
pub struct ShiftSampler {
    min_radius: u32,
    max_radius: u32,
    /// Widen enumeration to the full punctured disc for the distance curve.
    sub_random_samples: bool,
}

impl ShiftSampler {
    pub fn new(
        min_radius: u32,
        max_radius: u32,
        sub_random_samples: bool,
    ) -> Result<Self, CdaError> {
        if min_radius > max_radius {
            return Err(CdaError::InvalidShiftRange {
                random_radius: min_radius,
                maximum_radius: max_radius,
            });
        }
        if max_radius == 0 {
            return Err(CdaError::EmptyAnnulus {
                min_radius,
                max_radius,
            });
        }
        // Beyond this bound, magnitudes no longer fit the 14-bit packing
        // fields and distinct offsets would collide on the same key.
        if max_radius > MAX_PACKABLE_RADIUS as u32 {
            return Err(CdaError::InvalidConfig {
                field: "maximum_radius",
                reason: format!("{max_radius} exceeds the packable limit {MAX_PACKABLE_RADIUS}"),
            });
        }
        Ok(Self {
            min_radius,
            max_radius,
            sub_random_samples,
        })
    }

    /// Every packed offset key inside the configured region, zero excluded.
    ///
    /// Scans the full `(2*max_radius + 1)^2` bounding square, so the whole
    /// candidate set is materialized before any budget truncation. Radii are
    /// capped at `MAX_PACKABLE_RADIUS` by `new`; hosts wanting sparse
    /// coverage of a very large annulus should shrink the radius rather
    /// than rely on the budget alone.
    fn enumerate_keys(&self) -> Vec<u32> {
        let max = self.max_radius as i64;
        let max_sq = max * max;
        let min_sq = if self.sub_random_samples {
            1
        } else {
            (self.min_radius as i64) * (self.min_radius as i64)
        };

        let mut keys = Vec::new();
        for dx in -(max as i32)..=(max as i32) {
            for dy in -(max as i32)..=(max as i32) {
                let shift = Shift::new(dx, dy);
                let d_sq = shift.distance_squared();
                if d_sq == 0 {
                    continue;
                }
                if d_sq >= min_sq && d_sq <= max_sq {
                    keys.push(shift.pack());
                }
            }
        }
        keys
    }

    /// Produces the sweep's shift list: the zero-shift baseline first, then
    /// at most `budget` randomly chosen annulus offsets.
    pub fn sample(&self, budget: usize, seed: &SeedPolicy) -> Result<Vec<Shift>, CdaError> {
        let mut keys = self.enumerate_keys();
        if keys.is_empty() {
            return Err(CdaError::EmptyAnnulus {
                min_radius: self.min_radius,
                max_radius: self.max_radius,
            });
        }

        if keys.len() > budget {
            let mut rng = seed.rng();
            keys.shuffle(&mut rng);
            keys.truncate(budget);
        }

        let mut shifts = Vec::with_capacity(keys.len() + 1);
        shifts.push(Shift::ZERO);
        shifts.extend(keys.into_iter().map(Shift::unpack));
        Ok(shifts)
    }
}
