// THEORY:
// A `Shift` is the "dumb" data object of the displacement layer: one integer
// 2D offset applied to channel 2 during a permutation trial. Its only derived
// quantity is its Euclidean magnitude, which downstream code uses to decide
// whether a trial belongs to the null-distribution pool.
//
// Shifts also know how to pack themselves into a compact `u32` key
// (magnitudes plus sign bits). The keys exist purely so the sampler can
// shuffle and store candidate offsets as plain integers; `unpack` restores
// the offset exactly.

/// Magnitude limit imposed by the 14-bit packing fields.
pub const MAX_PACKABLE_RADIUS: i32 = (1 << 14) - 1;

const SIGN_X: u32 = 0b10;
const SIGN_Y: u32 = 0b01;

/// One integer displacement of channel 2 relative to channel 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Shift {
    pub dx: i32,
    pub dy: i32,
}

impl Shift {
    /// The unshifted baseline configuration.
    pub const ZERO: Shift = Shift { dx: 0, dy: 0 };

    pub fn new(dx: i32, dy: i32) -> Self {
        Self { dx, dy }
    }

    /// Euclidean magnitude of the displacement.
    pub fn distance(&self) -> f64 {
        ((self.dx as f64).powi(2) + (self.dy as f64).powi(2)).sqrt()
    }

    /// Squared magnitude, exact in integer arithmetic.
    pub fn distance_squared(&self) -> i64 {
        (self.dx as i64) * (self.dx as i64) + (self.dy as i64) * (self.dy as i64)
    }

    /// Packs the offset into `|dx| << 16 | |dy| << 2 | sign bits`.
    /// Debug-asserts that both magnitudes fit in their 14-bit fields.
    pub fn pack(&self) -> u32 {
        debug_assert!(self.dx.abs() <= MAX_PACKABLE_RADIUS);
        debug_assert!(self.dy.abs() <= MAX_PACKABLE_RADIUS);
        let mut key = ((self.dx.unsigned_abs()) << 16) | ((self.dy.unsigned_abs()) << 2);
        if self.dx < 0 {
            key |= SIGN_X;
        }
        if self.dy < 0 {
            key |= SIGN_Y;
        }
        key
    }

    /// Inverse of `pack`.
    pub fn unpack(key: u32) -> Self {
        let mut dx = (key >> 16) as i32;
        let mut dy = ((key >> 2) & 0x3FFF) as i32;
        if key & SIGN_X != 0 {
            dx = -dx;
        }
        if key & SIGN_Y != 0 {
            dy = -dy;
        }
        Self { dx, dy }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_of_three_four_is_five() {
        assert_eq!(Shift::new(3, -4).distance(), 5.0);
        assert_eq!(Shift::ZERO.distance(), 0.0);
    }

    #[test]
    fn pack_round_trips_all_sign_combinations() {
        for &(dx, dy) in &[
            (0, 0),
            (1, 0),
            (0, 1),
            (-1, 0),
            (0, -1),
            (17, -23),
            (-350, 350),
            (MAX_PACKABLE_RADIUS, -MAX_PACKABLE_RADIUS),
        ] {
            let shift = Shift::new(dx, dy);
            assert_eq!(Shift::unpack(shift.pack()), shift);
        }
    }

    #[test]
    fn distinct_offsets_pack_to_distinct_keys() {
        let mut keys = std::collections::HashSet::new();
        for dx in -5..=5 {
            for dy in -5..=5 {
                assert!(keys.insert(Shift::new(dx, dy).pack()));
            }
        }
    }
}
