// THEORY:
// The `ToroidalShifter` manufactures the "null" configurations of channel 2.
// Instead of translating the image (which would drag content across the ROI
// boundary and change which pixels participate), it *permutes* channel-2
// values and mask bytes among the confinement-active positions only, wrapping
// around the count of active sites rather than the image edge. The mask's
// shape is preserved exactly while its content is decorrelated.
//
// Key architectural principles:
// 1.  **Precomputed Site Lists**: At construction the shifter records, per
//     row, the ordered x-positions where the confinement mask is active, and
//     per column the ordered active y-positions (the transposed view). A
//     sweep applies hundreds of shifts against the same geometry, so this is
//     computed once and shared read-only across workers.
// 2.  **Lock-Step Rotation**: A shift (dx, dy) rotates each row's values and
//     mask bytes together by `dx mod site_count` (rotate right), then each
//     column's by `dy mod site_count`. Value and mask must travel as one unit
//     or the shifted mask would no longer describe the shifted content.
// 3.  **Row Pass Then Column Pass**: The two passes compose sequentially.
//     This is intentionally NOT a pure 2D translation; the composition is
//     what defines the permutation's statistical properties, and it must not
//     be "simplified" into one.
// 4.  **Per-Slice Independence**: 3D stacks repeat the 2D operation on every
//     z-slice; nothing ever moves across z.

use crate::core_modules::channel_stack::ConfinementMask;
use crate::core_modules::shift::Shift;
use crate::error::CdaError;

/// ROI-constrained wrap-around permuter for channel-2 value+mask planes.
#[derive(Debug, Clone)]
pub struct ToroidalShifter {
    width: u32,
    height: u32,
    depth: u32,
    /// Active x-positions per (z, y) row, ascending.
    row_sites: Vec<Vec<u32>>,
    /// Active y-positions per (z, x) column, ascending.
    col_sites: Vec<Vec<u32>>,
}

impl ToroidalShifter {
    /// Builds site lists for the given geometry. A missing confinement mask
    /// means every position is active; a present one must match the geometry.
    pub fn new(
        width: u32,
        height: u32,
        depth: u32,
        confinement: Option<&ConfinementMask>,
    ) -> Result<Self, CdaError> {
        if let Some(roi) = confinement {
            if roi.dimensions() != (width, height, depth) {
                return Err(CdaError::DimensionMismatch {
                    what: "confinement mask",
                    expected: (width, height, depth),
                    actual: roi.dimensions(),
                });
            }
        }

        let slice_len = (width as usize) * (height as usize);
        let mut row_sites = Vec::with_capacity((depth as usize) * (height as usize));
        let mut col_sites = Vec::with_capacity((depth as usize) * (width as usize));

        for z in 0..depth {
            let slice = (z as usize) * slice_len;
            for y in 0..height {
                let mut sites = Vec::new();
                for x in 0..width {
                    let idx = slice + (y as usize) * (width as usize) + x as usize;
                    if confinement.map_or(true, |roi| roi.is_active(idx)) {
                        sites.push(x);
                    }
                }
                row_sites.push(sites);
            }
            for x in 0..width {
                let mut sites = Vec::new();
                for y in 0..height {
                    let idx = slice + (y as usize) * (width as usize) + x as usize;
                    if confinement.map_or(true, |roi| roi.is_active(idx)) {
                        sites.push(y);
                    }
                }
                col_sites.push(sites);
            }
        }

        Ok(Self {
            width,
            height,
            depth,
            row_sites,
            col_sites,
        })
    }

    pub fn dimensions(&self) -> (u32, u32, u32) {
        (self.width, self.height, self.depth)
    }

    /// Applies the toroidal permutation to a channel's value and mask planes
    /// in place. Buffers must cover the shifter's full geometry.
    pub fn shift(&self, values: &mut [u16], mask: &mut [u8], shift: Shift) -> Result<(), CdaError> {
        let expected = (self.width as usize) * (self.height as usize) * (self.depth as usize);
        if values.len() != expected {
            return Err(CdaError::BufferLength {
                what: "shifted values",
                expected,
                actual: values.len(),
            });
        }
        if mask.len() != expected {
            return Err(CdaError::BufferLength {
                what: "shifted mask",
                expected,
                actual: mask.len(),
            });
        }

        let width = self.width as usize;
        let slice_len = width * self.height as usize;
        let mut scratch_values: Vec<u16> = Vec::new();
        let mut scratch_mask: Vec<u8> = Vec::new();

        for z in 0..self.depth as usize {
            let slice = z * slice_len;

            // Row pass: rotate active sites of each row right by dx.
            for y in 0..self.height as usize {
                let sites = &self.row_sites[z * self.height as usize + y];
                let row = slice + y * width;
                rotate_sites(values, mask, sites, shift.dx, &mut scratch_values, &mut scratch_mask, |x| {
                    row + x as usize
                });
            }

            // Column pass: rotate active sites of each column right by dy.
            for x in 0..width {
                let sites = &self.col_sites[z * width + x];
                rotate_sites(values, mask, sites, shift.dy, &mut scratch_values, &mut scratch_mask, |y| {
                    slice + (y as usize) * width + x
                });
            }
        }
        Ok(())
    }
}

/// Rotates the values and mask bytes at `sites` right by `amount`, in
/// lock-step, wrapping at the site count. `index_of` maps a site coordinate
/// to its flat buffer index.
fn rotate_sites(
    values: &mut [u16],
    mask: &mut [u8],
    sites: &[u32],
    amount: i32,
    scratch_values: &mut Vec<u16>,
    scratch_mask: &mut Vec<u8>,
    index_of: impl Fn(u32) -> usize,
) {
    let count = sites.len();
    if count == 0 {
        return;
    }
    let rotation = amount.rem_euclid(count as i32) as usize;
    if rotation == 0 {
        return;
    }

    scratch_values.clear();
    scratch_mask.clear();
    for &site in sites {
        let idx = index_of(site);
        scratch_values.push(values[idx]);
        scratch_mask.push(mask[idx]);
    }
    for (i, &site) in sites.iter().enumerate() {
        let src = (i + count - rotation) % count;
        let idx = index_of(site);
        values[idx] = scratch_values[src];
        mask[idx] = scratch_mask[src];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::channel_stack::{MASK_ACTIVE, MASK_INACTIVE};

    fn all_active_shifter(width: u32, height: u32, depth: u32) -> ToroidalShifter {
        ToroidalShifter::new(width, height, depth, None).unwrap()
    }

    #[test]
    fn row_rotation_direction_convention() {
        let shifter = all_active_shifter(4, 1, 1);
        let mut values = vec![10u16, 20, 30, 40];
        let mut mask = vec![MASK_ACTIVE; 4];
        shifter.shift(&mut values, &mut mask, Shift::new(1, 0)).unwrap();
        assert_eq!(values, vec![40, 10, 20, 30]);
    }

    #[test]
    fn negative_shift_rotates_left() {
        let shifter = all_active_shifter(4, 1, 1);
        let mut values = vec![10u16, 20, 30, 40];
        let mut mask = vec![MASK_ACTIVE; 4];
        shifter.shift(&mut values, &mut mask, Shift::new(-1, 0)).unwrap();
        assert_eq!(values, vec![20, 30, 40, 10]);
    }

    #[test]
    fn zero_shift_is_identity() {
        let shifter = all_active_shifter(3, 3, 1);
        let original: Vec<u16> = (0..9).collect();
        let mut values = original.clone();
        let mut mask = vec![MASK_ACTIVE; 9];
        shifter.shift(&mut values, &mut mask, Shift::ZERO).unwrap();
        assert_eq!(values, original);
    }

    #[test]
    fn shift_then_complement_restores_row() {
        for count in [3usize, 4, 7, 11] {
            for s in 0..count as i32 {
                let shifter = all_active_shifter(count as u32, 1, 1);
                let original: Vec<u16> = (100..100 + count as u16).collect();
                let mut values = original.clone();
                let mut mask = vec![MASK_ACTIVE; count];
                shifter.shift(&mut values, &mut mask, Shift::new(s, 0)).unwrap();
                shifter
                    .shift(&mut values, &mut mask, Shift::new(count as i32 - s, 0))
                    .unwrap();
                assert_eq!(values, original, "count={count} s={s}");
            }
        }
    }

    #[test]
    fn inactive_positions_are_untouched_and_skipped() {
        // Row of 5 with the middle position outside the ROI: the rotation
        // wraps across 4 active sites and position 2 keeps its value.
        let roi = ConfinementMask::new(
            5,
            1,
            1,
            vec![MASK_ACTIVE, MASK_ACTIVE, MASK_INACTIVE, MASK_ACTIVE, MASK_ACTIVE],
        )
        .unwrap();
        let shifter = ToroidalShifter::new(5, 1, 1, Some(&roi)).unwrap();
        let mut values = vec![1u16, 2, 99, 3, 4];
        let mut mask = vec![MASK_ACTIVE; 5];
        shifter.shift(&mut values, &mut mask, Shift::new(1, 0)).unwrap();
        assert_eq!(values, vec![4, 1, 99, 2, 3]);
    }

    #[test]
    fn mask_travels_with_values() {
        let shifter = all_active_shifter(4, 1, 1);
        let mut values = vec![10u16, 20, 30, 40];
        let mut mask = vec![MASK_ACTIVE, MASK_INACTIVE, MASK_ACTIVE, MASK_INACTIVE];
        shifter.shift(&mut values, &mut mask, Shift::new(1, 0)).unwrap();
        assert_eq!(values, vec![40, 10, 20, 30]);
        assert_eq!(mask, vec![MASK_INACTIVE, MASK_ACTIVE, MASK_INACTIVE, MASK_ACTIVE]);
    }

    #[test]
    fn row_then_column_composition_on_2x2() {
        // (1,1) on a fully active 2x2: rows rotate right, then columns rotate
        // down. The result is the sequential composition, not a translation.
        let shifter = all_active_shifter(2, 2, 1);
        let mut values = vec![1u16, 2, 3, 4];
        let mut mask = vec![MASK_ACTIVE; 4];
        shifter.shift(&mut values, &mut mask, Shift::new(1, 1)).unwrap();
        // Row pass: [2,1, 4,3]; column pass: [4,3, 2,1].
        assert_eq!(values, vec![4, 3, 2, 1]);
    }

    #[test]
    fn slices_shift_independently() {
        let shifter = all_active_shifter(3, 1, 2);
        let mut values = vec![1u16, 2, 3, 10, 20, 30];
        let mut mask = vec![MASK_ACTIVE; 6];
        shifter.shift(&mut values, &mut mask, Shift::new(1, 0)).unwrap();
        assert_eq!(values, vec![3, 1, 2, 30, 10, 20]);
    }

    #[test]
    fn geometry_disagreement_is_fatal() {
        let roi = ConfinementMask::new(4, 4, 1, vec![MASK_ACTIVE; 16]).unwrap();
        assert!(matches!(
            ToroidalShifter::new(4, 4, 2, Some(&roi)),
            Err(CdaError::DimensionMismatch { .. })
        ));

        let shifter = all_active_shifter(4, 4, 1);
        let mut short_values = vec![0u16; 15];
        let mut mask = vec![MASK_ACTIVE; 16];
        assert!(matches!(
            shifter.shift(&mut short_values, &mut mask, Shift::new(1, 0)),
            Err(CdaError::BufferLength { .. })
        ));
    }
}
