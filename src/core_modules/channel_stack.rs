// THEORY:
// The `ChannelStack` is the "dumb" data container at the bottom of the
// analysis stack, playing the same role for the colocalisation engine that a
// raw frame buffer plays for a vision pipeline. It holds one intensity
// channel of a microscopy stack (width x height x depth integer samples)
// together with that channel's own activity mask.
//
// Key architectural principles:
// 1.  **Flat Storage**: Samples and mask bytes live in flat, slice-indexed
//     vectors (z-major, then row-major), so workers can copy whole planes
//     with `copy_from_slice` and walk them linearly on the hot path.
// 2.  **Read-Only During a Sweep**: A stack is supplied once per analysis run
//     and never mutated; the permutation engine clones channel-2's value and
//     mask planes into worker-local buffers before shifting them.
// 3.  **Geometry Is Checked Once**: Constructors verify buffer lengths, and
//     `require_same_shape` verifies cross-stack agreement, so everything
//     downstream can index without bounds anxiety.

use crate::error::CdaError;

/// Mask byte marking an active (in-analysis) position.
pub const MASK_ACTIVE: u8 = 255;
/// Mask byte marking an inactive position.
pub const MASK_INACTIVE: u8 = 0;

/// One intensity channel of a microscopy stack, plus its activity mask.
#[derive(Debug, Clone)]
pub struct ChannelStack {
    /// Width of every slice, in pixels.
    pub width: u32,
    /// Height of every slice, in pixels.
    pub height: u32,
    /// Number of z-slices (1 for a plain 2D image).
    pub depth: u32,
    /// Intensity samples, z-major then row-major: `values[z][y][x]` flattened.
    pub values: Vec<u16>,
    /// Activity mask, same layout: 0 = inactive, 255 = active.
    pub mask: Vec<u8>,
}

impl ChannelStack {
    pub fn new(
        width: u32,
        height: u32,
        depth: u32,
        values: Vec<u16>,
        mask: Vec<u8>,
    ) -> Result<Self, CdaError> {
        let expected = (width as usize) * (height as usize) * (depth as usize);
        if values.len() != expected {
            return Err(CdaError::BufferLength {
                what: "channel values",
                expected,
                actual: values.len(),
            });
        }
        if mask.len() != expected {
            return Err(CdaError::BufferLength {
                what: "channel mask",
                expected,
                actual: mask.len(),
            });
        }
        Ok(Self {
            width,
            height,
            depth,
            values,
            mask,
        })
    }

    /// Convenience constructor for a channel whose mask is fully active.
    pub fn fully_active(
        width: u32,
        height: u32,
        depth: u32,
        values: Vec<u16>,
    ) -> Result<Self, CdaError> {
        let mask = vec![MASK_ACTIVE; values.len()];
        Self::new(width, height, depth, values, mask)
    }

    pub fn dimensions(&self) -> (u32, u32, u32) {
        (self.width, self.height, self.depth)
    }

    /// Number of samples per z-slice.
    pub fn slice_len(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// Flat index of `(x, y, z)`.
    pub fn index(&self, x: u32, y: u32, z: u32) -> usize {
        (z as usize) * self.slice_len() + (y as usize) * (self.width as usize) + (x as usize)
    }

    /// Sum of this channel's intensity over positions where its own mask and
    /// the confinement mask are both active. This is the Manders denominator
    /// for the channel, precomputed once per run.
    pub fn masked_intensity_sum(&self, confinement: Option<&ConfinementMask>) -> u64 {
        let mut total = 0u64;
        for (idx, (&value, &mask_byte)) in self.values.iter().zip(self.mask.iter()).enumerate() {
            if mask_byte == MASK_INACTIVE {
                continue;
            }
            if let Some(roi) = confinement {
                if !roi.is_active(idx) {
                    continue;
                }
            }
            total += value as u64;
        }
        total
    }

    /// Fails unless `other` shares this stack's geometry.
    pub fn require_same_shape(
        &self,
        other: &ChannelStack,
        what: &'static str,
    ) -> Result<(), CdaError> {
        if self.dimensions() != other.dimensions() {
            return Err(CdaError::DimensionMismatch {
                what,
                expected: self.dimensions(),
                actual: other.dimensions(),
            });
        }
        Ok(())
    }
}

/// The region-of-interest mask confining every comparison to a sub-region.
/// Read-only for the lifetime of a sweep.
#[derive(Debug, Clone)]
pub struct ConfinementMask {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    /// 0 = outside the region, 255 = inside. Same layout as `ChannelStack`.
    pub mask: Vec<u8>,
}

impl ConfinementMask {
    pub fn new(width: u32, height: u32, depth: u32, mask: Vec<u8>) -> Result<Self, CdaError> {
        let expected = (width as usize) * (height as usize) * (depth as usize);
        if mask.len() != expected {
            return Err(CdaError::BufferLength {
                what: "confinement mask",
                expected,
                actual: mask.len(),
            });
        }
        Ok(Self {
            width,
            height,
            depth,
            mask,
        })
    }

    pub fn dimensions(&self) -> (u32, u32, u32) {
        (self.width, self.height, self.depth)
    }

    pub fn is_active(&self, idx: usize) -> bool {
        self.mask[idx] != MASK_INACTIVE
    }

    /// Number of active positions, the comparison universe for
    /// percent-area-overlap figures.
    pub fn active_area(&self) -> u64 {
        self.mask.iter().filter(|&&b| b != MASK_INACTIVE).count() as u64
    }

    /// Fails unless this mask shares the channel stack's geometry.
    pub fn require_matches(&self, stack: &ChannelStack) -> Result<(), CdaError> {
        if self.dimensions() != stack.dimensions() {
            return Err(CdaError::DimensionMismatch {
                what: "confinement mask",
                expected: stack.dimensions(),
                actual: self.dimensions(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_value_buffer() {
        let err = ChannelStack::new(4, 4, 1, vec![0u16; 15], vec![MASK_ACTIVE; 16]);
        assert!(matches!(err, Err(CdaError::BufferLength { .. })));
    }

    #[test]
    fn masked_intensity_sum_respects_both_masks() {
        let values = vec![10u16, 20, 30, 40];
        let mask = vec![MASK_ACTIVE, MASK_ACTIVE, MASK_INACTIVE, MASK_ACTIVE];
        let stack = ChannelStack::new(4, 1, 1, values, mask).unwrap();

        assert_eq!(stack.masked_intensity_sum(None), 70);

        let roi = ConfinementMask::new(
            4,
            1,
            1,
            vec![MASK_ACTIVE, MASK_INACTIVE, MASK_ACTIVE, MASK_ACTIVE],
        )
        .unwrap();
        // Position 1 falls outside the ROI, position 2 is channel-inactive.
        assert_eq!(stack.masked_intensity_sum(Some(&roi)), 50);
        assert_eq!(roi.active_area(), 3);
    }

    #[test]
    fn shape_mismatch_is_reported() {
        let a = ChannelStack::fully_active(4, 4, 1, vec![0; 16]).unwrap();
        let b = ChannelStack::fully_active(4, 2, 2, vec![0; 16]).unwrap();
        assert!(matches!(
            a.require_same_shape(&b, "channel 2"),
            Err(CdaError::DimensionMismatch { .. })
        ));
    }
}
