// Bridges between `image` crate buffers and the engine's channel planes.
// The acquisition/thresholding layers live outside this crate; these helpers
// exist so callers holding ordinary grayscale images (and tests building
// synthetic ones) can feed the pipeline, and so masks can be dumped as PNGs
// for visual inspection.

pub mod image_helper {
    use crate::core_modules::channel_stack::{
        ChannelStack, ConfinementMask, MASK_ACTIVE, MASK_INACTIVE,
    };
    use crate::error::CdaError;
    use image::{GrayImage, ImageEncoder};

    /// Builds a single-slice, fully-active channel from an 8-bit grayscale
    /// image, widening samples to the engine's 16-bit domain.
    pub fn channel_from_luma(img: &GrayImage) -> Result<ChannelStack, CdaError> {
        let values: Vec<u16> = img.as_raw().iter().map(|&v| v as u16).collect();
        ChannelStack::fully_active(img.width(), img.height(), 1, values)
    }

    /// Builds a single-slice channel whose mask marks the nonzero pixels of
    /// `mask_img` active. Channel and mask images must agree in size.
    pub fn channel_from_luma_with_mask(
        img: &GrayImage,
        mask_img: &GrayImage,
    ) -> Result<ChannelStack, CdaError> {
        if img.dimensions() != mask_img.dimensions() {
            return Err(CdaError::DimensionMismatch {
                what: "channel mask image",
                expected: (img.width(), img.height(), 1),
                actual: (mask_img.width(), mask_img.height(), 1),
            });
        }
        let values: Vec<u16> = img.as_raw().iter().map(|&v| v as u16).collect();
        let mask: Vec<u8> = mask_img
            .as_raw()
            .iter()
            .map(|&v| if v == 0 { MASK_INACTIVE } else { MASK_ACTIVE })
            .collect();
        ChannelStack::new(img.width(), img.height(), 1, values, mask)
    }

    /// Builds a single-slice confinement mask from the nonzero pixels of a
    /// grayscale image.
    pub fn confinement_from_luma(img: &GrayImage) -> Result<ConfinementMask, CdaError> {
        let mask: Vec<u8> = img
            .as_raw()
            .iter()
            .map(|&v| if v == 0 { MASK_INACTIVE } else { MASK_ACTIVE })
            .collect();
        ConfinementMask::new(img.width(), img.height(), 1, mask)
    }

    /// Saves one z-slice of a confinement mask as an 8-bit grayscale PNG.
    pub fn save_mask_slice(
        name: &str,
        mask: &ConfinementMask,
        z: u32,
    ) -> Result<(), image::error::ImageError> {
        let slice_len = (mask.width as usize) * (mask.height as usize);
        let start = (z as usize) * slice_len;
        let buffer = &mask.mask[start..start + slice_len];

        let output = std::fs::File::create(name)?;
        let encoder = image::codecs::png::PngEncoder::new(output);
        encoder.write_image(buffer, mask.width, mask.height, image::ExtendedColorType::L8)?;

        Ok(())
    }
}
