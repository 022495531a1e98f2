use crate::error::ScanError;
use image::{imageops::FilterType, DynamicImage};

/// Largest upscaled image accepted, in pixels
pub const MAX_UPSCALED_PIXELS: u64 = 40_000_000;

/// Upscale by an integer factor with Lanczos resampling
///
/// Small crops of serial labels read badly at native resolution, so the
/// crop is enlarged before decoding. Nearest-neighbour is never used: it
/// keeps the jagged edges that confuse both bar detection and OCR.
/// Output is exactly `(width * factor, height * factor)` and never larger
/// than [`MAX_UPSCALED_PIXELS`].
pub fn apply(image: DynamicImage, factor: u32) -> Result<DynamicImage, ScanError> {
    if factor <= 1 {
        return Ok(image);
    }

    let too_large = || {
        ScanError::InvalidRequest(format!(
            "scale factor {} is too large for a {}x{} region (max {} pixels)",
            factor,
            image.width(),
            image.height(),
            MAX_UPSCALED_PIXELS
        ))
    };

    let (new_width, new_height) = match (
        image.width().checked_mul(factor),
        image.height().checked_mul(factor),
    ) {
        (Some(w), Some(h)) => (w, h),
        _ => return Err(too_large()),
    };
    if u64::from(new_width) * u64::from(new_height) > MAX_UPSCALED_PIXELS {
        return Err(too_large());
    }

    Ok(image.resize_exact(new_width, new_height, FilterType::Lanczos3))
}
