use crate::error::ScanError;
use image::{DynamicImage, GrayImage, Luma};

/// Binarize with a fixed global threshold
///
/// Pixels darker than `threshold` become 0, everything else 255. This is
/// destructive: no gradient survives, so OCR should be fed an enhancement
/// run without a threshold instead.
pub fn apply(image: DynamicImage, threshold: u8) -> Result<DynamicImage, ScanError> {
    let gray = image.into_luma8();
    Ok(DynamicImage::ImageLuma8(binarize(&gray, threshold)))
}

pub fn binarize(img: &GrayImage, threshold: u8) -> GrayImage {
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        if img.get_pixel(x, y).0[0] < threshold {
            Luma([0u8])
        } else {
            Luma([255u8])
        }
    })
}

/// True when every pixel is pure black or pure white
#[cfg(test)]
pub fn is_bi_level(img: &GrayImage) -> bool {
    img.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255)
}
