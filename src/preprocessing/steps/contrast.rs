use crate::error::ScanError;
use image::{DynamicImage, GrayImage, Luma};

/// Mid-grey pivot the contrast multiplier is applied around
const PIVOT: f32 = 128.0;

/// Stretch luminance away from mid-grey
///
/// `out = clamp((in - 128) * factor + 128, 0, 255)`. Printed labels photographed
/// under site lighting are usually washed out; a strong factor (5.0 by
/// default) pushes ink towards black and paper towards white.
pub fn apply(image: DynamicImage, factor: f32) -> Result<DynamicImage, ScanError> {
    let gray = image.into_luma8();
    let lut = lookup_table(factor);

    let adjusted = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        Luma([lut[gray.get_pixel(x, y).0[0] as usize]])
    });

    Ok(DynamicImage::ImageLuma8(adjusted))
}

fn lookup_table(factor: f32) -> [u8; 256] {
    let mut lut = [0u8; 256];
    for (value, slot) in lut.iter_mut().enumerate() {
        let stretched = (value as f32 - PIVOT) * factor + PIVOT;
        *slot = stretched.round().clamp(0.0, 255.0) as u8;
    }
    lut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contrast_formula() {
        let img = GrayImage::from_fn(4, 1, |x, _| Luma([[100u8, 128, 140, 200][x as usize]]));
        let result = apply(DynamicImage::ImageLuma8(img), 2.0).unwrap().to_luma8();

        assert_eq!(result.get_pixel(0, 0).0[0], 72); // (100-128)*2+128
        assert_eq!(result.get_pixel(1, 0).0[0], 128); // pivot is fixed
        assert_eq!(result.get_pixel(2, 0).0[0], 152);
        assert_eq!(result.get_pixel(3, 0).0[0], 255); // clamped
    }

    #[test]
    fn test_contrast_factor_one_is_identity() {
        let img = GrayImage::from_fn(16, 16, |x, y| Luma([(x * 16 + y) as u8]));
        let result = apply(DynamicImage::ImageLuma8(img.clone()), 1.0).unwrap();
        assert_eq!(result.to_luma8(), img);
    }

    #[test]
    fn test_contrast_below_one_flattens() {
        let img = GrayImage::from_fn(2, 1, |x, _| if x == 0 { Luma([0]) } else { Luma([255]) });
        let result = apply(DynamicImage::ImageLuma8(img), 0.5).unwrap().to_luma8();
        assert_eq!(result.get_pixel(0, 0).0[0], 64);
        assert_eq!(result.get_pixel(1, 0).0[0], 192);
    }
}
