use crate::error::ScanError;
use image::DynamicImage;
use imageproc::filter::filter3x3;

/// 4-neighbour Laplacian added back onto the source pixel
const LAPLACIAN_SHARPEN: [f32; 9] = [0.0, -1.0, 0.0, -1.0, 5.0, -1.0, 0.0, -1.0, 0.0];

/// Restore bar edges and glyph strokes softened by the upscale
pub fn apply(image: DynamicImage) -> Result<DynamicImage, ScanError> {
    let luma = image.into_luma8();
    Ok(DynamicImage::ImageLuma8(filter3x3(&luma, &LAPLACIAN_SHARPEN)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    /// Vertical bars four pixels wide, alternating dark and light grey
    fn soft_bars() -> GrayImage {
        GrayImage::from_fn(32, 8, |x, _| {
            if (x / 4) % 2 == 0 {
                Luma([70])
            } else {
                Luma([180])
            }
        })
    }

    #[test]
    fn test_bar_edges_gain_contrast() {
        let sharpened = apply(DynamicImage::ImageLuma8(soft_bars()))
            .unwrap()
            .to_luma8();

        // Across the first bar/space boundary (x=3 | x=4)
        let dark = sharpened.get_pixel(3, 4).0[0] as i32;
        let light = sharpened.get_pixel(4, 4).0[0] as i32;
        assert!(light - dark > 180 - 70, "edge not enhanced: {} vs {}", dark, light);
    }

    #[test]
    fn test_flat_regions_unchanged() {
        let img = GrayImage::from_pixel(8, 8, Luma([90]));
        let result = apply(DynamicImage::ImageLuma8(img)).unwrap().to_luma8();
        assert_eq!(result.get_pixel(4, 4).0[0], 90);
    }

    #[test]
    fn test_output_is_luma() {
        let rgb = DynamicImage::ImageRgb8(image::RgbImage::new(5, 5));
        assert!(matches!(apply(rgb).unwrap(), DynamicImage::ImageLuma8(_)));
    }
}
