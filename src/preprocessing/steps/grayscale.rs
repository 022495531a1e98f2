use crate::error::ScanError;
use image::DynamicImage;

/// Convert the crop to single-channel luminance
/// Every later step works on the luma plane only
pub fn apply(image: DynamicImage) -> Result<DynamicImage, ScanError> {
    match image {
        DynamicImage::ImageLuma8(_) => Ok(image),
        other => Ok(DynamicImage::ImageLuma8(other.to_luma8())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    #[test]
    fn test_label_colours_map_by_luminance() {
        // Red sticker, green print, blue backing
        let img = RgbImage::from_fn(3, 1, |x, _| match x {
            0 => Rgb([255, 0, 0]),
            1 => Rgb([0, 255, 0]),
            _ => Rgb([0, 0, 255]),
        });

        let result = apply(DynamicImage::ImageRgb8(img)).unwrap();
        assert!(matches!(result, DynamicImage::ImageLuma8(_)));

        let gray = result.to_luma8();
        let [red, green, blue] = [0, 1, 2].map(|x| gray.get_pixel(x, 0).0[0]);
        assert!(green > red && red > blue, "{} {} {}", red, green, blue);
    }

    #[test]
    fn test_grayscale_passes_luma_through() {
        let img = GrayImage::from_pixel(4, 3, Luma([77]));
        let result = apply(DynamicImage::ImageLuma8(img)).unwrap();
        assert_eq!((result.width(), result.height()), (4, 3));
        assert!(result.to_luma8().pixels().all(|p| p.0[0] == 77));
    }
}
