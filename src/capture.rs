//! Captured images and crop regions
//!
//! A `RawImage` is the photo exactly as uploaded; a `Region` is the rectangle
//! the installer cropped out of it. Regions are validated against the image
//! before any enhancement runs.

use crate::error::ScanError;
use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};

/// Upload formats accepted from file pickers and camera frames
const ACCEPTED_FORMATS: [ImageFormat; 2] = [ImageFormat::Jpeg, ImageFormat::Png];

/// An immutable bitmap as captured
#[derive(Debug, Clone)]
pub struct RawImage {
    image: DynamicImage,
    format: ImageFormat,
}

impl RawImage {
    /// Decode an uploaded JPEG or PNG
    ///
    /// The format is sniffed from the bytes, not taken from the client's
    /// declared content type.
    pub fn decode(bytes: &[u8]) -> Result<Self, ScanError> {
        let format = image::guess_format(bytes)
            .map_err(|e| ScanError::UnsupportedFormat(format!("Unrecognised image data: {}", e)))?;

        if !ACCEPTED_FORMATS.contains(&format) {
            return Err(ScanError::UnsupportedFormat(format!(
                "{:?} (only JPEG and PNG are accepted)",
                format
            )));
        }

        let image = image::load_from_memory_with_format(bytes, format)
            .map_err(|e| ScanError::InvalidRequest(format!("Failed to decode image: {}", e)))?;

        tracing::debug!(
            "Decoded {:?} capture: {}x{}",
            format,
            image.width(),
            image.height()
        );

        Ok(Self { image, format })
    }

    pub fn from_image(image: DynamicImage) -> Self {
        Self {
            image,
            format: ImageFormat::Png,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    /// The region covering the whole image
    pub fn full_region(&self) -> Region {
        Region {
            x: 0,
            y: 0,
            width: self.width(),
            height: self.height(),
        }
    }

    /// Copy out a validated sub-region
    pub fn crop(&self, region: &Region) -> Result<DynamicImage, ScanError> {
        region.validate(self.width(), self.height())?;

        if *region == self.full_region() {
            return Ok(self.image.clone());
        }

        Ok(self
            .image
            .crop_imm(region.x, region.y, region.width, region.height))
    }
}

/// Rectangle within a captured image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Check the region has area and lies inside an image of the given size
    pub fn validate(&self, image_width: u32, image_height: u32) -> Result<(), ScanError> {
        if self.width == 0 || self.height == 0 {
            return Err(ScanError::InvalidRegion(format!(
                "region {}x{} has zero area",
                self.width, self.height
            )));
        }

        let right = self.x.checked_add(self.width);
        let bottom = self.y.checked_add(self.height);
        match (right, bottom) {
            (Some(r), Some(b)) if r <= image_width && b <= image_height => Ok(()),
            _ => Err(ScanError::InvalidRegion(format!(
                "region ({}, {}, {}x{}) exceeds image bounds {}x{}",
                self.x, self.y, self.width, self.height, image_width, image_height
            ))),
        }
    }
}
