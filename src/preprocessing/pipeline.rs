use crate::capture::{RawImage, Region};
use crate::error::ScanError;
use image::{DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::steps;

/// Parameters of the enhancement stage
///
/// Grayscale conversion is unconditional, so it has no switch here.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnhancementParams {
    /// Integer upscale factor, 1 = keep size
    pub scale_factor: u32,
    /// Contrast multiplier around mid-grey
    pub contrast_factor: f32,
    /// Extra Laplacian sharpening after contrast
    #[serde(default)]
    pub sharpen: bool,
    /// Binarization cut-off; `None` keeps the gradient
    pub threshold: Option<u8>,
}

impl Default for EnhancementParams {
    fn default() -> Self {
        Self {
            scale_factor: 1,
            contrast_factor: 5.0,
            sharpen: false,
            threshold: Some(150),
        }
    }
}

impl EnhancementParams {
    pub fn validate(&self) -> Result<(), ScanError> {
        if self.scale_factor == 0 {
            return Err(ScanError::InvalidRequest(
                "scale_factor must be at least 1".to_string(),
            ));
        }
        if !self.contrast_factor.is_finite() || self.contrast_factor <= 0.0 {
            return Err(ScanError::InvalidRequest(format!(
                "contrast must be a positive number, got {}",
                self.contrast_factor
            )));
        }
        Ok(())
    }

    /// Same parameters with binarization switched off
    pub fn without_threshold(&self) -> Self {
        Self {
            threshold: None,
            ..*self
        }
    }
}

/// Timing information for a single enhancement step
#[derive(Debug, Clone, Serialize)]
pub struct StepTiming {
    pub name: String,
    pub time_ms: u64,
}

/// Output of the enhancement stage: a single-channel bitmap
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    image: GrayImage,
    binarized: bool,
}

impl ProcessedImage {
    pub fn new(image: GrayImage, binarized: bool) -> Self {
        Self { image, binarized }
    }

    pub fn luma(&self) -> &GrayImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Whether the image went through thresholding (strictly 0/255)
    pub fn is_binarized(&self) -> bool {
        self.binarized
    }

    pub fn to_dynamic(&self) -> DynamicImage {
        DynamicImage::ImageLuma8(self.image.clone())
    }
}

/// Result of enhancement including timing stats
#[derive(Debug, Clone)]
pub struct EnhancementResult {
    pub image: ProcessedImage,
    pub total_time_ms: u64,
    pub steps: Vec<StepTiming>,
}

/// The two inputs the extractor wants
///
/// Barcode decoding prefers the binarized variant (sharp bar/space edges),
/// OCR prefers the grayscale one (gradient information). Without a threshold
/// both are the same image.
#[derive(Debug, Clone)]
pub struct EnhancedVariants {
    pub binarized: Option<ProcessedImage>,
    pub grayscale: ProcessedImage,
    pub steps: Vec<StepTiming>,
}

impl EnhancedVariants {
    /// Image for structured-code decoding
    pub fn for_barcode(&self) -> &ProcessedImage {
        self.binarized.as_ref().unwrap_or(&self.grayscale)
    }

    /// Image for free-text recognition
    pub fn for_ocr(&self) -> &ProcessedImage {
        &self.grayscale
    }
}

/// Run the enhancement stage over a region of a captured image
///
/// `None` as region means the whole image.
pub fn enhance(
    raw: &RawImage,
    region: Option<&Region>,
    params: &EnhancementParams,
) -> Result<EnhancementResult, ScanError> {
    params.validate()?;
    let region = region.copied().unwrap_or_else(|| raw.full_region());
    let cropped = raw.crop(&region)?;
    run(cropped, params)
}

/// Enhance once for OCR and once more with the threshold for barcodes
///
/// The gradient pass is shared: thresholding is the last step, so the
/// binarized variant is derived from the grayscale result instead of
/// re-running the whole chain.
pub fn enhance_variants(
    raw: &RawImage,
    region: Option<&Region>,
    params: &EnhancementParams,
) -> Result<EnhancedVariants, ScanError> {
    let gradient = enhance(raw, region, &params.without_threshold())?;
    let mut timings = gradient.steps;

    let binarized = match params.threshold {
        Some(threshold) => {
            let step_start = Instant::now();
            let binary = steps::threshold::binarize(gradient.image.luma(), threshold);
            timings.push(StepTiming {
                name: "threshold".to_string(),
                time_ms: step_start.elapsed().as_millis() as u64,
            });
            Some(ProcessedImage::new(binary, true))
        }
        None => None,
    };

    Ok(EnhancedVariants {
        binarized,
        grayscale: gradient.image,
        steps: timings,
    })
}

fn run(image: DynamicImage, params: &EnhancementParams) -> Result<EnhancementResult, ScanError> {
    let start = Instant::now();
    let mut timings = Vec::new();
    let (source_width, source_height) = (image.width(), image.height());

    let mut img = run_step("grayscale", image, &mut timings, steps::grayscale::apply)?;

    if params.scale_factor > 1 {
        img = run_step("resize", img, &mut timings, |i| {
            steps::resize::apply(i, params.scale_factor)
        })?;
    }

    img = run_step("contrast", img, &mut timings, |i| {
        steps::contrast::apply(i, params.contrast_factor)
    })?;

    if params.sharpen {
        img = run_step("sharpen", img, &mut timings, steps::sharpen::apply)?;
    }

    if let Some(threshold) = params.threshold {
        img = run_step("threshold", img, &mut timings, |i| {
            steps::threshold::apply(i, threshold)
        })?;
    }

    let total_time_ms = start.elapsed().as_millis() as u64;
    tracing::debug!(
        "Enhanced {}x{} region to {}x{} in {}ms ({} steps)",
        source_width,
        source_height,
        img.width(),
        img.height(),
        total_time_ms,
        timings.len()
    );

    Ok(EnhancementResult {
        image: ProcessedImage::new(img.into_luma8(), params.threshold.is_some()),
        total_time_ms,
        steps: timings,
    })
}

fn run_step<F>(
    name: &str,
    img: DynamicImage,
    timings: &mut Vec<StepTiming>,
    step_fn: F,
) -> Result<DynamicImage, ScanError>
where
    F: FnOnce(DynamicImage) -> Result<DynamicImage, ScanError>,
{
    let step_start = Instant::now();
    let result = step_fn(img)?;
    timings.push(StepTiming {
        name: name.to_string(),
        time_ms: step_start.elapsed().as_millis() as u64,
    });
    Ok(result)
}
