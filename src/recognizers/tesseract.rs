//! Tesseract engine implementation
//!
//! Tesseract-based OCR engine. Better for noisy/messy images like phone photos.
//! Uses tesseract-static crate for static linking (no system dependencies).
//! Downloads tessdata (training data) automatically on first use unless a
//! tessdata directory is configured.

use super::{join_lines, models};
use crate::config::Config;
use crate::error::ScanError;
use crate::preprocessing::ProcessedImage;
use crate::recognizer::{LayoutHint, Source, TextRecognizer};
use tesseract_static::tesseract::Tesseract;

/// Tesseract OCR recognizer
pub struct TesseractRecognizer {
    /// Path to tessdata directory
    tessdata_path: String,
    /// Language for OCR
    language: String,
    layout: LayoutHint,
}

impl TesseractRecognizer {
    pub fn new(config: &Config) -> Result<Self, ScanError> {
        let language = config.default_language.clone();

        let tessdata_path = match &config.tessdata_path {
            Some(path) => path.clone(),
            None => ensure_tessdata_available(&language)?,
        };

        // Validate that tessdata is accessible by doing a test initialization
        let test_tess = Tesseract::new(Some(&tessdata_path), Some(&language)).map_err(|e| {
            ScanError::RecognizerUnavailable(format!("Failed to initialize Tesseract: {}", e))
        })?;
        drop(test_tess);

        tracing::info!(
            "Tesseract engine initialized (tessdata: {}, language: {}, layout: {:?})",
            tessdata_path,
            language,
            config.ocr_layout
        );

        Ok(Self {
            tessdata_path,
            language,
            layout: config.ocr_layout,
        })
    }
}

/// Tesseract page segmentation mode for a layout hint
fn page_seg_mode(layout: LayoutHint) -> &'static str {
    match layout {
        LayoutHint::SingleLine => "7",
        LayoutHint::SingleBlock => "6",
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn description(&self) -> &'static str {
        "Tesseract OCR engine - better for noisy/messy images like phone photos"
    }

    fn source(&self) -> Source {
        Source::Ocr
    }

    fn recognize(&self, image: &ProcessedImage) -> Result<Option<String>, ScanError> {
        let (width, height) = (image.width(), image.height());

        // BMP is always supported by leptonica
        let mut bmp_data = Vec::new();
        image
            .to_dynamic()
            .into_rgb8()
            .write_to(&mut std::io::Cursor::new(&mut bmp_data), image::ImageFormat::Bmp)
            .map_err(|e| ScanError::RecognitionFailed(format!("Failed to convert to BMP: {}", e)))?;

        tracing::debug!(
            "Tesseract input: {}x{}, BMP size: {} bytes",
            width,
            height,
            bmp_data.len()
        );

        let mut tess = Tesseract::new(Some(&self.tessdata_path), Some(&self.language))
            .map_err(|e| {
                ScanError::RecognizerUnavailable(format!("Failed to create Tesseract: {}", e))
            })?;

        tess = tess
            .set_variable("tessedit_pageseg_mode", page_seg_mode(self.layout))
            .map_err(|e| {
                ScanError::RecognitionFailed(format!("Failed to set segmentation mode: {}", e))
            })?;

        tess = tess.set_image_from_mem(&bmp_data).map_err(|e| {
            ScanError::RecognitionFailed(format!(
                "Failed to set image ({}x{}, {} bytes): {}",
                width,
                height,
                bmp_data.len(),
                e
            ))
        })?;

        tess = tess
            .recognize()
            .map_err(|e| ScanError::RecognitionFailed(format!("Failed to recognize text: {}", e)))?;

        let text = tess
            .get_text()
            .map_err(|e| ScanError::RecognitionFailed(format!("Failed to get text: {}", e)))?;

        let lines: Vec<String> = text.lines().map(str::to_string).collect();
        Ok(join_lines(&lines, self.layout))
    }
}

/// Ensure tessdata is available, downloading if needed
fn ensure_tessdata_available(language: &str) -> Result<String, ScanError> {
    let dir = models::cache_dir(Some("tessdata"))?;
    let filename = format!("{}.traineddata", language);
    models::ensure_downloaded(&dir, &tessdata_url(language), &filename)?;

    // Tesseract expects the directory, not the file
    dir.to_str()
        .map(|s| s.to_string())
        .ok_or_else(|| ScanError::RecognizerUnavailable("Invalid tessdata path".to_string()))
}

/// Get tessdata download URL for a language
fn tessdata_url(language: &str) -> String {
    // tessdata_fast: smaller, faster downloads
    format!(
        "https://github.com/tesseract-ocr/tessdata_fast/raw/main/{}.traineddata",
        language
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_hint_maps_to_psm() {
        assert_eq!(page_seg_mode(LayoutHint::SingleLine), "7");
        assert_eq!(page_seg_mode(LayoutHint::SingleBlock), "6");
    }

    #[test]
    fn test_tessdata_url() {
        assert!(tessdata_url("eng").ends_with("/eng.traineddata"));
    }
}
