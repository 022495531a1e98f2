//! OCRS engine implementation
//!
//! Pure Rust OCR engine using the ocrs library. No system dependencies required.
//! Downloads neural network models automatically on first use.

use super::{join_lines, models};
use crate::config::Config;
use crate::error::ScanError;
use crate::preprocessing::ProcessedImage;
use crate::recognizer::{LayoutHint, Source, TextRecognizer};
use ocrs::{DecodeMethod, ImageSource, OcrEngine as OcrsOcrEngine, OcrEngineParams};
use rten::Model;

/// Default model URLs from the ocrs project
const DETECTION_MODEL_URL: &str =
    "https://ocrs-models.s3-accelerate.amazonaws.com/text-detection.rten";
const RECOGNITION_MODEL_URL: &str =
    "https://ocrs-models.s3-accelerate.amazonaws.com/text-recognition.rten";

/// OCR recognizer wrapping the ocrs library
pub struct OcrsRecognizer {
    engine: OcrsOcrEngine,
    layout: LayoutHint,
}

impl OcrsRecognizer {
    /// Create the recognizer, downloading models if needed
    pub fn new(config: &Config) -> Result<Self, ScanError> {
        tracing::info!("Initializing ocrs OCR engine...");

        let dir = models::cache_dir(None)?;
        let detection_model_path =
            models::ensure_downloaded(&dir, DETECTION_MODEL_URL, "text-detection.rten")?;
        let recognition_model_path =
            models::ensure_downloaded(&dir, RECOGNITION_MODEL_URL, "text-recognition.rten")?;

        let detection_model = Model::load_file(&detection_model_path).map_err(|e| {
            ScanError::RecognizerUnavailable(format!("Failed to load detection model: {}", e))
        })?;
        let recognition_model = Model::load_file(&recognition_model_path).map_err(|e| {
            ScanError::RecognizerUnavailable(format!("Failed to load recognition model: {}", e))
        })?;

        let engine = OcrsOcrEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            decode_method: DecodeMethod::Greedy,
            ..Default::default()
        })
        .map_err(|e| {
            ScanError::RecognizerUnavailable(format!("Failed to create OCR engine: {}", e))
        })?;

        tracing::info!(
            "ocrs engine initialized successfully (layout: {:?})",
            config.ocr_layout
        );

        Ok(Self {
            engine,
            layout: config.ocr_layout,
        })
    }

    /// Recognize every text line in the image, top to bottom
    fn read_lines(&self, image: &ProcessedImage) -> Result<Vec<String>, ScanError> {
        // ocrs wants 3-channel HWC input
        let rgb_img = image.to_dynamic().into_rgb8();
        let dimensions = rgb_img.dimensions();

        let img_source = ImageSource::from_bytes(rgb_img.as_raw(), dimensions).map_err(|e| {
            ScanError::RecognitionFailed(format!("Failed to create image source: {}", e))
        })?;

        let ocr_input = self
            .engine
            .prepare_input(img_source)
            .map_err(|e| ScanError::RecognitionFailed(format!("Failed to prepare input: {}", e)))?;

        let word_rects = self
            .engine
            .detect_words(&ocr_input)
            .map_err(|e| ScanError::RecognitionFailed(format!("Failed to detect words: {}", e)))?;

        let line_rects = group_lines(self.layout, word_rects, |words| {
            self.engine.find_text_lines(&ocr_input, words)
        });

        let line_texts = self
            .engine
            .recognize_text(&ocr_input, &line_rects)
            .map_err(|e| ScanError::RecognitionFailed(format!("Failed to recognize text: {}", e)))?;

        Ok(line_texts
            .iter()
            .filter_map(|line| line.as_ref())
            .map(|line| {
                line.words()
                    .map(|word| word.to_string())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect())
    }
}

/// Group detected words into the lines handed to recognition
///
/// `SingleLine` skips line segmentation: every word belongs to one line, so
/// a label split by a gap or a slight skew is still read as one string.
/// `SingleBlock` uses the engine's own line finder.
fn group_lines<W>(
    layout: LayoutHint,
    words: Vec<W>,
    find_lines: impl FnOnce(&[W]) -> Vec<Vec<W>>,
) -> Vec<Vec<W>> {
    match layout {
        LayoutHint::SingleLine if words.is_empty() => Vec::new(),
        LayoutHint::SingleLine => vec![words],
        LayoutHint::SingleBlock => find_lines(&words),
    }
}

impl TextRecognizer for OcrsRecognizer {
    fn name(&self) -> &'static str {
        "ocrs"
    }

    fn description(&self) -> &'static str {
        "Pure Rust OCR engine - fast, no system dependencies required"
    }

    fn source(&self) -> Source {
        Source::Ocr
    }

    fn recognize(&self, image: &ProcessedImage) -> Result<Option<String>, ScanError> {
        let lines = self.read_lines(image)?;
        tracing::debug!("ocrs read {} line(s)", lines.len());
        Ok(join_lines(&lines, self.layout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Stand-in line finder: splits words at every multiple of ten
    fn split_by_tens(words: &[u32]) -> Vec<Vec<u32>> {
        let mut lines: Vec<Vec<u32>> = Vec::new();
        for &word in words {
            match lines.last_mut() {
                Some(line) if line[0] / 10 == word / 10 => line.push(word),
                _ => lines.push(vec![word]),
            }
        }
        lines
    }

    #[test]
    fn test_single_line_skips_line_finder() {
        let lines = group_lines(LayoutHint::SingleLine, vec![1, 2, 11, 12], |_| {
            panic!("line finder must not run for a single-line hint")
        });
        assert_eq!(lines, vec![vec![1, 2, 11, 12]]);
    }

    #[test]
    fn test_single_block_uses_line_finder() {
        let lines = group_lines(LayoutHint::SingleBlock, vec![1, 2, 11, 12], split_by_tens);
        assert_eq!(lines, vec![vec![1, 2], vec![11, 12]]);
    }

    #[test]
    fn test_no_words_no_lines() {
        let lines = group_lines(LayoutHint::SingleLine, Vec::<u32>::new(), split_by_tens);
        assert!(lines.is_empty());
    }
}
