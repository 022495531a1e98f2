//! Extraction stage: barcode first, OCR as fallback
//!
//! ```text
//! Start -> TryBarcode -> Decoded
//!                     -> TryOcr -> Decoded
//!                               -> NotFound
//! ```
//!
//! A structured code wins whenever one is found. OCR output is cleaned and
//! flagged for review because nothing vouches for it.

use crate::cleanup::Cleanup;
use crate::error::ScanError;
use crate::preprocessing::EnhancedVariants;
use crate::recognizer::{Source, TextRecognizer};
use crate::recognizers::RecognizerRegistry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Terminal outcome of an extraction, never partially populated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtractionResult {
    Decoded { text: String, source: Source },
    NotFound,
}

impl ExtractionResult {
    pub fn text(&self) -> Option<&str> {
        match self {
            ExtractionResult::Decoded { text, .. } => Some(text),
            ExtractionResult::NotFound => None,
        }
    }

    pub fn source(&self) -> Option<Source> {
        match self {
            ExtractionResult::Decoded { source, .. } => Some(*source),
            ExtractionResult::NotFound => None,
        }
    }

    /// OCR text has no confidence signal and must be checked by a person
    pub fn requires_review(&self) -> bool {
        self.source() != Some(Source::Barcode)
    }
}

/// States of the fallback machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionState {
    Start,
    TryBarcode,
    TryOcr,
    Decoded,
    NotFound,
}

/// Extraction result plus how it was reached
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionOutcome {
    pub result: ExtractionResult,
    /// States visited, in order, ending in a terminal state
    pub trace: Vec<ExtractionState>,
    pub warnings: Vec<String>,
}

/// Runs the fallback chain over enhanced images
pub struct Extractor {
    barcode: Vec<Arc<dyn TextRecognizer>>,
    ocr: Vec<Arc<dyn TextRecognizer>>,
    cleanup: Cleanup,
}

impl Extractor {
    pub fn new(registry: &RecognizerRegistry, cleanup: Cleanup) -> Self {
        Self {
            barcode: registry.by_source(Source::Barcode),
            ocr: registry.by_source(Source::Ocr),
            cleanup,
        }
    }

    pub fn is_available(&self) -> bool {
        !self.barcode.is_empty() || !self.ocr.is_empty()
    }

    /// Step the state machine to a terminal state
    pub fn extract(&self, variants: &EnhancedVariants) -> Result<ExtractionOutcome, ScanError> {
        if !self.is_available() {
            return Err(ScanError::RecognizerUnavailable(
                "no barcode or OCR recognizer is available".to_string(),
            ));
        }

        let mut attempts = Attempts::default();
        let mut trace = vec![ExtractionState::Start];
        let mut state = ExtractionState::Start;
        let mut result = ExtractionResult::NotFound;

        loop {
            state = match state {
                ExtractionState::Start => ExtractionState::TryBarcode,

                ExtractionState::TryBarcode => {
                    let image = variants.for_barcode();
                    match attempts.first_hit(&self.barcode, image, |text| {
                        Some(text.trim().to_string()).filter(|t| !t.is_empty())
                    }) {
                        Some(text) => {
                            result = ExtractionResult::Decoded {
                                text,
                                source: Source::Barcode,
                            };
                            ExtractionState::Decoded
                        }
                        None => ExtractionState::TryOcr,
                    }
                }

                ExtractionState::TryOcr => {
                    let image = variants.for_ocr();
                    match attempts.first_hit(&self.ocr, image, |text| {
                        let cleaned = self.cleanup.apply(text);
                        tracing::debug!("OCR read {:?}, cleaned to {:?}", text, cleaned);
                        Some(cleaned).filter(|t| !t.is_empty())
                    }) {
                        Some(text) => {
                            result = ExtractionResult::Decoded {
                                text,
                                source: Source::Ocr,
                            };
                            ExtractionState::Decoded
                        }
                        None => ExtractionState::NotFound,
                    }
                }

                ExtractionState::Decoded | ExtractionState::NotFound => break,
            };
            trace.push(state);
        }

        if result == ExtractionResult::NotFound && attempts.all_failed() {
            return Err(ScanError::RecognizerUnavailable(format!(
                "every recognizer failed: {}",
                attempts.warnings.join("; ")
            )));
        }

        match &result {
            ExtractionResult::Decoded { text, source } => tracing::info!(
                "Extracted {} chars via {}",
                text.len(),
                source.as_str()
            ),
            ExtractionResult::NotFound => {
                tracing::warn!("No barcode or readable text found in region")
            }
        }

        Ok(ExtractionOutcome {
            result,
            trace,
            warnings: attempts.warnings,
        })
    }
}

/// Bookkeeping of recognizer runs within one extraction
#[derive(Default)]
struct Attempts {
    ran: usize,
    failed: usize,
    warnings: Vec<String>,
}

impl Attempts {
    /// Run recognizers in order and keep the first accepted text
    ///
    /// An erroring recognizer counts as having found nothing.
    fn first_hit<F>(
        &mut self,
        recognizers: &[Arc<dyn TextRecognizer>],
        image: &crate::preprocessing::ProcessedImage,
        accept: F,
    ) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        for recognizer in recognizers {
            self.ran += 1;
            match recognizer.recognize(image) {
                Ok(Some(text)) => {
                    if let Some(accepted) = accept(&text) {
                        return Some(accepted);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("Recognizer {} failed: {}", recognizer.name(), e);
                    self.failed += 1;
                    self.warnings
                        .push(format!("{} failed: {}", recognizer.name(), e));
                }
            }
        }
        None
    }

    fn all_failed(&self) -> bool {
        self.ran > 0 && self.failed == self.ran
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::RawImage;
    use crate::preprocessing::{enhance_variants, EnhancementParams, ProcessedImage};
    use crate::recognizers::barcode::BarcodeRecognizer;
    use image::{DynamicImage, GrayImage, Luma};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted recognizer that records which variant it was shown
    struct Fake {
        source: Source,
        reply: Result<Option<&'static str>, &'static str>,
        calls: AtomicUsize,
        saw_binarized: AtomicUsize,
    }

    impl Fake {
        fn new(source: Source, reply: Result<Option<&'static str>, &'static str>) -> Arc<Self> {
            Arc::new(Self {
                source,
                reply,
                calls: AtomicUsize::new(0),
                saw_binarized: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TextRecognizer for Fake {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn description(&self) -> &'static str {
            "scripted"
        }

        fn source(&self) -> Source {
            self.source
        }

        fn recognize(&self, image: &ProcessedImage) -> Result<Option<String>, ScanError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if image.is_binarized() {
                self.saw_binarized.fetch_add(1, Ordering::SeqCst);
            }
            match self.reply {
                Ok(text) => Ok(text.map(str::to_string)),
                Err(e) => Err(ScanError::RecognitionFailed(e.to_string())),
            }
        }
    }

    fn extractor(recognizers: Vec<Arc<dyn TextRecognizer>>) -> Extractor {
        Extractor::new(
            &RecognizerRegistry::from_recognizers(recognizers),
            Cleanup::default(),
        )
    }

    fn variants(threshold: Option<u8>) -> EnhancedVariants {
        let img = GrayImage::from_fn(40, 20, |x, _| Luma([(x * 6) as u8]));
        let raw = RawImage::from_image(DynamicImage::ImageLuma8(img));
        let params = EnhancementParams {
            threshold,
            ..Default::default()
        };
        enhance_variants(&raw, None, &params).unwrap()
    }

    #[test]
    fn test_barcode_wins_and_skips_ocr() {
        let barcode = Fake::new(Source::Barcode, Ok(Some("ABC12345")));
        let ocr = Fake::new(Source::Ocr, Ok(Some("S/N: WRONG")));
        let outcome = extractor(vec![barcode.clone(), ocr.clone()])
            .extract(&variants(Some(140)))
            .unwrap();

        assert_eq!(
            outcome.result,
            ExtractionResult::Decoded {
                text: "ABC12345".to_string(),
                source: Source::Barcode
            }
        );
        assert!(!outcome.result.requires_review());
        assert_eq!(
            outcome.trace,
            vec![
                ExtractionState::Start,
                ExtractionState::TryBarcode,
                ExtractionState::Decoded
            ]
        );
        assert_eq!(ocr.calls(), 0);
        assert_eq!(barcode.saw_binarized.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_ocr_fallback_cleans_caption() {
        let barcode = Fake::new(Source::Barcode, Ok(None));
        let ocr = Fake::new(Source::Ocr, Ok(Some("S/N: XJ990021")));
        let outcome = extractor(vec![barcode.clone(), ocr.clone()])
            .extract(&variants(Some(140)))
            .unwrap();

        assert_eq!(outcome.result.text(), Some("XJ990021"));
        assert_eq!(outcome.result.source(), Some(Source::Ocr));
        assert!(outcome.result.requires_review());
        assert_eq!(
            outcome.trace,
            vec![
                ExtractionState::Start,
                ExtractionState::TryBarcode,
                ExtractionState::TryOcr,
                ExtractionState::Decoded
            ]
        );
        // OCR is fed the gradient image, not the binarized one
        assert_eq!(ocr.saw_binarized.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_nothing_found_is_not_found() {
        let outcome = extractor(vec![
            Fake::new(Source::Barcode, Ok(None)),
            Fake::new(Source::Ocr, Ok(None)),
        ])
        .extract(&variants(Some(140)))
        .unwrap();

        assert_eq!(outcome.result, ExtractionResult::NotFound);
        assert!(outcome.result.requires_review());
        assert_eq!(outcome.trace.last(), Some(&ExtractionState::NotFound));
    }

    #[test]
    fn test_ocr_noise_only_is_not_found() {
        let outcome = extractor(vec![Fake::new(Source::Ocr, Ok(Some(" S/N: .. ")))])
            .extract(&variants(None))
            .unwrap();
        assert_eq!(outcome.result, ExtractionResult::NotFound);
    }

    #[test]
    fn test_failing_barcode_falls_back_with_warning() {
        let outcome = extractor(vec![
            Fake::new(Source::Barcode, Err("decoder crashed")),
            Fake::new(Source::Ocr, Ok(Some("SN:77"))),
        ])
        .extract(&variants(Some(140)))
        .unwrap();

        assert_eq!(outcome.result.text(), Some("77"));
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("decoder crashed"));
    }

    #[test]
    fn test_all_recognizers_failing_is_unavailable() {
        let result = extractor(vec![
            Fake::new(Source::Barcode, Err("gone")),
            Fake::new(Source::Ocr, Err("gone too")),
        ])
        .extract(&variants(Some(140)));
        assert!(matches!(result, Err(ScanError::RecognizerUnavailable(_))));
    }

    #[test]
    fn test_no_recognizers_is_unavailable() {
        let result = extractor(Vec::new()).extract(&variants(None));
        assert!(matches!(result, Err(ScanError::RecognizerUnavailable(_))));
    }

    #[test]
    fn test_blank_region_with_real_decoder_is_not_found() {
        let img = GrayImage::from_pixel(120, 60, Luma([200]));
        let raw = RawImage::from_image(DynamicImage::ImageLuma8(img));
        let variants = enhance_variants(&raw, None, &EnhancementParams::default()).unwrap();

        let outcome = extractor(vec![
            Arc::new(BarcodeRecognizer::new()),
            Fake::new(Source::Ocr, Ok(None)),
        ])
        .extract(&variants)
        .unwrap();
        assert_eq!(outcome.result, ExtractionResult::NotFound);
    }

    #[test]
    fn test_result_serializes_tagged() {
        let decoded = ExtractionResult::Decoded {
            text: "ABC".to_string(),
            source: Source::Barcode,
        };
        assert_eq!(
            serde_json::to_value(&decoded).unwrap(),
            serde_json::json!({"status": "decoded", "text": "ABC", "source": "barcode"})
        );
        assert_eq!(
            serde_json::to_value(ExtractionResult::NotFound).unwrap(),
            serde_json::json!({"status": "not_found"})
        );
    }
}
