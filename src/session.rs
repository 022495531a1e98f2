//! Per-scan session value
//!
//! Carries what the installer has chosen so far (school, device, crop,
//! enhancement settings) and the latest extraction through each stage. Each
//! stage takes the session by value and hands back an updated copy.

use crate::capture::{RawImage, Region};
use crate::error::ScanError;
use crate::extraction::{ExtractionOutcome, ExtractionResult, ExtractionState, Extractor};
use crate::preprocessing::{enhance_variants, EnhancementParams, StepTiming};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSession {
    pub udise: Option<String>,
    pub device_name: Option<String>,
    pub region: Option<Region>,
    pub params: EnhancementParams,
    pub result: Option<ExtractionResult>,
}

impl ScanSession {
    pub fn new(params: EnhancementParams) -> Self {
        Self {
            udise: None,
            device_name: None,
            region: None,
            params,
            result: None,
        }
    }

    pub fn for_device(mut self, udise: Option<String>, device_name: Option<String>) -> Self {
        self.udise = udise;
        self.device_name = device_name;
        self
    }

    /// Select a new crop; any previous extraction no longer applies
    pub fn with_region(mut self, region: Option<Region>) -> Self {
        if self.region != region {
            self.result = None;
        }
        self.region = region;
        self
    }

    pub fn with_result(mut self, result: ExtractionResult) -> Self {
        self.result = Some(result);
        self
    }

    /// Value to pre-fill the editable serial field with
    pub fn prefill(&self) -> &str {
        self.result
            .as_ref()
            .and_then(|r| r.text())
            .unwrap_or_default()
    }

    /// Every value goes through human review; this flags the ones that
    /// deserve a closer look
    pub fn requires_review(&self) -> bool {
        self.result.as_ref().map_or(true, |r| r.requires_review())
    }
}

/// Report of one scan alongside the updated session
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub trace: Vec<ExtractionState>,
    pub warnings: Vec<String>,
    pub steps: Vec<StepTiming>,
}

/// Enhance the session's region of `raw` and run extraction over it
pub fn scan(
    session: ScanSession,
    raw: &RawImage,
    extractor: &Extractor,
) -> Result<(ScanSession, ScanReport), ScanError> {
    let variants = enhance_variants(raw, session.region.as_ref(), &session.params)?;
    let ExtractionOutcome {
        result,
        trace,
        mut warnings,
    } = extractor.extract(&variants)?;

    if result == ExtractionResult::NotFound {
        warnings.push(
            "No code or text found: recrop, recapture, adjust the threshold, or type the serial"
                .to_string(),
        );
    }

    let report = ScanReport {
        trace,
        warnings,
        steps: variants.steps,
    };
    Ok((session.with_result(result), report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleanup::Cleanup;
    use crate::recognizer::Source;
    use crate::recognizers::{barcode::BarcodeRecognizer, RecognizerRegistry};
    use image::{DynamicImage, GrayImage, Luma};
    use std::sync::Arc;

    fn blank_raw() -> RawImage {
        RawImage::from_image(DynamicImage::ImageLuma8(GrayImage::from_pixel(
            80,
            40,
            Luma([230]),
        )))
    }

    fn barcode_extractor() -> Extractor {
        Extractor::new(
            &RecognizerRegistry::from_recognizers(vec![Arc::new(BarcodeRecognizer::new())]),
            Cleanup::default(),
        )
    }

    #[test]
    fn test_new_session_prefills_empty() {
        let session = ScanSession::new(EnhancementParams::default());
        assert_eq!(session.prefill(), "");
        assert!(session.requires_review());
    }

    #[test]
    fn test_with_result_prefills_text() {
        let session = ScanSession::new(EnhancementParams::default()).with_result(
            ExtractionResult::Decoded {
                text: "ABC12345".to_string(),
                source: Source::Barcode,
            },
        );
        assert_eq!(session.prefill(), "ABC12345");
        assert!(!session.requires_review());
    }

    #[test]
    fn test_changing_region_clears_result() {
        let session = ScanSession::new(EnhancementParams::default())
            .with_region(Some(Region::new(0, 0, 10, 10)))
            .with_result(ExtractionResult::NotFound);

        let same = session.clone().with_region(Some(Region::new(0, 0, 10, 10)));
        assert!(same.result.is_some());

        let moved = session.with_region(Some(Region::new(1, 0, 10, 10)));
        assert!(moved.result.is_none());
    }

    #[test]
    fn test_scan_blank_region_warns_not_found() {
        let session = ScanSession::new(EnhancementParams::default())
            .for_device(Some("12345".to_string()), Some("Smartboard-1".to_string()));

        let (session, report) = scan(session, &blank_raw(), &barcode_extractor()).unwrap();
        assert_eq!(session.result, Some(ExtractionResult::NotFound));
        assert_eq!(session.udise.as_deref(), Some("12345"));
        assert_eq!(report.warnings.len(), 1);
        assert!(!report.steps.is_empty());
    }

    #[test]
    fn test_scan_rejects_invalid_region() {
        let session = ScanSession::new(EnhancementParams::default())
            .with_region(Some(Region::new(70, 0, 20, 10)));
        let result = scan(session, &blank_raw(), &barcode_extractor());
        assert!(matches!(result, Err(ScanError::InvalidRegion(_))));
    }
}
