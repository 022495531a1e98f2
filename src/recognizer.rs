use crate::error::ScanError;
use crate::preprocessing::ProcessedImage;
use serde::{Deserialize, Serialize};

/// Where a decoded serial came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Structured code (1D barcode or QR), checksum protected
    Barcode,
    /// Free-text recognition, heuristic
    Ocr,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Barcode => "barcode",
            Source::Ocr => "ocr",
        }
    }
}

/// Layout hint handed to OCR engines
///
/// Serial labels are one short line; letting an engine run full-page layout
/// analysis on them quietly costs accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutHint {
    #[default]
    SingleLine,
    SingleBlock,
}

/// Trait that all recognizer strategies implement
///
/// A recognizer looks at a processed image and either reads some text or
/// reports that it found nothing (`Ok(None)`). `Err` is reserved for the
/// engine itself failing.
pub trait TextRecognizer: Send + Sync {
    /// Returns the recognizer identifier (e.g., "barcode", "ocrs")
    fn name(&self) -> &'static str;

    /// Returns a human-readable description of the recognizer
    fn description(&self) -> &'static str;

    /// Which stage of the fallback chain this recognizer belongs to
    fn source(&self) -> Source;

    /// Read text from the image, `None` when nothing was found
    fn recognize(&self, image: &ProcessedImage) -> Result<Option<String>, ScanError>;
}
