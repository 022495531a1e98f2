//! Recognizer strategies
//!
//! Implementations of the `TextRecognizer` trait. The barcode decoder is
//! always compiled in; OCR engines are conditionally compiled based on
//! feature flags.

pub mod barcode;

#[cfg(any(feature = "engine-ocrs", feature = "engine-tesseract"))]
mod models;

#[cfg(feature = "engine-ocrs")]
pub mod ocrs;

#[cfg(feature = "engine-tesseract")]
pub mod tesseract;

use crate::config::Config;
use crate::error::ScanError;
use crate::recognizer::{LayoutHint, Source, TextRecognizer};
use serde::Serialize;
use std::sync::Arc;

/// Recognizer strategies that can be requested on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RecognizerKind {
    Barcode,
    Ocrs,
    Tesseract,
}

impl RecognizerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Barcode => "barcode",
            Self::Ocrs => "ocrs",
            Self::Tesseract => "tesseract",
        }
    }
}

/// Information about an available recognizer
#[derive(Debug, Clone, Serialize)]
pub struct RecognizerInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub source: Source,
}

/// A requested recognizer that could not be brought up
#[derive(Debug, Clone, Serialize)]
pub struct UnavailableRecognizer {
    pub name: &'static str,
    pub reason: String,
}

/// Registry of recognizer strategies
///
/// Recognizers that fail to initialise are recorded, not fatal: a serial
/// can always be typed by hand, so the server comes up without them.
pub struct RecognizerRegistry {
    recognizers: Vec<Arc<dyn TextRecognizer>>,
    unavailable: Vec<UnavailableRecognizer>,
}

impl RecognizerRegistry {
    /// Bring up every recognizer listed in the configuration
    pub fn new(config: &Config) -> Self {
        let mut registry = Self::from_recognizers(Vec::new());

        for kind in &config.recognizers {
            tracing::info!("Initializing {} recognizer...", kind.as_str());
            match build(*kind, config) {
                Ok(recognizer) => registry.recognizers.push(recognizer),
                Err(e) => {
                    tracing::warn!("Recognizer {} unavailable: {}", kind.as_str(), e);
                    registry.unavailable.push(UnavailableRecognizer {
                        name: kind.as_str(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if registry.is_empty() {
            tracing::warn!("No recognizers available; serials must be entered manually");
        }

        registry
    }

    pub fn from_recognizers(recognizers: Vec<Arc<dyn TextRecognizer>>) -> Self {
        Self {
            recognizers,
            unavailable: Vec::new(),
        }
    }

    /// Recognizers of one fallback stage, in configured order
    pub fn by_source(&self, source: Source) -> Vec<Arc<dyn TextRecognizer>> {
        self.recognizers
            .iter()
            .filter(|r| r.source() == source)
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.recognizers.is_empty()
    }

    pub fn info(&self) -> Vec<RecognizerInfo> {
        self.recognizers
            .iter()
            .map(|r| RecognizerInfo {
                name: r.name(),
                description: r.description(),
                source: r.source(),
            })
            .collect()
    }

    pub fn unavailable(&self) -> &[UnavailableRecognizer] {
        &self.unavailable
    }
}

#[allow(unused_variables)]
fn build(kind: RecognizerKind, config: &Config) -> Result<Arc<dyn TextRecognizer>, ScanError> {
    match kind {
        RecognizerKind::Barcode => Ok(Arc::new(barcode::BarcodeRecognizer::new())),

        #[cfg(feature = "engine-ocrs")]
        RecognizerKind::Ocrs => Ok(Arc::new(ocrs::OcrsRecognizer::new(config)?)),
        #[cfg(not(feature = "engine-ocrs"))]
        RecognizerKind::Ocrs => Err(ScanError::RecognizerUnavailable(
            "built without the engine-ocrs feature".to_string(),
        )),

        #[cfg(feature = "engine-tesseract")]
        RecognizerKind::Tesseract => Ok(Arc::new(tesseract::TesseractRecognizer::new(config)?)),
        #[cfg(not(feature = "engine-tesseract"))]
        RecognizerKind::Tesseract => Err(ScanError::RecognizerUnavailable(
            "built without the engine-tesseract feature".to_string(),
        )),
    }
}

/// Combine recognised lines according to the layout hint
///
/// Single-line mode reads everything as one line; block mode keeps breaks.
/// Blank lines are dropped and an all-blank read is `None`.
pub fn join_lines(lines: &[String], layout: LayoutHint) -> Option<String> {
    let lines: Vec<&str> = lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect();

    if lines.is_empty() {
        return None;
    }

    let separator = match layout {
        LayoutHint::SingleLine => " ",
        LayoutHint::SingleBlock => "\n",
    };
    Some(lines.join(separator))
}
