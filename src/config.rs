use crate::cleanup::{Cleanup, StripMode};
use crate::preprocessing::EnhancementParams;
use crate::recognizer::LayoutHint;
use crate::recognizers::RecognizerKind;
use crate::submission::SubmissionLayout;
use crate::Args;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub max_file_size: usize,
    pub registry_path: PathBuf,
    pub registry_ttl: Duration,
    pub submissions_path: PathBuf,
    pub submission_layout: SubmissionLayout,
    /// Defaults for requests that do not override them
    pub enhancement: EnhancementParams,
    pub label_prefixes: Vec<String>,
    pub strip_mode: StripMode,
    pub prune_edges: bool,
    pub recognizers: Vec<RecognizerKind>,
    pub ocr_layout: LayoutHint,
    pub default_language: String,
    pub tessdata_path: Option<String>,
}

impl Config {
    pub fn cleanup(&self) -> Cleanup {
        Cleanup::new(self.label_prefixes.clone(), self.strip_mode, self.prune_edges)
    }
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            host: args.host,
            port: args.port,
            max_file_size: args.max_file_size,
            registry_path: args.registry_path,
            registry_ttl: Duration::from_secs(args.registry_ttl_secs),
            submissions_path: args.submissions_path,
            submission_layout: args.submission_layout,
            enhancement: EnhancementParams {
                scale_factor: args.scale_factor,
                contrast_factor: args.contrast,
                sharpen: args.sharpen,
                threshold: args.threshold.0,
            },
            label_prefixes: args.label_prefixes,
            strip_mode: args.strip_mode,
            prune_edges: args.prune_edges,
            recognizers: args.recognizers,
            ocr_layout: args.ocr_layout,
            default_language: args.default_language,
            tessdata_path: args.tessdata_path,
        }
    }
}

/// Threshold setting: a level in 0..=255 or `none`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdArg(pub Option<u8>);

impl std::str::FromStr for ThresholdArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("none") || s.eq_ignore_ascii_case("off") {
            return Ok(Self(None));
        }
        s.parse::<u8>()
            .map(|t| Self(Some(t)))
            .map_err(|_| format!("threshold must be 0-255 or 'none', got '{}'", s))
    }
}

/// Contrast multiplier, finite and positive
pub fn parse_contrast(s: &str) -> Result<f32, String> {
    match s.trim().parse::<f32>() {
        Ok(c) if c.is_finite() && c > 0.0 => Ok(c),
        _ => Err(format!("contrast must be a positive number, got '{}'", s)),
    }
}
