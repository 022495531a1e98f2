use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod capture;
mod cleanup;
mod config;
mod error;
mod extraction;
mod preprocessing;
mod recognizer;
mod recognizers;
mod registry;
mod server;
mod session;
mod submission;

use cleanup::StripMode;
use config::ThresholdArg;
use recognizer::LayoutHint;
use recognizers::RecognizerKind;
use submission::SubmissionLayout;

#[derive(Parser, Debug)]
#[command(name = "serial-scan-server")]
#[command(about = "Serial-number capture server: barcode decode with OCR fallback")]
#[command(version)]
pub struct Args {
    /// Host address to bind to
    #[arg(long, env = "SCAN_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "SCAN_PORT", default_value = "9393")]
    pub port: u16,

    /// Maximum upload size in bytes (default: 20MB)
    #[arg(long, env = "SCAN_MAX_FILE_SIZE", default_value = "20971520")]
    pub max_file_size: usize,

    /// School register CSV (UDISE, School, District, Block, Device Name, Status)
    #[arg(long, env = "SCAN_REGISTRY_PATH", default_value = "data/school_master.csv")]
    pub registry_path: PathBuf,

    /// Seconds before the school register is reloaded
    #[arg(long, env = "SCAN_REGISTRY_TTL_SECS", default_value = "3600")]
    pub registry_ttl_secs: u64,

    /// Submission log CSV, created if missing
    #[arg(long, env = "SCAN_SUBMISSIONS_PATH", default_value = "data/device_serials.csv")]
    pub submissions_path: PathBuf,

    /// Column layout of the submission log
    #[arg(long, env = "SCAN_SUBMISSION_LAYOUT", value_enum, default_value = "basic")]
    pub submission_layout: SubmissionLayout,

    /// Default contrast multiplier
    #[arg(long, env = "SCAN_CONTRAST", default_value = "5.0", value_parser = config::parse_contrast)]
    pub contrast: f32,

    /// Default binarization threshold (0-255, or "none")
    #[arg(long, env = "SCAN_THRESHOLD", default_value = "150")]
    pub threshold: ThresholdArg,

    /// Default integer upscale factor
    #[arg(long, env = "SCAN_SCALE_FACTOR", default_value = "1",
          value_parser = clap::value_parser!(u32).range(1..))]
    pub scale_factor: u32,

    /// Sharpen after the contrast step by default
    #[arg(long, env = "SCAN_SHARPEN")]
    pub sharpen: bool,

    /// Label captions stripped from OCR output
    #[arg(long, env = "SCAN_LABEL_PREFIXES", value_delimiter = ',',
          default_values = ["S/N:", "SN:", "Serial"])]
    pub label_prefixes: Vec<String>,

    /// Strip captions anywhere in the text or only as a leading prefix
    #[arg(long, env = "SCAN_STRIP_MODE", value_enum, default_value = "substring")]
    pub strip_mode: StripMode,

    /// Strip non-alphanumeric characters at both ends of OCR output
    #[arg(long, env = "SCAN_PRUNE_EDGES", default_value_t = true, action = clap::ArgAction::Set)]
    pub prune_edges: bool,

    /// Recognizer strategies to bring up
    #[arg(long, env = "SCAN_RECOGNIZERS", value_enum, value_delimiter = ',',
          default_values = ["barcode", "ocrs"])]
    pub recognizers: Vec<RecognizerKind>,

    /// Layout hint for OCR engines
    #[arg(long, env = "SCAN_OCR_LAYOUT", value_enum, default_value = "single-line")]
    pub ocr_layout: LayoutHint,

    /// Language for OCR (e.g., "eng", "deu", "fra")
    #[arg(long, env = "SCAN_DEFAULT_LANGUAGE", default_value = "eng")]
    pub default_language: String,

    /// Path to tessdata directory (downloaded to the cache if not set)
    #[arg(long, env = "TESSDATA_PREFIX")]
    pub tessdata_path: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::from(args);

    tracing::info!("Starting serial-scan-server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Binding to {}:{}", config.host, config.port);

    server::run(config).await
}
