use crate::capture::{RawImage, Region};
use crate::cleanup::StripMode;
use crate::config::{parse_contrast, Config, ThresholdArg};
use crate::error::ScanError;
use crate::extraction::{ExtractionState, Extractor};
use crate::preprocessing::{enhance, EnhancementParams, StepTiming};
use crate::recognizers::{RecognizerInfo, RecognizerRegistry, UnavailableRecognizer};
use crate::registry::{CsvRegistrySource, RegistryCache, SchoolInfo};
use crate::session::{scan, ScanSession};
use crate::submission::{
    CsvSubmissionStore, SubmissionDraft, SubmissionLayout, SubmissionRecord, SubmissionStore,
};
use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;

/// Room for multipart boundaries and the small form fields next to the file
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RegistryCache>,
    pub store: Arc<dyn SubmissionStore>,
    pub recognizers: Arc<RecognizerRegistry>,
    pub extractor: Arc<Extractor>,
    pub config: Arc<Config>,
}

/// Extraction response: the updated session plus how it got there
#[derive(Serialize)]
pub struct ExtractResponse {
    pub session: ScanSession,
    /// Value for the editable serial field
    pub prefill: String,
    pub requires_review: bool,
    pub trace: Vec<ExtractionState>,
    pub steps: Vec<StepTiming>,
    pub processing_time_ms: u64,
    pub warnings: Vec<String>,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Server info response
#[derive(Serialize)]
pub struct InfoResponse {
    pub version: String,
    pub recognizers: Vec<RecognizerInfo>,
    pub unavailable_recognizers: Vec<UnavailableRecognizer>,
    pub default_params: EnhancementParams,
    pub label_prefixes: Vec<String>,
    pub strip_mode: StripMode,
    pub submission_layout: SubmissionLayout,
    pub submission_columns: Vec<String>,
    pub max_file_size_bytes: usize,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Serialize)]
pub struct SchoolsResponse {
    pub schools: Vec<String>,
}

#[derive(Serialize)]
pub struct DevicesResponse {
    pub school: SchoolInfo,
    pub devices: Vec<String>,
}

/// Run the HTTP server
pub async fn run(config: Config) -> anyhow::Result<()> {
    let registry = RegistryCache::new(
        Arc::new(CsvRegistrySource::new(&config.registry_path)),
        config.registry_ttl,
    );
    // The register is required: refuse to start without it
    registry
        .get()
        .with_context(|| format!("loading school register {:?}", config.registry_path))?;

    let store = CsvSubmissionStore::open(&config.submissions_path, config.submission_layout)
        .with_context(|| format!("opening submission log {:?}", config.submissions_path))?;

    let recognizers = RecognizerRegistry::new(&config);
    let extractor = Extractor::new(&recognizers, config.cleanup());

    let addr = format!("{}:{}", config.host, config.port);
    let max_file_size = config.max_file_size;

    let state = AppState {
        registry: Arc::new(registry),
        store: Arc::new(store),
        recognizers: Arc::new(recognizers),
        extractor: Arc::new(extractor),
        config: Arc::new(config),
    };

    let app = router(state)
        .layer(DefaultBodyLimit::max(
            max_file_size.saturating_add(MULTIPART_OVERHEAD),
        ))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/info", get(handle_info))
        .route("/schools", get(handle_schools))
        .route("/schools/:udise/devices", get(handle_devices))
        .route("/preview", post(handle_preview))
        .route("/extract", post(handle_extract))
        .route("/submissions", post(handle_submit))
        .with_state(state)
}

/// Upload plus the crop and enhancement overrides sent with it
#[derive(Debug, Default)]
struct ScanForm {
    file: Option<Bytes>,
    x: Option<u32>,
    y: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    threshold: Option<Option<u8>>,
    scale_factor: Option<u32>,
    contrast: Option<f32>,
    sharpen: Option<bool>,
    udise: Option<String>,
    device_name: Option<String>,
}

impl ScanForm {
    async fn parse(
        mut multipart: Multipart,
        headers: &HeaderMap,
        max_file_size: usize,
    ) -> Result<Self, ScanError> {
        let mut form = Self::default();
        let multipart_error = |e: MultipartError, context: &str| {
            if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                // The body limit only trips past max_file_size plus overhead
                let size = headers
                    .get(header::CONTENT_LENGTH)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(max_file_size.saturating_add(MULTIPART_OVERHEAD + 1));
                ScanError::ImageTooLarge {
                    size,
                    max: max_file_size,
                }
            } else {
                ScanError::InvalidRequest(format!("{}: {}", context, e))
            }
        };

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| multipart_error(e, "Failed to parse multipart"))?
        {
            let name = field.name().unwrap_or_default().to_string();

            if name == "file" {
                form.file = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| multipart_error(e, "Failed to read file data"))?,
                );
                continue;
            }

            let value = field
                .text()
                .await
                .map_err(|e| ScanError::InvalidRequest(format!("Invalid field {}: {}", name, e)))?;
            form.set(&name, &value)?;
        }

        Ok(form)
    }

    fn set(&mut self, name: &str, value: &str) -> Result<(), ScanError> {
        match name {
            "x" => self.x = Some(parse_field(name, value)?),
            "y" => self.y = Some(parse_field(name, value)?),
            "width" => self.width = Some(parse_field(name, value)?),
            "height" => self.height = Some(parse_field(name, value)?),
            "scale_factor" => self.scale_factor = Some(parse_field(name, value)?),
            "sharpen" => self.sharpen = Some(parse_field(name, value)?),
            "threshold" => {
                let ThresholdArg(threshold) = value.parse().map_err(ScanError::InvalidRequest)?;
                self.threshold = Some(threshold);
            }
            "contrast" => {
                self.contrast = Some(parse_contrast(value).map_err(ScanError::InvalidRequest)?)
            }
            "udise" => self.udise = non_empty(value),
            "device_name" => self.device_name = non_empty(value),
            _ => {
                // Ignore unknown fields
            }
        }
        Ok(())
    }

    /// All four coordinates, or none for the whole image
    fn region(&self) -> Result<Option<Region>, ScanError> {
        match (self.x, self.y, self.width, self.height) {
            (Some(x), Some(y), Some(w), Some(h)) => Ok(Some(Region::new(x, y, w, h))),
            (None, None, None, None) => Ok(None),
            _ => Err(ScanError::InvalidRegion(
                "x, y, width and height must be given together".to_string(),
            )),
        }
    }

    fn params(&self, defaults: &EnhancementParams) -> Result<EnhancementParams, ScanError> {
        let params = EnhancementParams {
            scale_factor: self.scale_factor.unwrap_or(defaults.scale_factor),
            contrast_factor: self.contrast.unwrap_or(defaults.contrast_factor),
            sharpen: self.sharpen.unwrap_or(defaults.sharpen),
            threshold: self.threshold.unwrap_or(defaults.threshold),
        };
        params.validate()?;
        Ok(params)
    }

    fn image(&mut self, max_file_size: usize) -> Result<RawImage, ScanError> {
        let data = self.file.take().ok_or(ScanError::MissingFile)?;
        if data.len() > max_file_size {
            return Err(ScanError::ImageTooLarge {
                size: data.len(),
                max: max_file_size,
            });
        }
        RawImage::decode(&data)
    }
}

fn parse_field<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ScanError> {
    value
        .trim()
        .parse()
        .map_err(|_| ScanError::InvalidRequest(format!("Invalid value for {}: '{}'", name, value)))
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Handle preview requests: the enhanced image as PNG
async fn handle_preview(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<impl IntoResponse, ScanError> {
    let mut form = ScanForm::parse(multipart, &headers, state.config.max_file_size).await?;
    let region = form.region()?;
    let params = form.params(&state.config.enhancement)?;
    let raw = form.image(state.config.max_file_size)?;

    let png = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, ScanError> {
        let enhanced = enhance(&raw, region.as_ref(), &params)?;
        let mut png = Vec::new();
        enhanced
            .image
            .to_dynamic()
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .map_err(|e| ScanError::Internal(format!("Failed to encode preview: {}", e)))?;

        tracing::debug!(
            "Preview {}x{} (binarized: {}) enhanced in {}ms",
            enhanced.image.width(),
            enhanced.image.height(),
            enhanced.image.is_binarized(),
            enhanced.total_time_ms
        );
        Ok(png)
    })
    .await
    .map_err(|e| ScanError::Internal(format!("Preview task failed: {}", e)))??;

    Ok(([(header::CONTENT_TYPE, "image/png")], png))
}

/// Handle extraction requests
async fn handle_extract(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<ExtractResponse>, ScanError> {
    let start = Instant::now();
    let mut form = ScanForm::parse(multipart, &headers, state.config.max_file_size).await?;
    let region = form.region()?;
    let params = form.params(&state.config.enhancement)?;
    let raw = form.image(state.config.max_file_size)?;
    tracing::debug!(
        "Extracting from {:?} capture {}x{}",
        raw.format(),
        raw.width(),
        raw.height()
    );

    let session = ScanSession::new(params)
        .for_device(form.udise.take(), form.device_name.take())
        .with_region(region);

    let extractor = state.extractor.clone();
    let (session, report) = tokio::task::spawn_blocking(move || scan(session, &raw, &extractor))
        .await
        .map_err(|e| ScanError::Internal(format!("Extraction task failed: {}", e)))??;

    let processing_time_ms = start.elapsed().as_millis() as u64;
    tracing::info!(
        "Extraction finished in {}ms: {:?}",
        processing_time_ms,
        report.trace.last()
    );

    Ok(Json(ExtractResponse {
        prefill: session.prefill().to_string(),
        requires_review: session.requires_review(),
        session,
        trace: report.trace,
        steps: report.steps,
        processing_time_ms,
        warnings: report.warnings,
    }))
}

/// Handle submissions of a reviewed serial
async fn handle_submit(
    State(state): State<AppState>,
    Json(draft): Json<SubmissionDraft>,
) -> Result<(StatusCode, Json<SubmissionRecord>), ScanError> {
    let verified = draft.verify()?;
    let registry = state.registry.get()?;
    let record = verified.resolve(&registry)?;

    let store = state.store.clone();
    let stored = tokio::task::spawn_blocking(move || store.submit(record))
        .await
        .map_err(|e| ScanError::Internal(format!("Submission task failed: {}", e)))??;

    Ok((StatusCode::CREATED, Json(stored)))
}

/// Handle school search requests
async fn handle_schools(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SchoolsResponse>, ScanError> {
    let registry = state.registry.get()?;
    Ok(Json(SchoolsResponse {
        schools: registry.search(&query.q),
    }))
}

/// Handle device list requests for one school
async fn handle_devices(
    State(state): State<AppState>,
    Path(udise): Path<String>,
) -> Result<Json<DevicesResponse>, ScanError> {
    let registry = state.registry.get()?;
    let school = registry
        .school(&udise)
        .ok_or_else(|| ScanError::UnknownSchool(udise.clone()))?;
    let devices = registry.active_devices(&udise);
    Ok(Json(DevicesResponse { school, devices }))
}

/// Handle health check requests
async fn handle_health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Handle info requests
async fn handle_info(State(state): State<AppState>) -> impl IntoResponse {
    let cleanup = state.config.cleanup();
    Json(InfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        recognizers: state.recognizers.info(),
        unavailable_recognizers: state.recognizers.unavailable().to_vec(),
        default_params: state.config.enhancement,
        label_prefixes: cleanup.prefixes().to_vec(),
        strip_mode: cleanup.mode(),
        submission_layout: state.config.submission_layout,
        submission_columns: state
            .config
            .submission_layout
            .header()
            .iter()
            .map(|c| c.to_string())
            .collect(),
        max_file_size_bytes: state.config.max_file_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(fields: &[(&str, &str)]) -> ScanForm {
        let mut form = ScanForm::default();
        for (name, value) in fields {
            form.set(name, value).unwrap();
        }
        form
    }

    #[test]
    fn test_region_requires_all_coordinates() {
        assert_eq!(form(&[]).region().unwrap(), None);
        assert_eq!(
            form(&[("x", "1"), ("y", "2"), ("width", "3"), ("height", "4")])
                .region()
                .unwrap(),
            Some(Region::new(1, 2, 3, 4))
        );
        assert!(matches!(
            form(&[("x", "1"), ("width", "3")]).region(),
            Err(ScanError::InvalidRegion(_))
        ));
    }

    #[test]
    fn test_params_override_defaults() {
        let defaults = EnhancementParams::default();
        assert_eq!(form(&[]).params(&defaults).unwrap(), defaults);

        let params = form(&[("threshold", "none"), ("scale_factor", "2"), ("contrast", "1.5")])
            .params(&defaults)
            .unwrap();
        assert_eq!(params.threshold, None);
        assert_eq!(params.scale_factor, 2);
        assert_eq!(params.contrast_factor, 1.5);

        assert!(form(&[("scale_factor", "0")]).params(&defaults).is_err());
    }

    #[test]
    fn test_bad_field_values_rejected() {
        let mut form = ScanForm::default();
        assert!(form.set("x", "-3").is_err());
        assert!(form.set("threshold", "300").is_err());
        assert!(form.set("contrast", "0").is_err());
        assert!(form.set("unknown", "whatever").is_ok());
    }

    #[test]
    fn test_missing_and_oversized_file() {
        assert!(matches!(
            ScanForm::default().image(100),
            Err(ScanError::MissingFile)
        ));

        let mut form = ScanForm {
            file: Some(Bytes::from(vec![0u8; 101])),
            ..Default::default()
        };
        assert!(matches!(
            form.image(100),
            Err(ScanError::ImageTooLarge { size: 101, max: 100 })
        ));
    }
}
