use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Invalid region: {0}")]
    InvalidRegion(String),

    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Image too large: {size} bytes (max: {max} bytes)")]
    ImageTooLarge { size: usize, max: usize },

    #[error("Missing file in request")]
    MissingFile,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Recognizer unavailable: {0}")]
    RecognizerUnavailable(String),

    #[error("Recognition failed: {0}")]
    RecognitionFailed(String),

    #[error("Verification failed: {0}")]
    Verification(String),

    #[error("Unknown school: {0}")]
    UnknownSchool(String),

    #[error("Device '{device}' is not an active device of school {udise}")]
    UnknownDevice { udise: String, device: String },

    #[error("A serial for device '{device}' at school {udise} has already been submitted")]
    DuplicateSubmission { udise: String, device: String },

    #[error("Reference table unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScanError {
    /// Stable machine-readable code for the error
    pub fn code(&self) -> &'static str {
        match self {
            ScanError::InvalidRegion(_) => "INVALID_REGION",
            ScanError::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            ScanError::ImageTooLarge { .. } => "IMAGE_TOO_LARGE",
            ScanError::MissingFile => "MISSING_FILE",
            ScanError::InvalidRequest(_) => "INVALID_REQUEST",
            ScanError::RecognizerUnavailable(_) => "RECOGNIZER_UNAVAILABLE",
            ScanError::RecognitionFailed(_) => "RECOGNITION_FAILED",
            ScanError::Verification(_) => "VERIFICATION_FAILED",
            ScanError::UnknownSchool(_) => "UNKNOWN_SCHOOL",
            ScanError::UnknownDevice { .. } => "UNKNOWN_DEVICE",
            ScanError::DuplicateSubmission { .. } => "DUPLICATE_SUBMISSION",
            ScanError::RegistryUnavailable(_) => "REGISTRY_UNAVAILABLE",
            ScanError::Storage(_) => "STORAGE_ERROR",
            ScanError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ScanError::InvalidRegion(_)
            | ScanError::MissingFile
            | ScanError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ScanError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ScanError::ImageTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ScanError::RecognizerUnavailable(_) | ScanError::RegistryUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ScanError::Verification(_) | ScanError::UnknownDevice { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ScanError::UnknownSchool(_) => StatusCode::NOT_FOUND,
            ScanError::DuplicateSubmission { .. } => StatusCode::CONFLICT,
            ScanError::RecognitionFailed(_) | ScanError::Storage(_) | ScanError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ScanError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", self);
        }

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        });

        (status, body).into_response()
    }
}
