//! Error types and handling
//!
//! Common error types used across the crate.

use crate::config::ConfigError;
use crate::media::MediaError;
use crate::recorder::RecordingError;
use crate::render::RenderError;
use crate::session::SessionError;
use crate::store::StoreError;
use crate::voice::VoiceError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Crate-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Voice relay error: {0}")]
    Voice(#[from] VoiceError),

    #[error("Recording error: {0}")]
    Recording(#[from] RecordingError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),
}

impl AppError {
    /// Whether this error came from the user denying a capture permission
    pub fn is_permission_denied(&self) -> bool {
        matches!(
            self,
            AppError::Media(MediaError::PermissionDenied(_))
                | AppError::Recording(RecordingError::Media(MediaError::PermissionDenied(_)))
                | AppError::Voice(VoiceError::Media(MediaError::PermissionDenied(_)))
        )
    }
}

/// Error response for a UI layer
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        let code = if error.is_permission_denied() {
            "PERMISSION_DENIED"
        } else {
            match &error {
                AppError::Io(_) => "IO_ERROR",
                AppError::Serialization(_) => "SERIALIZATION_ERROR",
                AppError::Config(_) => "CONFIG_ERROR",
                AppError::Store(_) => "STORE_ERROR",
                AppError::Session(SessionError::NotFound(_)) => "NOT_FOUND",
                AppError::Session(SessionError::EmptyComment) => "INVALID_INPUT",
                AppError::Session(_) => "SESSION_ERROR",
                AppError::Voice(_) => "VOICE_ERROR",
                AppError::Recording(_) => "RECORDING_ERROR",
                AppError::Media(_) => "MEDIA_ERROR",
                AppError::Render(_) => "RENDER_ERROR",
            }
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
