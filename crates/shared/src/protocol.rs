//! Wire shapes exchanged with the transcription backend.

use chrono::Utc;
use serde::Deserialize;

use crate::{domain::TranscriptionResult, error::UploadError};

/// Multipart field carrying the video.
pub const UPLOAD_FILE_FIELD: &str = "file";

/// Body of a 2xx upload response. Every field is optional so a short body
/// degrades into `PartialResult` instead of a decode failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub transcription: Option<String>,
    #[serde(default)]
    pub resume: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub video_path: Option<String>,
    #[serde(default)]
    pub audio_path: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl UploadResponse {
    pub fn into_result(self) -> Result<TranscriptionResult, UploadError> {
        if let Some(error) = self.error {
            return Err(UploadError::ServerError {
                status: None,
                message: error,
            });
        }

        let summary = self.resume.or(self.summary);
        match (self.transcription, summary) {
            (Some(transcription), Some(summary)) => Ok(TranscriptionResult {
                message: self.message,
                transcription,
                summary,
                video_path: self.video_path,
                audio_path: self.audio_path,
                received_at: Utc::now(),
            }),
            (None, Some(_)) => Err(UploadError::PartialResult(
                "response is missing 'transcription'".into(),
            )),
            (Some(_), None) => Err(UploadError::PartialResult(
                "response is missing 'resume'".into(),
            )),
            (None, None) => Err(UploadError::PartialResult(
                "response is missing 'transcription' and 'resume'".into(),
            )),
        }
    }
}

/// Body of a non-2xx response, when it is JSON at all.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorResponse {
    pub fn into_message(self) -> Option<String> {
        self.error
            .or(self.detail)
            .or(self.message)
            .filter(|message| !message.trim().is_empty())
    }
}
