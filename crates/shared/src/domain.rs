use std::path::PathBuf;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::UploadError;

/// Rules every candidate file has to satisfy before it can be staged or sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationPolicy {
    pub allowed_mime_prefix: &'static str,
    pub max_size_bytes: u64,
}

pub const VALIDATION_POLICY: ValidationPolicy = ValidationPolicy {
    allowed_mime_prefix: "video/",
    max_size_bytes: 100 * 1024 * 1024,
};

impl Default for ValidationPolicy {
    fn default() -> Self {
        VALIDATION_POLICY
    }
}

impl ValidationPolicy {
    /// Type is checked before size, so a large non-video file reports `InvalidType`.
    pub fn check(&self, file: &SelectedFile) -> Result<(), UploadError> {
        if !file.mime_type.starts_with(self.allowed_mime_prefix) {
            return Err(UploadError::InvalidType {
                mime_type: file.mime_type.clone(),
            });
        }
        if file.size_bytes > self.max_size_bytes {
            return Err(UploadError::TooLarge {
                size_bytes: file.size_bytes,
                max_size_bytes: self.max_size_bytes,
            });
        }
        Ok(())
    }
}

/// Where the bytes of a staged file come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilePayload {
    Path(PathBuf),
    Bytes(Bytes),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub name: String,
    pub size_bytes: u64,
    pub mime_type: String,
    pub payload: FilePayload,
}

impl SelectedFile {
    pub fn from_bytes(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        let bytes = bytes.into();
        Self {
            name: name.into(),
            size_bytes: bytes.len() as u64,
            mime_type: mime_type.into(),
            payload: FilePayload::Bytes(bytes),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub message: Option<String>,
    pub transcription: String,
    pub summary: String,
    pub video_path: Option<String>,
    pub audio_path: Option<String>,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UploadState {
    Idle,
    Validating,
    Uploading(u8),
    Processing,
    Succeeded(TranscriptionResult),
    Failed(UploadError),
}

impl UploadState {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Uploading(_) | Self::Processing)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Uploading(_) => "uploading",
            Self::Processing => "processing",
            Self::Succeeded(_) => "succeeded",
            Self::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ConnectivityState {
    Checking,
    Online,
    Offline(String),
}

/// Human-readable size with two decimals, e.g. `1.5 MB`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = format!("{value:.2}");
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", UNITS[unit])
}
