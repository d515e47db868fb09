use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidType,
    TooLarge,
    NoFileSelected,
    UploadAlreadyInProgress,
    NetworkFailure,
    ServerError,
    PartialResult,
    Timeout,
    FileUnreadable,
    Cancelled,
}

/// Everything that can go wrong between picking a file and reading the result.
///
/// None of these are fatal: the controller either stays idle or lands in
/// `Failed`, and the message is shown to the user as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("Invalid file type '{mime_type}'; only video files are accepted")]
    InvalidType { mime_type: String },
    #[error("File is too large ({size_bytes} bytes); the maximum allowed is {max_size_bytes} bytes")]
    TooLarge { size_bytes: u64, max_size_bytes: u64 },
    #[error("No file selected")]
    NoFileSelected,
    #[error("An upload is already in progress")]
    UploadAlreadyInProgress,
    #[error("Could not reach the transcription server: {0}")]
    NetworkFailure(String),
    #[error("{message}")]
    ServerError { status: Option<u16>, message: String },
    #[error("Video uploaded but the transcription results were incomplete: {0}")]
    PartialResult(String),
    #[error("The server did not respond within {0} seconds")]
    Timeout(u64),
    #[error("Could not read the selected file: {0}")]
    FileUnreadable(String),
    #[error("Upload cancelled")]
    Cancelled,
}

impl UploadError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidType { .. } => ErrorCode::InvalidType,
            Self::TooLarge { .. } => ErrorCode::TooLarge,
            Self::NoFileSelected => ErrorCode::NoFileSelected,
            Self::UploadAlreadyInProgress => ErrorCode::UploadAlreadyInProgress,
            Self::NetworkFailure(_) => ErrorCode::NetworkFailure,
            Self::ServerError { .. } => ErrorCode::ServerError,
            Self::PartialResult(_) => ErrorCode::PartialResult,
            Self::Timeout(_) => ErrorCode::Timeout,
            Self::FileUnreadable(_) => ErrorCode::FileUnreadable,
            Self::Cancelled => ErrorCode::Cancelled,
        }
    }

    /// Selection/precondition problems are warnings; the rest failed an actual upload.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidType { .. }
                | Self::TooLarge { .. }
                | Self::NoFileSelected
                | Self::UploadAlreadyInProgress
        )
    }
}
