//! reqwest-backed implementation of the transcription backend contract.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, Stream, StreamExt};
use reqwest::{
    header::ACCEPT,
    multipart::{Form, Part},
    Body, Client, Response, StatusCode,
};
use shared::{
    domain::{ConnectivityState, FilePayload, SelectedFile, TranscriptionResult},
    error::UploadError,
    protocol::{ErrorResponse, UploadResponse, UPLOAD_FILE_FIELD},
};
use tokio::{io::AsyncReadExt, sync::mpsc};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};
use url::Url;

use crate::{config::Settings, progress::TransferProgress, TranscriptionBackend};

const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;
const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HttpTranscriptionBackend {
    http: Client,
    upload_url: Url,
    health_url: Url,
}

impl HttpTranscriptionBackend {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        let http = Client::builder()
            .build()
            .context("failed to build HTTP client")?;
        Self::with_client(settings, http)
    }

    pub fn with_client(settings: &Settings, http: Client) -> anyhow::Result<Self> {
        Ok(Self {
            http,
            upload_url: settings.upload_url()?,
            health_url: settings.health_url()?,
        })
    }

    pub fn upload_url(&self) -> &Url {
        &self.upload_url
    }
}

#[async_trait]
impl TranscriptionBackend for HttpTranscriptionBackend {
    async fn upload(
        &self,
        file: SelectedFile,
        progress: mpsc::UnboundedSender<TransferProgress>,
    ) -> Result<TranscriptionResult, UploadError> {
        let total = file.size_bytes;
        let body = payload_body(&file, progress).await?;

        let part = Part::stream_with_length(body, total)
            .file_name(file.name.clone())
            .mime_str(&file.mime_type)
            .map_err(|err| UploadError::InvalidType {
                mime_type: format!("{} ({err})", file.mime_type),
            })?;
        let form = Form::new().part(UPLOAD_FILE_FIELD, part);

        info!(url = %self.upload_url, file = %file.name, bytes = total, "posting upload");
        let response = self
            .http
            .post(self.upload_url.clone())
            .header(ACCEPT, "application/json")
            .multipart(form)
            .send()
            .await
            .map_err(|err| UploadError::NetworkFailure(err.to_string()))?;

        interpret_response(response).await
    }

    async fn health(&self) -> ConnectivityState {
        let response = self
            .http
            .get(self.health_url.clone())
            .header(ACCEPT, "application/json")
            .timeout(HEALTH_PROBE_TIMEOUT)
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => ConnectivityState::Online,
            // Root not routed, but something answered.
            Ok(response) if response.status() == StatusCode::NOT_FOUND => ConnectivityState::Online,
            Ok(response) => {
                ConnectivityState::Offline(format!("server responded with {}", response.status()))
            }
            Err(err) => ConnectivityState::Offline(err.to_string()),
        }
    }
}

/// Body for the staged payload. At most `size_bytes` are sent, and a payload
/// that no longer matches its staged size is refused.
async fn payload_body(
    file: &SelectedFile,
    progress: mpsc::UnboundedSender<TransferProgress>,
) -> Result<Body, UploadError> {
    let total = file.size_bytes;
    match &file.payload {
        FilePayload::Bytes(bytes) => {
            ensure_staged_size(file, bytes.len() as u64)?;
            let bytes = bytes.clone();
            let len = bytes.len();
            let chunks = (0..len).step_by(UPLOAD_CHUNK_SIZE).map(move |start| {
                let end = (start + UPLOAD_CHUNK_SIZE).min(len);
                Ok::<_, std::io::Error>(bytes.slice(start..end))
            });
            Ok(progress_body(stream::iter(chunks), total, progress))
        }
        FilePayload::Path(path) => {
            let unreadable =
                |err: std::io::Error| UploadError::FileUnreadable(format!("{}: {err}", path.display()));
            let handle = tokio::fs::File::open(path).await.map_err(unreadable)?;
            let on_disk = handle.metadata().await.map_err(unreadable)?.len();
            ensure_staged_size(file, on_disk)?;
            let reader = ReaderStream::with_capacity(handle.take(total), UPLOAD_CHUNK_SIZE);
            Ok(progress_body(reader, total, progress))
        }
    }
}

fn ensure_staged_size(file: &SelectedFile, actual: u64) -> Result<(), UploadError> {
    if actual == file.size_bytes {
        return Ok(());
    }
    warn!(file = %file.name, staged = file.size_bytes, actual, "payload size changed after selection");
    Err(UploadError::FileUnreadable(format!(
        "{} changed size since it was selected ({} bytes staged, {actual} bytes now)",
        file.name, file.size_bytes
    )))
}

/// Reports cumulative bytes as each chunk is handed to the connection.
fn progress_body<S>(chunks: S, total: u64, progress: mpsc::UnboundedSender<TransferProgress>) -> Body
where
    S: Stream<Item = std::io::Result<Bytes>> + Send + Sync + 'static,
{
    let mut sent = 0u64;
    Body::wrap_stream(chunks.map(move |chunk| {
        if let Ok(chunk) = &chunk {
            sent += chunk.len() as u64;
            let _ = progress.send(TransferProgress::new(sent, total));
        }
        chunk
    }))
}

pub(crate) async fn interpret_response(
    response: Response,
) -> Result<TranscriptionResult, UploadError> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|err| UploadError::NetworkFailure(err.to_string()))?;
    debug!(%status, body_len = text.len(), "upload response received");

    if status.is_success() {
        let body: UploadResponse = serde_json::from_str(&text).map_err(|err| {
            warn!(%status, %err, "upload response is not the expected JSON");
            UploadError::PartialResult(format!("response body is not valid JSON: {err}"))
        })?;
        return body.into_result();
    }

    Err(UploadError::ServerError {
        status: Some(status.as_u16()),
        message: server_error_message(status, &text),
    })
}

fn server_error_message(status: StatusCode, text: &str) -> String {
    if let Ok(body) = serde_json::from_str::<ErrorResponse>(text) {
        if let Some(message) = body.into_message() {
            return message;
        }
    }

    let trimmed = text.trim();
    if !trimmed.is_empty() {
        return trimmed.to_string();
    }

    match status.canonical_reason() {
        Some(reason) => format!("server responded with {} {reason}", status.as_u16()),
        None => format!("server responded with {}", status.as_u16()),
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
