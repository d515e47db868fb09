use std::{path::Path, sync::Arc, time::Duration};

use async_trait::async_trait;
use shared::{
    domain::{
        format_file_size, ConnectivityState, FilePayload, SelectedFile, TranscriptionResult,
        UploadState, ValidationPolicy,
    },
    error::UploadError,
};
use tokio::{
    sync::{broadcast, mpsc, oneshot, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

pub mod clipboard;
pub mod config;
pub mod export;
pub mod health;
pub mod progress;
pub mod transport;

pub use progress::{ProgressTracker, TransferProgress};
pub use transport::HttpTranscriptionBackend;

const FALLBACK_MIME_TYPE: &str = "application/octet-stream";
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[async_trait]
pub trait TranscriptionBackend: Send + Sync {
    /// Sends exactly one upload request; progress is reported on `progress`
    /// while the body is being transferred.
    async fn upload(
        &self,
        file: SelectedFile,
        progress: mpsc::UnboundedSender<TransferProgress>,
    ) -> Result<TranscriptionResult, UploadError>;

    async fn health(&self) -> ConnectivityState;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, message)
    }

    fn for_error(err: &UploadError) -> Self {
        if err.is_validation() {
            Self::warning(err.to_string())
        } else {
            Self::error(format!("Error: {err}"))
        }
    }
}

#[derive(Debug, Clone)]
pub enum FlowEvent {
    StateChanged(UploadState),
    Notice(Notice),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFileInfo {
    pub name: String,
    pub size_bytes: u64,
    pub mime_type: String,
}

impl From<&SelectedFile> for StagedFileInfo {
    fn from(file: &SelectedFile) -> Self {
        Self {
            name: file.name.clone(),
            size_bytes: file.size_bytes,
            mime_type: file.mime_type.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FlowSnapshot {
    pub state: UploadState,
    pub staged: Option<StagedFileInfo>,
    pub can_submit: bool,
}

pub struct UploadTicket {
    generation: u64,
    outcome: oneshot::Receiver<Result<TranscriptionResult, UploadError>>,
}

impl UploadTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub async fn wait(self) -> Result<TranscriptionResult, UploadError> {
        self.outcome.await.unwrap_or(Err(UploadError::Cancelled))
    }
}

struct InFlightUpload {
    generation: u64,
    task: JoinHandle<()>,
    outcome_tx: oneshot::Sender<Result<TranscriptionResult, UploadError>>,
}

struct FlowState {
    state: UploadState,
    staged: Option<SelectedFile>,
    next_generation: u64,
    in_flight: Option<InFlightUpload>,
    progress: ProgressTracker,
}

impl FlowState {
    fn is_current(&self, generation: u64) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|upload| upload.generation == generation)
    }
}

/// Owns the staged file and the upload state machine. Backend responses are
/// tagged with a generation so a reset or cancelled submission is never
/// touched by a late reply.
pub struct UploadFlowController {
    backend: Arc<dyn TranscriptionBackend>,
    policy: ValidationPolicy,
    request_timeout: Duration,
    inner: Mutex<FlowState>,
    events: broadcast::Sender<FlowEvent>,
}

impl UploadFlowController {
    pub fn new(backend: Arc<dyn TranscriptionBackend>, request_timeout: Duration) -> Arc<Self> {
        Self::new_with_policy(backend, ValidationPolicy::default(), request_timeout)
    }

    pub fn new_with_policy(
        backend: Arc<dyn TranscriptionBackend>,
        policy: ValidationPolicy,
        request_timeout: Duration,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            backend,
            policy,
            request_timeout,
            inner: Mutex::new(FlowState {
                state: UploadState::Idle,
                staged: None,
                next_generation: 1,
                in_flight: None,
                progress: ProgressTracker::default(),
            }),
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FlowEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> FlowSnapshot {
        let guard = self.inner.lock().await;
        FlowSnapshot {
            state: guard.state.clone(),
            staged: guard.staged.as_ref().map(StagedFileInfo::from),
            can_submit: guard.staged.is_some() && guard.in_flight.is_none(),
        }
    }

    pub async fn state(&self) -> UploadState {
        self.inner.lock().await.state.clone()
    }

    pub async fn select_file(&self, candidate: SelectedFile) -> Result<(), UploadError> {
        let mut guard = self.inner.lock().await;
        if guard.in_flight.is_some() {
            return Err(self.reject(UploadError::UploadAlreadyInProgress));
        }
        if let Err(err) = self.policy.check(&candidate) {
            warn!(file = %candidate.name, mime_type = %candidate.mime_type, %err, "file rejected");
            return Err(self.reject(err));
        }

        info!(file = %candidate.name, size_bytes = candidate.size_bytes, "file staged");
        self.notify(Notice::info(format!(
            "Selected {} ({})",
            candidate.name,
            format_file_size(candidate.size_bytes)
        )));
        guard.staged = Some(candidate);
        guard.progress = ProgressTracker::default();
        self.transition(&mut guard, UploadState::Idle);
        Ok(())
    }

    pub async fn select_path(&self, path: impl AsRef<Path>) -> Result<(), UploadError> {
        let path = path.as_ref();
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => {
                return Err(self.reject(UploadError::FileUnreadable(format!(
                    "{} is not a regular file",
                    path.display()
                ))))
            }
            Err(err) => {
                return Err(self.reject(UploadError::FileUnreadable(format!(
                    "{}: {err}",
                    path.display()
                ))))
            }
        };

        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("video")
            .to_string();
        let mime_type = mime_guess::from_path(path)
            .first_raw()
            .unwrap_or(FALLBACK_MIME_TYPE)
            .to_string();

        self.select_file(SelectedFile {
            name,
            size_bytes: metadata.len(),
            mime_type,
            payload: FilePayload::Path(path.to_path_buf()),
        })
        .await
    }

    pub async fn clear_selection(&self) -> Result<(), UploadError> {
        let mut guard = self.inner.lock().await;
        if guard.in_flight.is_some() {
            return Err(self.reject(UploadError::UploadAlreadyInProgress));
        }
        guard.staged = None;
        guard.progress = ProgressTracker::default();
        self.transition(&mut guard, UploadState::Idle);
        Ok(())
    }

    pub async fn submit_upload(self: &Arc<Self>) -> Result<UploadTicket, UploadError> {
        let mut guard = self.inner.lock().await;
        if guard.in_flight.is_some() {
            return Err(self.reject(UploadError::UploadAlreadyInProgress));
        }
        let Some(mut file) = guard.staged.clone() else {
            return Err(self.reject(UploadError::NoFileSelected));
        };

        let previous = guard.state.clone();
        self.transition(&mut guard, UploadState::Validating);
        let checked = match current_size(&file).await {
            Ok(size_bytes) => {
                file.size_bytes = size_bytes;
                self.policy.check(&file)
            }
            Err(err) => Err(err),
        };
        if let Err(err) = checked {
            warn!(file = %file.name, size_bytes = file.size_bytes, %err, "staged file rejected at submit");
            self.transition(&mut guard, previous);
            return Err(self.reject(err));
        }
        if let Some(staged) = guard.staged.as_mut() {
            staged.size_bytes = file.size_bytes;
        }

        let generation = guard.next_generation;
        guard.next_generation += 1;
        guard.progress = ProgressTracker::default();
        self.transition(&mut guard, UploadState::Uploading(0));

        info!(
            generation,
            file = %file.name,
            size = %format_file_size(file.size_bytes),
            "upload started"
        );

        let (outcome_tx, outcome) = oneshot::channel();
        let task = tokio::spawn(Arc::clone(self).run_upload(generation, file));
        guard.in_flight = Some(InFlightUpload {
            generation,
            task,
            outcome_tx,
        });

        Ok(UploadTicket {
            generation,
            outcome,
        })
    }

    pub async fn submit_and_wait(self: &Arc<Self>) -> Result<TranscriptionResult, UploadError> {
        self.submit_upload().await?.wait().await
    }

    pub async fn cancel(&self) -> bool {
        let mut guard = self.inner.lock().await;
        let Some(upload) = guard.in_flight.take() else {
            self.notify(Notice::info("No upload in progress"));
            return false;
        };

        upload.task.abort();
        info!(generation = upload.generation, "upload cancelled");
        guard.progress = ProgressTracker::default();
        self.transition(&mut guard, UploadState::Idle);
        self.notify(Notice::warning(UploadError::Cancelled.to_string()));
        true
    }

    pub async fn reset(&self) {
        let mut guard = self.inner.lock().await;
        if let Some(upload) = guard.in_flight.take() {
            upload.task.abort();
            info!(generation = upload.generation, "upload aborted by reset");
        }
        guard.staged = None;
        guard.progress = ProgressTracker::default();
        self.transition(&mut guard, UploadState::Idle);
    }

    async fn run_upload(self: Arc<Self>, generation: u64, file: SelectedFile) {
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let upload = self.backend.upload(file, progress_tx);
        tokio::pin!(upload);
        let deadline = tokio::time::sleep(self.request_timeout);
        tokio::pin!(deadline);

        let outcome = loop {
            tokio::select! {
                outcome = &mut upload => break outcome,
                Some(progress) = progress_rx.recv() => {
                    self.apply_progress(generation, progress).await;
                }
                _ = &mut deadline => {
                    warn!(generation, timeout_secs = self.request_timeout.as_secs(), "upload timed out");
                    break Err(UploadError::Timeout(self.request_timeout.as_secs()));
                }
            }
        };

        self.apply_outcome(generation, outcome).await;
    }

    async fn apply_progress(&self, generation: u64, progress: TransferProgress) {
        let mut guard = self.inner.lock().await;
        if !guard.is_current(generation) || !matches!(guard.state, UploadState::Uploading(_)) {
            return;
        }

        if progress.is_complete() {
            debug!(generation, bytes = progress.bytes_total, "body sent; awaiting backend");
            self.transition(&mut guard, UploadState::Processing);
        } else if let Some(percent) = guard.progress.advance(progress) {
            self.transition(&mut guard, UploadState::Uploading(percent));
        }
    }

    async fn apply_outcome(
        &self,
        generation: u64,
        outcome: Result<TranscriptionResult, UploadError>,
    ) {
        let mut guard = self.inner.lock().await;
        if !guard.is_current(generation) {
            debug!(generation, "discarding response for a superseded upload");
            return;
        }
        let Some(upload) = guard.in_flight.take() else {
            return;
        };

        match &outcome {
            Ok(result) => {
                info!(
                    generation,
                    transcription_chars = result.transcription.chars().count(),
                    summary_chars = result.summary.chars().count(),
                    "upload succeeded"
                );
                self.transition(&mut guard, UploadState::Succeeded(result.clone()));
                let message = result
                    .message
                    .clone()
                    .filter(|message| !message.trim().is_empty())
                    .unwrap_or_else(|| "Video processed successfully".to_string());
                self.notify(Notice::success(message));
            }
            Err(err) => {
                warn!(generation, code = ?err.code(), %err, "upload failed");
                self.transition(&mut guard, UploadState::Failed(err.clone()));
                self.notify(Notice::for_error(err));
            }
        }

        let _ = upload.outcome_tx.send(outcome);
    }

    fn transition(&self, guard: &mut FlowState, next: UploadState) {
        debug!(from = guard.state.label(), to = next.label(), "state transition");
        guard.state = next.clone();
        let _ = self.events.send(FlowEvent::StateChanged(next));
    }

    fn notify(&self, notice: Notice) {
        let _ = self.events.send(FlowEvent::Notice(notice));
    }

    fn reject(&self, err: UploadError) -> UploadError {
        self.notify(Notice::for_error(&err));
        err
    }
}

// Files on disk can change between selection and submit.
async fn current_size(file: &SelectedFile) -> Result<u64, UploadError> {
    match &file.payload {
        FilePayload::Bytes(bytes) => Ok(bytes.len() as u64),
        FilePayload::Path(path) => tokio::fs::metadata(path)
            .await
            .map(|metadata| metadata.len())
            .map_err(|err| UploadError::FileUnreadable(format!("{}: {err}", path.display()))),
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
