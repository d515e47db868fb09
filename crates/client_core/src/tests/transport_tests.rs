use super::*;

use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    http::StatusCode as AxumStatus,
    routing::{get, post},
    Router,
};
use shared::domain::{UploadState, ValidationPolicy};
use tokio::{net::TcpListener, sync::Mutex};

use crate::UploadFlowController;

#[derive(Debug, Clone)]
struct ReceivedPart {
    field: Option<String>,
    file_name: Option<String>,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

#[derive(Clone)]
struct UploadServerState {
    status: AxumStatus,
    body: String,
    received: Arc<Mutex<Vec<ReceivedPart>>>,
}

async fn handle_upload(
    State(state): State<UploadServerState>,
    mut multipart: Multipart,
) -> (AxumStatus, String) {
    while let Ok(Some(field)) = multipart.next_field().await {
        let field_name = field.name().map(str::to_string);
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
        state.received.lock().await.push(ReceivedPart {
            field: field_name,
            file_name,
            content_type,
            bytes,
        });
    }
    (state.status, state.body.clone())
}

async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

async fn spawn_upload_server(
    status: AxumStatus,
    body: &str,
) -> (Settings, Arc<Mutex<Vec<ReceivedPart>>>) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let state = UploadServerState {
        status,
        body: body.to_string(),
        received: Arc::clone(&received),
    };
    let app = Router::new()
        .route("/api/upload", post(handle_upload))
        .with_state(state);
    let settings = Settings {
        base_url: serve(app).await,
        ..Settings::default()
    };
    (settings, received)
}

fn backend_for(settings: &Settings) -> HttpTranscriptionBackend {
    let http = Client::builder().no_proxy().build().expect("client");
    HttpTranscriptionBackend::with_client(settings, http).expect("backend")
}

async fn upload_bytes(
    settings: &Settings,
    bytes: Vec<u8>,
) -> (
    Result<TranscriptionResult, UploadError>,
    Vec<TransferProgress>,
) {
    let backend = backend_for(settings);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let outcome = backend
        .upload(SelectedFile::from_bytes("clip.mp4", "video/mp4", bytes), tx)
        .await;
    let mut reports = Vec::new();
    while let Ok(report) = rx.try_recv() {
        reports.push(report);
    }
    (outcome, reports)
}

#[tokio::test]
async fn posts_video_under_the_file_field() {
    let (settings, received) =
        spawn_upload_server(AxumStatus::OK, r#"{"transcription":"T","resume":"S"}"#).await;

    let (outcome, _) = upload_bytes(&settings, b"fake video content".to_vec()).await;
    outcome.expect("upload");

    let parts = received.lock().await.clone();
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0].field.as_deref(), Some(UPLOAD_FILE_FIELD));
    assert_eq!(parts[0].file_name.as_deref(), Some("clip.mp4"));
    assert_eq!(parts[0].content_type.as_deref(), Some("video/mp4"));
    assert_eq!(parts[0].bytes, b"fake video content");
}

#[tokio::test]
async fn success_body_becomes_transcription_result() {
    let (settings, _) = spawn_upload_server(
        AxumStatus::OK,
        r#"{"message":"Video procesado","transcription":"T","resume":"S","video_path":"v","audio_path":"a"}"#,
    )
    .await;

    let (outcome, _) = upload_bytes(&settings, b"x".to_vec()).await;
    let result = outcome.expect("upload");

    assert_eq!(result.transcription, "T");
    assert_eq!(result.summary, "S");
    assert_eq!(result.message.as_deref(), Some("Video procesado"));
    assert_eq!(result.video_path.as_deref(), Some("v"));
}

#[tokio::test]
async fn server_error_passes_backend_text_through() {
    let (settings, _) =
        spawn_upload_server(AxumStatus::INTERNAL_SERVER_ERROR, r#"{"error":"boom"}"#).await;

    let (outcome, _) = upload_bytes(&settings, b"x".to_vec()).await;

    assert_eq!(
        outcome,
        Err(UploadError::ServerError {
            status: Some(500),
            message: "boom".into(),
        })
    );
}

#[tokio::test]
async fn non_json_and_empty_error_bodies_still_explain_the_failure() {
    let (settings, _) =
        spawn_upload_server(AxumStatus::UNPROCESSABLE_ENTITY, r#"{"detail":"unsupported codec"}"#)
            .await;
    let (outcome, _) = upload_bytes(&settings, b"x".to_vec()).await;
    assert_eq!(
        outcome.expect_err("422").to_string(),
        "unsupported codec"
    );

    let (settings, _) = spawn_upload_server(AxumStatus::BAD_GATEWAY, "gateway down").await;
    let (outcome, _) = upload_bytes(&settings, b"x".to_vec()).await;
    assert_eq!(outcome.expect_err("502").to_string(), "gateway down");

    let (settings, _) = spawn_upload_server(AxumStatus::SERVICE_UNAVAILABLE, "").await;
    let (outcome, _) = upload_bytes(&settings, b"x".to_vec()).await;
    assert_eq!(
        outcome.expect_err("503").to_string(),
        "server responded with 503 Service Unavailable"
    );
}

#[tokio::test]
async fn error_field_in_success_response_is_a_failure() {
    let (settings, _) =
        spawn_upload_server(AxumStatus::OK, r#"{"error":"could not extract audio"}"#).await;

    let (outcome, _) = upload_bytes(&settings, b"x".to_vec()).await;

    assert_eq!(
        outcome,
        Err(UploadError::ServerError {
            status: None,
            message: "could not extract audio".into(),
        })
    );
}

#[tokio::test]
async fn incomplete_success_responses_are_partial_results() {
    let (settings, _) = spawn_upload_server(AxumStatus::OK, r#"{"message":"ok"}"#).await;
    let (outcome, _) = upload_bytes(&settings, b"x".to_vec()).await;
    assert!(matches!(outcome, Err(UploadError::PartialResult(_))));

    let (settings, _) = spawn_upload_server(AxumStatus::OK, "<html>ok</html>").await;
    let (outcome, _) = upload_bytes(&settings, b"x".to_vec()).await;
    assert!(matches!(outcome, Err(UploadError::PartialResult(_))));
}

#[tokio::test]
async fn unreachable_server_is_a_network_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    let settings = Settings {
        base_url: format!("http://{addr}"),
        ..Settings::default()
    };

    let (outcome, _) = upload_bytes(&settings, b"x".to_vec()).await;

    assert!(matches!(outcome, Err(UploadError::NetworkFailure(_))));
}

#[tokio::test]
async fn reports_chunked_progress_up_to_the_full_body() {
    let (settings, received) =
        spawn_upload_server(AxumStatus::OK, r#"{"transcription":"T","resume":"S"}"#).await;
    let payload = vec![7u8; UPLOAD_CHUNK_SIZE * 4 + 123];
    let total = payload.len() as u64;

    let (outcome, reports) = upload_bytes(&settings, payload).await;
    outcome.expect("upload");

    assert_eq!(reports.len(), 5);
    assert!(reports
        .windows(2)
        .all(|pair| pair[0].bytes_sent < pair[1].bytes_sent));
    let last = reports.last().expect("last report");
    assert_eq!(last.bytes_sent, total);
    assert_eq!(last.bytes_total, total);
    assert_eq!(received.lock().await[0].bytes.len() as u64, total);
}

#[tokio::test]
async fn reads_path_payloads_from_disk() {
    let (settings, received) =
        spawn_upload_server(AxumStatus::OK, r#"{"transcription":"T","summary":"S"}"#).await;
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("clip.mp4");
    std::fs::write(&path, b"bytes on disk").expect("write");
    let backend = backend_for(&settings);

    let file = SelectedFile {
        name: "clip.mp4".into(),
        size_bytes: 13,
        mime_type: "video/mp4".into(),
        payload: FilePayload::Path(path.clone()),
    };
    let (tx, _rx) = mpsc::unbounded_channel();
    backend.upload(file.clone(), tx).await.expect("upload");
    assert_eq!(received.lock().await[0].bytes, b"bytes on disk");

    std::fs::remove_file(&path).expect("remove");
    let (tx, _rx) = mpsc::unbounded_channel();
    assert!(matches!(
        backend.upload(file, tx).await,
        Err(UploadError::FileUnreadable(_))
    ));
}

#[tokio::test]
async fn health_probe_classifies_responses() {
    let healthy = Settings {
        base_url: serve(Router::new().route("/", get(|| async { "" }))).await,
        ..Settings::default()
    };
    let unrouted = Settings {
        base_url: serve(Router::new()).await,
        ..Settings::default()
    };
    let broken = Settings {
        base_url: serve(Router::new().route(
            "/",
            get(|| async { (AxumStatus::INTERNAL_SERVER_ERROR, "down") }),
        ))
        .await,
        ..Settings::default()
    };

    let probe = |settings: Settings| async move {
        backend_for(&settings).health().await
    };

    assert_eq!(probe(healthy).await, ConnectivityState::Online);
    assert_eq!(probe(unrouted).await, ConnectivityState::Online);
    assert!(matches!(
        probe(broken).await,
        ConnectivityState::Offline(reason) if reason.contains("500")
    ));

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    assert!(matches!(
        probe(Settings {
            base_url: format!("http://{addr}"),
            ..Settings::default()
        })
        .await,
        ConnectivityState::Offline(_)
    ));
}

#[tokio::test]
async fn controller_drives_a_real_http_upload_to_success() {
    let (settings, _) =
        spawn_upload_server(AxumStatus::OK, r#"{"transcription":"T","resume":"S"}"#).await;
    let backend = Arc::new(backend_for(&settings));
    let controller = UploadFlowController::new(backend, settings.request_timeout());

    controller
        .select_file(SelectedFile::from_bytes(
            "test-video.mp4",
            "video/mp4",
            b"fake video content".to_vec(),
        ))
        .await
        .expect("stage");
    let result = controller.submit_and_wait().await.expect("upload");

    assert_eq!(result.transcription, "T");
    assert!(matches!(
        controller.state().await,
        UploadState::Succeeded(ref result) if result.summary == "S"
    ));
}

#[tokio::test]
async fn controller_surfaces_server_failure() {
    let (settings, _) = spawn_upload_server(
        AxumStatus::INTERNAL_SERVER_ERROR,
        r#"{"error":"Error interno del servidor"}"#,
    )
    .await;
    let backend = Arc::new(backend_for(&settings));
    let controller = UploadFlowController::new(backend, settings.request_timeout());
    controller
        .select_file(SelectedFile::from_bytes("clip.mp4", "video/mp4", vec![1u8, 2, 3]))
        .await
        .expect("stage");

    controller.submit_and_wait().await.expect_err("fails");

    match controller.state().await {
        UploadState::Failed(err) => {
            assert!(err.to_string().contains("Error interno del servidor"))
        }
        other => panic!("unexpected state {other:?}"),
    }
}

#[tokio::test]
async fn payload_that_disagrees_with_its_staged_size_is_not_sent() {
    let (settings, received) =
        spawn_upload_server(AxumStatus::OK, r#"{"transcription":"T","resume":"S"}"#).await;
    let backend = backend_for(&settings);

    let mut file = SelectedFile::from_bytes("clip.mp4", "video/mp4", b"fake video content".to_vec());
    file.size_bytes = 4;
    let (tx, _rx) = mpsc::unbounded_channel();
    assert!(matches!(
        backend.upload(file, tx).await,
        Err(UploadError::FileUnreadable(_))
    ));

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("clip.mp4");
    std::fs::write(&path, b"12345").expect("write");
    let on_disk = SelectedFile {
        name: "clip.mp4".into(),
        size_bytes: 5,
        mime_type: "video/mp4".into(),
        payload: FilePayload::Path(path.clone()),
    };
    std::fs::write(&path, b"1234567890").expect("grow");
    let (tx, _rx) = mpsc::unbounded_channel();
    assert!(matches!(
        backend.upload(on_disk, tx).await,
        Err(UploadError::FileUnreadable(_))
    ));

    assert!(received.lock().await.is_empty());
}

#[tokio::test]
async fn file_grown_past_the_cap_after_selection_is_refused_at_submit() {
    let (settings, received) =
        spawn_upload_server(AxumStatus::OK, r#"{"transcription":"T","resume":"S"}"#).await;
    let policy = ValidationPolicy {
        max_size_bytes: 16,
        ..ValidationPolicy::default()
    };
    let controller = UploadFlowController::new_with_policy(
        Arc::new(backend_for(&settings)),
        policy,
        settings.request_timeout(),
    );
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("clip.mp4");
    std::fs::write(&path, b"12345").expect("write");
    controller.select_path(&path).await.expect("stage");

    std::fs::write(&path, vec![0u8; 17]).expect("grow");
    let err = controller.submit_and_wait().await.expect_err("too large");

    assert_eq!(
        err,
        UploadError::TooLarge {
            size_bytes: 17,
            max_size_bytes: 16,
        }
    );
    assert_eq!(controller.state().await, UploadState::Idle);
    assert!(received.lock().await.is_empty());

    std::fs::write(&path, b"1234567").expect("shrink");
    controller.submit_and_wait().await.expect("upload");
    assert_eq!(received.lock().await[0].bytes, b"1234567");
}
