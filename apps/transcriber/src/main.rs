use std::{
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use client_core::{
    clipboard::copy_to_clipboard,
    config::{load_settings, Settings},
    export::save_result,
    health::{check_once, HealthMonitor},
    FlowEvent, HttpTranscriptionBackend, Notice, NoticeLevel, UploadFlowController,
};
use shared::{
    domain::{ConnectivityState, TranscriptionResult, UploadState},
    error::UploadError,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "transcriber", about = "Upload a video and get its transcription and summary")]
struct Args {
    /// Backend base URL, e.g. http://localhost:8000
    #[arg(long, global = true)]
    base_url: Option<String>,
    /// Upload endpoint path relative to the base URL
    #[arg(long, global = true)]
    upload_path: Option<String>,
    /// Give up on the backend after this many seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a video file and print the results
    Upload {
        file: PathBuf,
        /// Save transcription.txt and summary.txt into this directory
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// Copy one of the results to the clipboard
        #[arg(long, value_enum)]
        copy: Option<CopyTarget>,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check whether the backend is reachable
    Health {
        /// Keep polling and print every change
        #[arg(long)]
        watch: bool,
        #[arg(long)]
        interval_secs: Option<u64>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CopyTarget {
    Transcription,
    Summary,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = load_settings();
    if let Some(base_url) = args.base_url {
        settings.base_url = base_url;
    }
    if let Some(upload_path) = args.upload_path {
        settings.upload_path = upload_path;
    }
    if let Some(timeout_secs) = args.timeout_secs {
        settings.request_timeout_secs = timeout_secs;
    }

    match args.command {
        Command::Upload {
            file,
            out_dir,
            copy,
            json,
        } => upload(&settings, file, out_dir, copy, json).await,
        Command::Health {
            watch,
            interval_secs,
        } => {
            if let Some(interval_secs) = interval_secs {
                settings.health_interval_secs = interval_secs;
            }
            health(&settings, watch).await
        }
    }
}

async fn upload(
    settings: &Settings,
    file: PathBuf,
    out_dir: Option<PathBuf>,
    copy: Option<CopyTarget>,
    json: bool,
) -> Result<()> {
    let backend = Arc::new(HttpTranscriptionBackend::new(settings)?);
    println!("Uploading to {}", backend.upload_url());
    let controller = UploadFlowController::new(backend, settings.request_timeout());
    let renderer = tokio::spawn(render_events(controller.subscribe()));

    let outcome = run_upload(&controller, &file).await;
    drop(controller);
    let _ = renderer.await;

    let result = outcome.map_err(|err| anyhow!(err))?;
    print_result(&file, &result, json)?;

    if let Some(dir) = out_dir {
        for path in save_result(&dir, &result)? {
            println!("Saved {}", path.display());
        }
    }
    if let Some(target) = copy {
        let text = match target {
            CopyTarget::Transcription => &result.transcription,
            CopyTarget::Summary => &result.summary,
        };
        print_notice(&copy_to_clipboard(text));
    }
    Ok(())
}

async fn run_upload(
    controller: &Arc<UploadFlowController>,
    file: &Path,
) -> Result<TranscriptionResult, UploadError> {
    controller.select_path(file).await?;
    let ticket = controller.submit_upload().await?;
    tokio::select! {
        outcome = ticket.wait() => outcome,
        _ = tokio::signal::ctrl_c() => {
            controller.cancel().await;
            Err(UploadError::Cancelled)
        }
    }
}

/// Terminal renderer for controller events; exits when the controller is gone.
async fn render_events(mut events: broadcast::Receiver<FlowEvent>) {
    loop {
        match events.recv().await {
            Ok(FlowEvent::StateChanged(state)) => render_state(&state),
            Ok(FlowEvent::Notice(notice)) => print_notice(&notice),
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "renderer lagged behind controller events")
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn render_state(state: &UploadState) {
    let mut stderr = std::io::stderr();
    match state {
        UploadState::Uploading(percent) => {
            let _ = write!(stderr, "\rUploading... {percent:>3}%");
            let _ = stderr.flush();
        }
        UploadState::Processing => {
            let _ = writeln!(stderr, "\rProcessing video... please wait");
        }
        _ => {}
    }
}

fn print_notice(notice: &Notice) {
    let tag = match notice.level {
        NoticeLevel::Info => "info",
        NoticeLevel::Success => "ok",
        NoticeLevel::Warning => "warning",
        NoticeLevel::Error => "error",
    };
    eprintln!("[{tag}] {}", notice.message);
}

fn print_result(file: &Path, result: &TranscriptionResult, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(result).context("failed to encode result")?
        );
        return Ok(());
    }

    let name = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "processed video".to_string());
    println!("\n== {name} ==");
    println!("\n-- Transcription --\n{}", result.transcription);
    println!("\n-- Summary --\n{}", result.summary);
    Ok(())
}

async fn health(settings: &Settings, watch: bool) -> Result<()> {
    let backend = Arc::new(HttpTranscriptionBackend::new(settings)?);

    if !watch {
        return match check_once(backend.as_ref()).await {
            ConnectivityState::Offline(reason) => bail!("server offline: {reason}"),
            state => {
                println!("{}", describe(&state));
                Ok(())
            }
        };
    }

    let monitor = HealthMonitor::spawn(backend, settings.health_interval());
    let mut states = monitor.subscribe();
    println!("{}", describe(&monitor.current()));
    loop {
        let changed = tokio::select! {
            changed = states.changed() => changed.is_ok(),
            _ = tokio::signal::ctrl_c() => false,
        };
        if !changed {
            break;
        }
        println!("{}", describe(&states.borrow_and_update()));
    }
    Ok(())
}

fn describe(state: &ConnectivityState) -> String {
    match state {
        ConnectivityState::Checking => "checking...".to_string(),
        ConnectivityState::Online => "server online".to_string(),
        ConnectivityState::Offline(reason) => format!("server offline: {reason}"),
    }
}
