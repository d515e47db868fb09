//! Saving result text to local files.

use std::{
    fs,
    path::{Component, Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use shared::domain::TranscriptionResult;

pub const TRANSCRIPTION_FILENAME: &str = "transcription.txt";
pub const SUMMARY_FILENAME: &str = "summary.txt";

/// Writes `content` as UTF-8 to `dir/filename`, creating `dir` if needed.
/// `filename` must be a bare file name.
pub fn save_text(dir: &Path, filename: &str, content: &str) -> Result<PathBuf> {
    let mut components = Path::new(filename).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => {}
        _ => bail!("invalid export file name '{filename}'"),
    }

    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create export directory '{}'", dir.display()))?;
    let path = dir.join(filename);
    fs::write(&path, content)
        .with_context(|| format!("failed to write '{}'", path.display()))?;
    Ok(path)
}

/// Saves the transcription and the summary side by side.
pub fn save_result(dir: &Path, result: &TranscriptionResult) -> Result<Vec<PathBuf>> {
    Ok(vec![
        save_text(dir, TRANSCRIPTION_FILENAME, &result.transcription)?,
        save_text(dir, SUMMARY_FILENAME, &result.summary)?,
    ])
}
