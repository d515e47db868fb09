//! Copying result text to the clipboard, with a terminal fallback.

use std::io::Write;

use anyhow::{anyhow, Context, Result};
use arboard::Clipboard;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::warn;

use crate::Notice;

pub trait ClipboardSink {
    fn name(&self) -> &'static str;
    fn set_text(&mut self, text: &str) -> Result<()>;
}

/// The desktop clipboard.
pub struct SystemClipboard;

impl ClipboardSink for SystemClipboard {
    fn name(&self) -> &'static str {
        "system clipboard"
    }

    fn set_text(&mut self, text: &str) -> Result<()> {
        let mut clipboard = Clipboard::new().context("system clipboard unavailable")?;
        clipboard
            .set_text(text.to_string())
            .context("failed to set clipboard text")
    }
}

/// OSC 52 escape sequence; terminals that support it copy the payload into
/// the local clipboard, including over SSH.
pub struct Osc52Clipboard<W: Write> {
    out: W,
}

impl<W: Write> Osc52Clipboard<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ClipboardSink for Osc52Clipboard<W> {
    fn name(&self) -> &'static str {
        "terminal (OSC 52)"
    }

    fn set_text(&mut self, text: &str) -> Result<()> {
        let encoded = STANDARD.encode(text.as_bytes());
        write!(self.out, "\x1b]52;c;{encoded}\x07")?;
        self.out.flush()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    Primary,
    Fallback,
}

/// Tries `primary`, then `fallback`. Fails only if both fail.
pub fn copy_text(
    text: &str,
    primary: &mut dyn ClipboardSink,
    fallback: &mut dyn ClipboardSink,
) -> Result<CopyOutcome> {
    let primary_err = match primary.set_text(text) {
        Ok(()) => return Ok(CopyOutcome::Primary),
        Err(err) => err,
    };
    warn!(sink = primary.name(), error = %primary_err, "clipboard copy failed; trying fallback");

    fallback.set_text(text).map_err(|fallback_err| {
        anyhow!(
            "{} failed ({primary_err:#}); {} failed ({fallback_err:#})",
            primary.name(),
            fallback.name()
        )
    })?;
    Ok(CopyOutcome::Fallback)
}

pub fn copy_notice(outcome: &Result<CopyOutcome>) -> Notice {
    match outcome {
        Ok(CopyOutcome::Primary) => Notice::success("Copied to clipboard"),
        Ok(CopyOutcome::Fallback) => Notice::success("Copied to clipboard via terminal"),
        Err(err) => Notice::error(format!("Could not copy the text: {err}")),
    }
}

/// System clipboard first, then OSC 52 on stderr.
pub fn copy_to_clipboard(text: &str) -> Notice {
    let mut fallback = Osc52Clipboard::new(std::io::stderr());
    let outcome = copy_text(text, &mut SystemClipboard, &mut fallback);
    copy_notice(&outcome)
}
