use std::{fs, path::Path, time::Duration};

use anyhow::{bail, Context};
use serde::Deserialize;
use url::Url;

pub const SETTINGS_FILE: &str = "transcriber.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub base_url: String,
    pub upload_path: String,
    pub request_timeout_secs: u64,
    pub health_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".into(),
            upload_path: "/api/upload".into(),
            request_timeout_secs: 300,
            health_interval_secs: 30,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    base_url: Option<String>,
    upload_path: Option<String>,
    request_timeout_secs: Option<u64>,
    health_interval_secs: Option<u64>,
}

impl Settings {
    pub fn upload_url(&self) -> anyhow::Result<Url> {
        let base = self.base_url.trim().trim_end_matches('/');
        let path = self.upload_path.trim().trim_start_matches('/');
        let raw = format!("{base}/{path}");
        let url = Url::parse(&raw).with_context(|| format!("invalid upload url '{raw}'"))?;
        ensure_http(&url)?;
        Ok(url)
    }

    /// Root of the backend, probed for connectivity.
    pub fn health_url(&self) -> anyhow::Result<Url> {
        let raw = format!("{}/", self.base_url.trim().trim_end_matches('/'));
        let url = Url::parse(&raw).with_context(|| format!("invalid base url '{raw}'"))?;
        ensure_http(&url)?;
        Ok(url)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs.max(1))
    }

    fn merge_file(&mut self, file_cfg: SettingsFile) {
        if let Some(v) = file_cfg.base_url {
            self.base_url = v;
        }
        if let Some(v) = file_cfg.upload_path {
            self.upload_path = v;
        }
        if let Some(v) = file_cfg.request_timeout_secs {
            self.request_timeout_secs = v;
        }
        if let Some(v) = file_cfg.health_interval_secs {
            self.health_interval_secs = v;
        }
    }

    /// Applies `TRANSCRIBER_*` / `APP__*` variables; the `APP__` form wins.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("TRANSCRIBER_BASE_URL") {
            self.base_url = v;
        }
        if let Some(v) = lookup("APP__BASE_URL") {
            self.base_url = v;
        }

        if let Some(v) = lookup("APP__UPLOAD_PATH") {
            self.upload_path = v;
        }

        if let Some(v) = lookup("APP__REQUEST_TIMEOUT_SECS") {
            if let Ok(parsed) = v.parse::<u64>() {
                self.request_timeout_secs = parsed;
            }
        }
        if let Some(v) = lookup("APP__HEALTH_INTERVAL_SECS") {
            if let Ok(parsed) = v.parse::<u64>() {
                self.health_interval_secs = parsed;
            }
        }
    }
}

fn ensure_http(url: &Url) -> anyhow::Result<()> {
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => bail!("unsupported url scheme '{other}' in '{url}'"),
    }
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(SETTINGS_FILE))
}

/// Defaults, then the TOML file if it parses, then the environment.
pub fn load_settings_from(path: &Path) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<SettingsFile>(&raw) {
            Ok(file_cfg) => settings.merge_file(file_cfg),
            Err(err) => tracing::warn!(
                path = %path.display(),
                %err,
                "ignoring unparseable settings file"
            ),
        }
    }

    settings.apply_env_overrides(|key| std::env::var(key).ok());
    settings
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
