use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_IMAGE_MODEL: &str = "imagen-4.0-generate-001";
pub const DEFAULT_EDIT_MODEL: &str = "gemini-2.5-flash-image";
pub const STATE_FILE_NAME: &str = "state.json";
pub const CONFIG_FILE_NAME: &str = "visio.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub state_dir: PathBuf,
    pub api_base: String,
    pub image_model: String,
    pub edit_model: String,
    pub request_timeout_s: f64,
    pub transport_retries: usize,
    pub retry_backoff_s: f64,
    pub dryrun: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            api_base: DEFAULT_API_BASE.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            edit_model: DEFAULT_EDIT_MODEL.to_string(),
            request_timeout_s: 90.0,
            transport_retries: 2,
            retry_backoff_s: 1.2,
            dryrun: false,
        }
    }
}

impl Settings {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| default_state_dir().join(CONFIG_FILE_NAME));
        let mut settings = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed reading {}", path.display()))?;
            Self::from_toml(&raw).with_context(|| format!("invalid config {}", path.display()))?
        } else {
            Self::default()
        };
        settings.apply_env_overrides(|key| env::var(key).ok());
        Ok(settings.normalized())
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(raw)?;
        Ok(settings.normalized())
    }

    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        if let Some(dir) = non_empty("VISIO_STATE_DIR") {
            self.state_dir = PathBuf::from(dir);
        }
        if let Some(base) = non_empty("GEMINI_API_BASE") {
            self.api_base = base;
        }
        if let Some(model) = non_empty("VISIO_IMAGE_MODEL") {
            self.image_model = model;
        }
        if let Some(model) = non_empty("VISIO_EDIT_MODEL") {
            self.edit_model = model;
        }
        if let Some(flag) = non_empty("VISIO_DRYRUN") {
            self.dryrun = matches!(flag.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
    }

    pub fn normalized(mut self) -> Self {
        self.api_base = self.api_base.trim().trim_end_matches('/').to_string();
        if self.api_base.is_empty() {
            self.api_base = DEFAULT_API_BASE.to_string();
        }
        if !self.request_timeout_s.is_finite() {
            self.request_timeout_s = 90.0;
        }
        self.request_timeout_s = self.request_timeout_s.clamp(15.0, 300.0);
        self.transport_retries = self.transport_retries.min(4);
        if !self.retry_backoff_s.is_finite() {
            self.retry_backoff_s = 1.2;
        }
        self.retry_backoff_s = self.retry_backoff_s.clamp(0.1, 10.0);
        self
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_dir.join(STATE_FILE_NAME)
    }
}

pub fn api_key() -> Option<String> {
    ["GEMINI_API_KEY", "GOOGLE_API_KEY", "API_KEY"]
        .into_iter()
        .filter_map(|key| env::var(key).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

fn default_state_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("visio")
}
