// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use crate::error::{RecorderError, Result};

/// Environment variable overriding `stream.url`.
pub const ENV_STREAM_URL: &str = "MOTION_RECORDER_RTSP_URL";
/// Environment variable overriding `classifier.endpoint`.
pub const ENV_CLASSIFIER_ENDPOINT: &str = "MOTION_RECORDER_YOLO_API";
/// Environment variable overriding `storage.base_path`.
pub const ENV_SAVE_PATH: &str = "MOTION_RECORDER_SAVE_PATH";

/// Top-level configuration, loaded once at startup.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    /// Camera stream to sample and record.
    #[serde(default)]
    pub stream: StreamConfig,
    /// Detection service.
    #[serde(default)]
    pub classifier: ClassifierConfig,
    /// Where recordings are written.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Sampling loop cadence.
    #[serde(default)]
    pub sampling: SamplingConfig,
    /// External media tool.
    #[serde(default)]
    pub ffmpeg: FfmpegConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StreamConfig {
    /// RTSP URL of the camera stream.
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ClassifierConfig {
    /// URL that frames are POSTed to.
    #[serde(default)]
    pub endpoint: String,
}

/// Output location for motion recordings.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Base directory; recordings land in `<base_path>/<YYYYMMDD>/`.
    #[serde(default)]
    pub base_path: PathBuf,
    /// File extension of recordings, without the dot.
    #[serde(default = "default_extension")]
    pub extension: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { base_path: PathBuf::new(), extension: default_extension() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SamplingConfig {
    /// Pause between two loop iterations, also used as the back-off after a failure.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Upper bound for a single still-frame extraction.
    #[serde(default = "default_capture_timeout_secs")]
    pub capture_timeout_secs: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            capture_timeout_secs: default_capture_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FfmpegConfig {
    /// ffmpeg executable, looked up on `PATH` unless absolute.
    #[serde(default = "default_ffmpeg_binary")]
    pub binary: PathBuf,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self { binary: default_ffmpeg_binary() }
    }
}

fn default_extension() -> String { "mp4".into() }
fn default_interval_secs() -> u64 { 1 }
fn default_capture_timeout_secs() -> u64 { 15 }
fn default_ffmpeg_binary() -> PathBuf { PathBuf::from("ffmpeg") }

impl Config {
    /// Load configuration from a TOML file at `path`, then apply environment overrides.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RecorderError::Config(format!("Cannot read config file: {e}")))?;
        let mut config = Self::from_toml(&content)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from the environment alone.
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when given, otherwise from the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Self::from_env(),
        }
    }

    /// Parse TOML without validating; missing sections fall back to defaults.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| RecorderError::Config(format!("Invalid TOML: {e}")))
    }

    /// Override settings from `lookup`. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = get(ENV_STREAM_URL) {
            self.stream.url = url;
        }
        if let Some(endpoint) = get(ENV_CLASSIFIER_ENDPOINT) {
            self.classifier.endpoint = endpoint;
        }
        if let Some(path) = get(ENV_SAVE_PATH) {
            self.storage.base_path = PathBuf::from(path);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.stream.url.trim().is_empty() {
            return Err(RecorderError::Config(format!(
                "stream.url is not set (or {ENV_STREAM_URL})"
            )));
        }
        if self.classifier.endpoint.trim().is_empty() {
            return Err(RecorderError::Config(format!(
                "classifier.endpoint is not set (or {ENV_CLASSIFIER_ENDPOINT})"
            )));
        }
        let endpoint = reqwest::Url::parse(&self.classifier.endpoint)
            .map_err(|e| RecorderError::Config(format!("classifier.endpoint is invalid: {e}")))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(RecorderError::Config(format!(
                "classifier.endpoint must be http or https, got '{}'",
                endpoint.scheme()
            )));
        }
        if self.storage.base_path.as_os_str().is_empty() {
            return Err(RecorderError::Config(format!(
                "storage.base_path is not set (or {ENV_SAVE_PATH})"
            )));
        }
        let ext = &self.storage.extension;
        if ext.is_empty() || ext.contains(['/', '\\', '.']) {
            return Err(RecorderError::Config(format!("storage.extension '{ext}' is invalid")));
        }
        if self.sampling.interval_secs == 0 {
            return Err(RecorderError::Config("sampling.interval_secs must be > 0".into()));
        }
        if self.sampling.capture_timeout_secs == 0 {
            return Err(RecorderError::Config("sampling.capture_timeout_secs must be > 0".into()));
        }
        Ok(())
    }
}
