use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use diagram_stream_core::progress::ProgressScales;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    pub cache: CacheConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
}

/// How a generation result is fetched from the backend.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TransportMode {
    /// `POST /generate/stream`, decoded incrementally.
    Stream,
    /// `POST /generate/non-stream`, one JSON object.
    NonStream,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_mode")]
    pub mode: TransportMode,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_github_token_env")]
    pub github_token_env: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            mode: default_mode(),
            timeout_secs: default_timeout_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            github_token_env: default_github_token_env(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}
fn default_mode() -> TransportMode {
    TransportMode::Stream
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_idle_timeout_secs() -> u64 {
    120
}
fn default_github_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// The GitHub token from the configured environment variable, or empty.
    pub fn github_token(&self) -> String {
        std::env::var(&self.github_token_env).unwrap_or_default()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProgressConfig {
    #[serde(default = "default_explanation_scale")]
    pub explanation_scale: f64,
    #[serde(default = "default_mapping_scale")]
    pub mapping_scale: f64,
    #[serde(default = "default_diagram_scale")]
    pub diagram_scale: f64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            explanation_scale: default_explanation_scale(),
            mapping_scale: default_mapping_scale(),
            diagram_scale: default_diagram_scale(),
        }
    }
}

fn default_explanation_scale() -> f64 {
    1000.0
}
fn default_mapping_scale() -> f64 {
    500.0
}
fn default_diagram_scale() -> f64 {
    2000.0
}

impl ProgressConfig {
    pub fn scales(&self) -> ProgressScales {
        ProgressScales {
            explanation: self.explanation_scale,
            mapping: self.mapping_scale,
            diagram: self.diagram_scale,
        }
    }
}

impl Config {
    /// Config with defaults and the given cache path.
    pub fn with_cache_path(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: BackendConfig::default(),
            cache: CacheConfig { path: path.into() },
            progress: ProgressConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let base = &config.backend.base_url;
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        anyhow::bail!("backend.base_url must start with http:// or https://, got '{}'", base);
    }

    if config.backend.timeout_secs == 0 {
        anyhow::bail!("backend.timeout_secs must be > 0");
    }
    if config.backend.idle_timeout_secs == 0 {
        anyhow::bail!("backend.idle_timeout_secs must be > 0");
    }

    let scales = [
        ("explanation_scale", config.progress.explanation_scale),
        ("mapping_scale", config.progress.mapping_scale),
        ("diagram_scale", config.progress.diagram_scale),
    ];
    for (name, value) in scales {
        if !(value.is_finite() && value > 0.0) {
            anyhow::bail!("progress.{} must be > 0", name);
        }
    }

    Ok(())
}
