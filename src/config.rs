use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::ingest::DispatchOptions;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub grano: GranoConfig,
    #[serde(default)]
    pub load: LoadConfig,
}

/// grano server connection
#[derive(Debug, Clone, Deserialize)]
pub struct GranoConfig {
    /// Base URL of the grano instance
    #[serde(default)]
    pub host: Option<String>,
    /// Project slug to load into
    #[serde(default)]
    pub project: Option<String>,
    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GranoConfig {
    fn default() -> Self {
        Self {
            host: None,
            project: None,
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Row dispatch settings
#[derive(Debug, Clone, Deserialize)]
pub struct LoadConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    /// Continue loading upon errors
    #[serde(default)]
    pub force: bool,
    #[serde(default = "default_progress_every")]
    pub progress_every: u64,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_depth: default_queue_depth(),
            force: false,
            progress_every: default_progress_every(),
        }
    }
}

fn default_api_key_env() -> String {
    "GRANO_APIKEY".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_workers() -> usize {
    1
}

fn default_queue_depth() -> usize {
    1
}

fn default_progress_every() -> u64 {
    1000
}

impl Config {
    /// Load configuration
    ///
    /// Loads environment variables from .env file (if present) first.
    /// Looks for a config file in this order:
    /// 1. Path specified in GRANOLOADER_CONFIG environment variable (must exist)
    /// 2. ./granoloader.toml in current directory (optional)
    ///
    /// GRANO_HOST and GRANO_PROJECT override the file.
    pub fn load() -> Result<Self> {
        // Load .env file if it exists (ignore errors - file is optional)
        let _ = dotenv::dotenv();

        let mut config = match std::env::var("GRANOLOADER_CONFIG") {
            Ok(path) => Self::from_file(PathBuf::from(path))?,
            Err(_) => {
                let path = PathBuf::from("granoloader.toml");
                if path.exists() {
                    Self::from_file(path)?
                } else {
                    Config::default()
                }
            }
        };

        if let Ok(host) = std::env::var("GRANO_HOST") {
            config.grano.host = Some(host);
        }
        if let Ok(project) = std::env::var("GRANO_PROJECT") {
            config.grano.project = Some(project);
        }

        config.validate()?;
        Ok(config)
    }

    fn from_file(path: PathBuf) -> Result<Self> {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Parse configuration from TOML text
    pub fn parse(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.load.workers == 0 {
            anyhow::bail!("load.workers must be greater than 0");
        }
        if self.load.queue_depth == 0 {
            anyhow::bail!("load.queue_depth must be greater than 0");
        }
        if self.grano.timeout_secs == 0 {
            anyhow::bail!("grano.timeout_secs must be greater than 0");
        }
        Ok(())
    }

    /// Check that a live grano server is fully configured and return its API key.
    pub fn require_remote(&self, api_key: Option<String>) -> Result<String> {
        if self.grano.host.as_deref().map_or(true, str::is_empty) {
            anyhow::bail!("No grano server host is set. Use --host or GRANO_HOST.");
        }
        if self.grano.project.as_deref().map_or(true, str::is_empty) {
            anyhow::bail!("No grano project slug is set. Use --project or GRANO_PROJECT.");
        }
        match api_key {
            Some(key) if !key.is_empty() => Ok(key),
            _ => std::env::var(&self.grano.api_key_env).with_context(|| {
                format!(
                    "No grano API key is set. Use --api-key or set {} in your .env file or environment.",
                    self.grano.api_key_env
                )
            }),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.grano.timeout_secs)
    }

    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            workers: self.load.workers,
            queue_depth: self.load.queue_depth,
            continue_on_error: self.load.force,
            progress_every: self.load.progress_every,
        }
    }
}
