use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::utils::url::normalize_base_url;

/// API root of a stock local Ollama install.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434/api";

/// Settings persisted in `config.toml`.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    /// API root of the model server, e.g. `http://gpu-box:11434/api`
    pub base_url: Option<String>,
    /// Model to start chats with instead of the first listed one
    pub default_model: Option<String>,
    /// Print token counts and throughput after each reply
    pub show_metrics: Option<bool>,
}

/// Where the model server lives. Injected into every client call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn new(base_url: impl AsRef<str>) -> Self {
        Self {
            base_url: normalize_base_url(base_url.as_ref()),
        }
    }

    /// Command-line override, then config file, then the local default.
    pub fn resolve(config: &Config, override_url: Option<&str>) -> Self {
        override_url
            .or(config.base_url.as_deref())
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(Self::new)
            .unwrap_or_default()
    }
}

impl Config {
    pub fn show_metrics(&self) -> bool {
        self.show_metrics.unwrap_or(false)
    }

    pub fn print_all(&self) {
        println!("Current configuration:");
        match &self.base_url {
            Some(url) => println!("  base-url: {url}"),
            None => println!("  base-url: (unset, using {DEFAULT_BASE_URL})"),
        }
        match &self.default_model {
            Some(model) => println!("  default-model: {model}"),
            None => println!("  default-model: (unset, using first available model)"),
        }
        println!(
            "  show-metrics: {}",
            if self.show_metrics() { "on" } else { "off" }
        );
    }
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
