//! Configuration loading from TOML files.
//!
//! Lookup order:
//! 1. `$QEVAL_CONFIG` environment variable
//! 2. `~/.config/qeval/config.toml`
//! 3. Built-in defaults (everything is optional)

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub cache: CacheConfig,
    pub scoring: ScoringConfig,
}

/// Dashboard API settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
}

/// Durable cache slot settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache database path. Default: platform-specific data dir.
    pub path: Option<String>,
    /// Total byte budget across namespaces, localStorage-like.
    pub quota_bytes: u64,
}

/// Score banding settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Pass/fail cutoff on the 0..1 scale.
    pub pass_threshold: f64,
}

// --- Defaults ---

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".into(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: None,
            quota_bytes: 5 * 1024 * 1024,
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            pass_threshold: qeval_core::PASS_THRESHOLD,
        }
    }
}

/// Load config from disk. Returns defaults if no config file exists.
pub fn load_config() -> Result<Config> {
    let path = config_path();

    if let Some(p) = &path {
        if p.exists() {
            let content =
                std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
            let config: Config =
                toml::from_str(&content).with_context(|| format!("parsing {}", p.display()))?;
            return Ok(config);
        }
    }

    Ok(Config::default())
}

/// Resolve the config file path.
fn config_path() -> Option<PathBuf> {
    // 1. Environment variable
    if let Ok(p) = std::env::var("QEVAL_CONFIG") {
        return Some(PathBuf::from(p));
    }

    // 2. ~/.config/qeval/config.toml
    if let Some(home) = dirs_home() {
        let p = home.join(".config").join("qeval").join("config.toml");
        return Some(p);
    }

    None
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

/// Show the active config path (for `qeval config`).
pub fn show_config_path() -> String {
    match config_path() {
        Some(p) if p.exists() => format!("{} (loaded)", p.display()),
        Some(p) => format!("{} (not found, using defaults)", p.display()),
        None => "no config path resolved (using defaults)".into(),
    }
}

/// Resolve the cache database path, preferring the configured one.
pub fn cache_db_path(config: &Config) -> PathBuf {
    if let Some(p) = &config.cache.path {
        return PathBuf::from(p);
    }
    directories::ProjectDirs::from("dev", "qeval", "qeval")
        .map(|dirs| dirs.data_dir().join("cache.db"))
        .unwrap_or_else(|| PathBuf::from("cache.db"))
}
