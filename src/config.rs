//! Configuration management for hwinspect
//!
//! Config file location:
//! - Linux: ~/.config/hwinspect/config.toml
//! - macOS: ~/Library/Application Support/io.hwinspect.hwinspect/config.toml
//! - Windows: %APPDATA%/hwinspect/hwinspect/config/config.toml
//!
//! You can override the config location by setting `HWINSPECT_CONFIG_PATH`,
//! and the inspected root directory by setting `HWINSPECT_CHROOT`.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

const CONFIG_PATH_ENV: &str = "HWINSPECT_CONFIG_PATH";
const CHROOT_ENV: &str = "HWINSPECT_CHROOT";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Where pseudo-files are read from
    #[serde(default)]
    pub source: SourceConfig,

    /// CLI output preferences
    #[serde(default)]
    pub output: OutputConfig,

    /// Reporting of partially read data
    #[serde(default)]
    pub warnings: WarningsConfig,
}

impl Config {
    /// Load configuration from file or create default
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config from {}", config_path.display()))?;

            let config: Config = toml::from_str(&content).with_context(|| {
                format!("Failed to parse config from {}", config_path.display())
            })?;

            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, toml)
            .with_context(|| format!("Failed to write config to {}", config_path.display()))?;

        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        if let Some(path) = non_empty_env(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }

        let proj_dirs = ProjectDirs::from("io", "hwinspect", "hwinspect")
            .context("Could not determine project directories")?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    /// Create default config file if it doesn't exist
    pub fn init() -> Result<Self> {
        let config = Self::load()?;

        let config_path = Self::config_path()?;
        if !config_path.exists() {
            config.save()?;
        }

        Ok(config)
    }

    /// Root directory to inspect, with `HWINSPECT_CHROOT` taking precedence
    pub fn root(&self) -> PathBuf {
        non_empty_env(CHROOT_ENV)
            .map(PathBuf::from)
            .or_else(|| self.source.root.clone())
            .unwrap_or_else(default_root)
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    let value = std::env::var(name).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("/")
}

/// Source configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Directory prefixed to every pseudo-file path; `/` when unset
    pub root: Option<PathBuf>,
}

/// Output format for CLI reports
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,

    /// Colorize text output
    #[serde(default = "default_true")]
    pub color: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            color: default_true(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Warning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarningsConfig {
    /// Print partial-data annotations after a report
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for WarningsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
        }
    }
}
