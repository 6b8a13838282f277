use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use log::warn;
use url::Url;

use crate::subtitle_format::OutputFormat;

/// Application configuration module
/// This module handles loading, validating and saving the settings used by
/// the subtitle retrieval strategies.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Default output format
    #[serde(default)]
    pub output_format: OutputFormat,

    /// User agent sent with every platform request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// YouTube settings
    #[serde(default)]
    pub youtube: YoutubeConfig,

    /// Bilibili settings
    #[serde(default)]
    pub bilibili: BilibiliConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// YouTube transcript settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct YoutubeConfig {
    /// Root of the watch pages
    #[serde(default = "default_youtube_base_url")]
    pub watch_base_url: String,

    /// Caption language to ask for; `null` takes the first track
    #[serde(default = "default_preferred_language")]
    pub preferred_language: Option<String>,
}

impl Default for YoutubeConfig {
    fn default() -> Self {
        Self {
            watch_base_url: default_youtube_base_url(),
            preferred_language: default_preferred_language(),
        }
    }
}

/// Bilibili API settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BilibiliConfig {
    /// Root of the API endpoints
    #[serde(default = "default_bilibili_api_base_url")]
    pub api_base_url: String,

    /// Session cookie header forwarded on credentialed calls
    /// (for example `SESSDATA=...`). Some videos only list captions
    /// for logged-in sessions.
    #[serde(default = "String::new")]
    pub cookie: String,
}

impl Default for BilibiliConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_bilibili_api_base_url(),
            cookie: String::new(),
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".to_string()
}

fn default_youtube_base_url() -> String {
    "https://www.youtube.com".to_string()
}

fn default_preferred_language() -> Option<String> {
    Some("en".to_string())
}

fn default_bilibili_api_base_url() -> String {
    "https://api.bilibili.com".to_string()
}

impl Config {
    /// Load the configuration at `path`, writing a default one when missing
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let file = File::open(path)
                .context(format!("Failed to open config file: {}", path.display()))?;

            let reader = BufReader::new(file);
            let config: Config = serde_json::from_reader(reader)
                .context(format!("Failed to parse config file: {}", path.display()))?;
            return Ok(config);
        }

        warn!("Config file not found at '{}', creating default config.", path.display());
        let config = Config::default();
        config.save(path)?;
        Ok(config)
    }

    /// Write the configuration as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let config_json = serde_json::to_string_pretty(self)
            .context("Failed to serialize config to JSON")?;

        std::fs::write(path, config_json)
            .context(format!("Failed to write config to file: {}", path.display()))
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        validate_base_url("youtube.watch_base_url", &self.youtube.watch_base_url)?;
        validate_base_url("bilibili.api_base_url", &self.bilibili.api_base_url)?;

        if let Some(language) = &self.youtube.preferred_language {
            crate::language_utils::validate_caption_language(language)?;
        }

        if self.user_agent.trim().is_empty() {
            return Err(anyhow!("User agent must not be empty"));
        }

        Ok(())
    }
}

fn validate_base_url(name: &str, value: &str) -> Result<()> {
    let url = Url::parse(value).map_err(|e| anyhow!("Invalid {} '{}': {}", name, value, e))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(anyhow!("Invalid {} '{}': unsupported scheme {}", name, value, scheme)),
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            output_format: OutputFormat::default(),
            user_agent: default_user_agent(),
            youtube: YoutubeConfig::default(),
            bilibili: BilibiliConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}
