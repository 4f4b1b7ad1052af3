// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Persisted scraper settings.
//!
//! Settings live in `~/.gamescrape/config.json`. A missing file yields the
//! defaults and missing keys fall back per field, so older config files keep
//! loading after new settings are added.
//!
//! Handles never read this file. They take a `&ScraperConfig` when they are
//! constructed and copy the values they need.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::media::AssetCategory;
use crate::net::{TimeoutProfile, TransferRole, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_TRANSFER_TIMEOUT_SECS};
use crate::utils::mask_sensitive;

/// Environment variable overriding `media_root` at load time.
pub const MEDIA_ROOT_ENV: &str = "GAMESCRAPE_MEDIA_ROOT";

const CONFIG_DIR_NAME: &str = ".gamescrape";
const CONFIG_FILE_NAME: &str = "config.json";

/// Scraper settings, as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScraperConfig {
    /// Name of the selected provider
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Root of the downloaded media tree
    #[serde(default = "default_media_root")]
    pub media_root: PathBuf,

    #[serde(default = "default_true")]
    pub scrape_covers: bool,
    #[serde(default = "default_true")]
    pub scrape_marquees: bool,
    #[serde(default = "default_true")]
    pub scrape_screenshots: bool,
    #[serde(default = "default_true")]
    pub scrape_3d_boxes: bool,
    #[serde(default)]
    pub scrape_videos: bool,

    /// Connect timeout for provider requests, 0 for none
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: i64,
    /// Total timeout for provider requests, 0 for none
    #[serde(default = "default_transfer_timeout")]
    pub transfer_timeout_secs: i64,

    /// Replace media that already exists locally
    #[serde(default = "default_true")]
    pub overwrite_existing_media: bool,
    /// Reject payloads too small to be real media
    #[serde(default = "default_true")]
    pub halt_on_invalid_media: bool,

    /// Downscale bound for images, 0 for unconstrained
    #[serde(default = "default_resize_max_width")]
    pub resize_max_width: u32,
    #[serde(default)]
    pub resize_max_height: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thegamesdb_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenscraper_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenscraper_password: Option<String>,
    /// Preferred region for ScreenScraper media
    #[serde(default = "default_region")]
    pub region: String,
}

fn default_provider() -> String {
    "thegamesdb".to_string()
}

fn default_media_root() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(CONFIG_DIR_NAME).join("downloaded_media"),
        None => PathBuf::from("downloaded_media"),
    }
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout() -> i64 {
    DEFAULT_CONNECT_TIMEOUT_SECS as i64
}

fn default_transfer_timeout() -> i64 {
    DEFAULT_TRANSFER_TIMEOUT_SECS as i64
}

fn default_resize_max_width() -> u32 {
    600
}

fn default_region() -> String {
    "us".to_string()
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            media_root: default_media_root(),
            scrape_covers: true,
            scrape_marquees: true,
            scrape_screenshots: true,
            scrape_3d_boxes: true,
            scrape_videos: false,
            connect_timeout_secs: default_connect_timeout(),
            transfer_timeout_secs: default_transfer_timeout(),
            overwrite_existing_media: true,
            halt_on_invalid_media: true,
            resize_max_width: default_resize_max_width(),
            resize_max_height: 0,
            thegamesdb_api_key: None,
            screenscraper_username: None,
            screenscraper_password: None,
            region: default_region(),
        }
    }
}

impl ScraperConfig {
    /// Whether scraping of `category` is enabled.
    pub fn category_enabled(&self, category: AssetCategory) -> bool {
        match category {
            AssetCategory::Box3D => self.scrape_3d_boxes,
            AssetCategory::Cover => self.scrape_covers,
            AssetCategory::Marquee => self.scrape_marquees,
            AssetCategory::Screenshot => self.scrape_screenshots,
            AssetCategory::Video => self.scrape_videos,
        }
    }

    /// Timeout profile for transfers of the given role.
    pub fn timeouts(&self, role: TransferRole) -> TimeoutProfile {
        TimeoutProfile::for_role(role, self.connect_timeout_secs, self.transfer_timeout_secs)
    }

    /// Update one setting from its string form, as given on the command line.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "provider" => self.provider = value.to_string(),
            "media_root" => self.media_root = PathBuf::from(value),
            "scrape_covers" => self.scrape_covers = parse_bool(key, value)?,
            "scrape_marquees" => self.scrape_marquees = parse_bool(key, value)?,
            "scrape_screenshots" => self.scrape_screenshots = parse_bool(key, value)?,
            "scrape_3d_boxes" => self.scrape_3d_boxes = parse_bool(key, value)?,
            "scrape_videos" => self.scrape_videos = parse_bool(key, value)?,
            "connect_timeout_secs" => self.connect_timeout_secs = parse_number(key, value)?,
            "transfer_timeout_secs" => self.transfer_timeout_secs = parse_number(key, value)?,
            "overwrite_existing_media" => self.overwrite_existing_media = parse_bool(key, value)?,
            "halt_on_invalid_media" => self.halt_on_invalid_media = parse_bool(key, value)?,
            "resize_max_width" => self.resize_max_width = parse_number(key, value)?,
            "resize_max_height" => self.resize_max_height = parse_number(key, value)?,
            "thegamesdb_api_key" => self.thegamesdb_api_key = non_empty(value),
            "screenscraper_username" => self.screenscraper_username = non_empty(value),
            "screenscraper_password" => self.screenscraper_password = non_empty(value),
            "region" => self.region = value.to_lowercase(),
            _ => bail!("Unknown setting '{}'", key),
        }
        Ok(())
    }

    /// Settings as `(key, value)` pairs for display, credentials masked.
    pub fn display_entries(&self) -> Vec<(&'static str, String)> {
        let masked = |value: &Option<String>| match value {
            Some(v) => mask_sensitive(v, 4),
            None => "(not set)".to_string(),
        };
        let hidden = |value: &Option<String>| match value {
            Some(_) => "...".to_string(),
            None => "(not set)".to_string(),
        };
        vec![
            ("provider", self.provider.clone()),
            ("media_root", self.media_root.display().to_string()),
            ("scrape_covers", self.scrape_covers.to_string()),
            ("scrape_marquees", self.scrape_marquees.to_string()),
            ("scrape_screenshots", self.scrape_screenshots.to_string()),
            ("scrape_3d_boxes", self.scrape_3d_boxes.to_string()),
            ("scrape_videos", self.scrape_videos.to_string()),
            ("connect_timeout_secs", self.connect_timeout_secs.to_string()),
            ("transfer_timeout_secs", self.transfer_timeout_secs.to_string()),
            ("overwrite_existing_media", self.overwrite_existing_media.to_string()),
            ("halt_on_invalid_media", self.halt_on_invalid_media.to_string()),
            ("resize_max_width", self.resize_max_width.to_string()),
            ("resize_max_height", self.resize_max_height.to_string()),
            ("thegamesdb_api_key", masked(&self.thegamesdb_api_key)),
            ("screenscraper_username", masked(&self.screenscraper_username)),
            ("screenscraper_password", hidden(&self.screenscraper_password)),
            ("region", self.region.clone()),
        ]
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => bail!("Setting '{}' expects true or false, got '{}'", key, value),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("Setting '{}' expects a number, got '{}'", key, value))
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Directory holding the config file, created if missing.
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not find home directory")?;
    let config_dir = home.join(CONFIG_DIR_NAME);
    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create {}", config_dir.display()))?;
    }
    Ok(config_dir)
}

pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load settings from the default location.
pub fn load_config() -> Result<ScraperConfig> {
    load_config_from(&config_path()?)
}

/// Load settings from `path`, applying the media root override from the
/// environment.
pub fn load_config_from(path: &Path) -> Result<ScraperConfig> {
    let mut config = load_stored_config_from(path)?;
    apply_media_root_override(&mut config, std::env::var_os(MEDIA_ROOT_ENV));

    if let Some(key) = &config.thegamesdb_api_key {
        tracing::debug!("TheGamesDB API key: {}", mask_sensitive(key, 4));
    }

    Ok(config)
}

/// Load settings from `path` exactly as stored, without environment overrides.
pub fn load_stored_config_from(path: &Path) -> Result<ScraperConfig> {
    if !path.exists() {
        return Ok(ScraperConfig::default());
    }
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn apply_media_root_override(config: &mut ScraperConfig, value: Option<OsString>) {
    if let Some(root) = value.filter(|v| !v.is_empty()) {
        tracing::debug!("Media root overridden by {}", MEDIA_ROOT_ENV);
        config.media_root = PathBuf::from(root);
    }
}

/// Change one setting in the config file.
pub fn set_config_value(key: &str, value: &str) -> Result<()> {
    set_config_value_at(&config_path()?, key, value)
}

/// Change one setting in the file at `path`. Environment overrides are
/// never written back.
pub fn set_config_value_at(path: &Path, key: &str, value: &str) -> Result<()> {
    let mut config = load_stored_config_from(path)?;
    config.set_value(key, value)?;
    save_config_to(&config, path)
}

pub fn save_config(config: &ScraperConfig) -> Result<()> {
    save_config_to(config, &config_path()?)
}

pub fn save_config_to(config: &ScraperConfig, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(config)?;
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
