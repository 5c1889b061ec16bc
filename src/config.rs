use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::audio::envelope::DEFAULT_RESOLUTION;
use crate::classify::DEFAULT_ENDPOINT;
use crate::render::color::Rgba;
use crate::render::gradient::GradientStop;
use crate::render::waveform::{default_gradient, RenderSpec};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub waveform: WaveformConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

#[derive(Debug, Deserialize)]
pub struct WaveformConfig {
    #[serde(default = "default_resolution")]
    pub resolution: usize,
}

#[derive(Debug, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_bar_gap")]
    pub bar_gap: f32,
    #[serde(default = "default_amplitude_fraction")]
    pub amplitude_fraction: f32,
    #[serde(default)]
    pub background: Option<Rgba>,
    #[serde(default = "default_gradient")]
    pub gradient: Vec<GradientStop>,
}

#[derive(Debug, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for WaveformConfig {
    fn default() -> Self {
        Self {
            resolution: default_resolution(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            bar_gap: default_bar_gap(),
            amplitude_fraction: default_amplitude_fraction(),
            background: None,
            gradient: default_gradient(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
            enabled: default_enabled(),
        }
    }
}

impl RenderConfig {
    pub fn to_spec(&self) -> crate::error::Result<RenderSpec> {
        RenderSpec::new(
            self.width as f32,
            self.height as f32,
            self.bar_gap,
            self.amplitude_fraction,
            self.gradient.clone(),
        )
    }
}

fn default_resolution() -> usize { DEFAULT_RESOLUTION }
fn default_width() -> u32 { 800 }
fn default_height() -> u32 { 200 }
fn default_bar_gap() -> f32 { 2.0 }
fn default_amplitude_fraction() -> f32 { 0.8 }
fn default_endpoint() -> String { DEFAULT_ENDPOINT.into() }
fn default_timeout_secs() -> u64 { 30 }
fn default_enabled() -> bool { true }

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Invalid config: {}", path.display()))
}

/// Explicit path, else `./wavescope.toml`, else the per-user config file.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("wavescope.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("wavescope").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("wavescope").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}
