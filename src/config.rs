use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub visual: VisualConfig,
    #[serde(default)]
    pub helper: HelperConfig,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_crf")]
    pub crf: u32,
    #[serde(default = "default_codec")]
    pub codec: String,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

#[derive(Debug, Deserialize)]
pub struct ChainConfig {
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default)]
    pub preamp: f32,
    /// Ten band gains in dB, lowest band first.
    #[serde(default)]
    pub eq: Vec<f32>,
    #[serde(default)]
    pub presence: f32,
    #[serde(default)]
    pub stereo_width: f32,
    #[serde(default)]
    pub reflection: f32,
    #[serde(default = "default_limiter")]
    pub limiter: bool,
    #[serde(default = "default_playback_rate")]
    pub playback_rate: f32,
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct VisualConfig {
    #[serde(default = "default_bars")]
    pub bars: usize,
    #[serde(default = "default_max_particles")]
    pub max_particles: usize,
    #[serde(default = "default_tip_chance")]
    pub tip_chance: f32,
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct HelperConfig {
    #[serde(default = "default_helper_url")]
    pub url: String,
    #[serde(default = "default_helper_timeout")]
    pub timeout_secs: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            crf: default_crf(),
            codec: default_codec(),
            sample_rate: default_sample_rate(),
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            volume: default_volume(),
            preamp: 0.0,
            eq: Vec::new(),
            presence: 0.0,
            stereo_width: 0.0,
            reflection: 0.0,
            limiter: default_limiter(),
            playback_rate: default_playback_rate(),
            seed: None,
        }
    }
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            bars: default_bars(),
            max_particles: default_max_particles(),
            tip_chance: default_tip_chance(),
            seed: None,
        }
    }
}

impl Default for HelperConfig {
    fn default() -> Self {
        Self {
            url: default_helper_url(),
            timeout_secs: default_helper_timeout(),
        }
    }
}

fn default_width() -> u32 { 1280 }
fn default_height() -> u32 { 720 }
fn default_fps() -> u32 { 60 }
fn default_crf() -> u32 { 18 }
fn default_codec() -> String { "libx264".into() }
fn default_sample_rate() -> u32 { 44_100 }
fn default_volume() -> f32 { 0.8 }
fn default_limiter() -> bool { true }
fn default_playback_rate() -> f32 { 1.0 }
fn default_bars() -> usize { 64 }
fn default_max_particles() -> usize { 600 }
fn default_tip_chance() -> f32 { 0.08 }
fn default_helper_url() -> String { "http://localhost:5000".into() }
fn default_helper_timeout() -> u64 { 120 }

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            log::warn!("Invalid config {}: {}", path.display(), e);
            None
        }
    }
}

/// `auralis.toml` in the working directory, then `~/.config/auralis/config.toml`,
/// then the platform config directory.
pub fn locate_config() -> Option<PathBuf> {
    let local = PathBuf::from("auralis.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("auralis").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("auralis").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}
