use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::platform;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub visualizer: VisualizerConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Wait after loading a track before re-issuing play.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// `previous` restarts the current track when more than this has elapsed.
    #[serde(default = "default_rewind_threshold_secs")]
    pub rewind_threshold_secs: f64,
    /// Fire the deferred play as soon as the engine reports the source ready,
    /// without waiting out the full settle delay.
    #[serde(default = "default_await_ready")]
    pub await_ready: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_error_display_secs")]
    pub error_display_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualizerConfig {
    /// Analyzer FFT size; the visualizer draws `fft_size / 2` bars.
    #[serde(default = "default_fft_size")]
    pub fft_size: usize,
    #[serde(default = "default_bar_width_scale")]
    pub bar_width_scale: f64,
    #[serde(default = "default_bar_gap")]
    pub bar_gap: f64,
    /// Colour at the top of each bar.
    #[serde(default = "default_gradient_top")]
    pub gradient_top: String,
    /// Colour at the base of each bar.
    #[serde(default = "default_gradient_bottom")]
    pub gradient_bottom: String,
    /// Frame period of the headless frame host.
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_artist")]
    pub artist: String,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay_ms(),
            rewind_threshold_secs: default_rewind_threshold_secs(),
            await_ready: default_await_ready(),
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            error_display_secs: default_error_display_secs(),
        }
    }
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            fft_size: default_fft_size(),
            bar_width_scale: default_bar_width_scale(),
            bar_gap: default_bar_gap(),
            gradient_top: default_gradient_top(),
            gradient_bottom: default_gradient_bottom(),
            frame_interval_ms: default_frame_interval_ms(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            artist: default_artist(),
        }
    }
}

impl PlaybackConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl NotificationsConfig {
    pub fn error_display(&self) -> Duration {
        Duration::from_secs(self.error_display_secs)
    }
}

impl VisualizerConfig {
    /// Number of frequency bins (bars) per frame.
    pub fn bin_count(&self) -> usize {
        (self.fft_size / 2).max(1)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }
}

fn default_settle_delay_ms() -> u64 {
    100
}

fn default_rewind_threshold_secs() -> f64 {
    3.0
}

fn default_await_ready() -> bool {
    true
}

fn default_error_display_secs() -> u64 {
    5
}

fn default_fft_size() -> usize {
    256
}

fn default_bar_width_scale() -> f64 {
    2.5
}

fn default_bar_gap() -> f64 {
    2.0
}

fn default_gradient_top() -> String {
    "#ffd700".to_string()
}

fn default_gradient_bottom() -> String {
    "#ff0000".to_string()
}

fn default_frame_interval_ms() -> u64 {
    16
}

fn default_artist() -> String {
    "Toby Fox".to_string()
}

impl Config {
    /// Load `config.toml` from the platform config dir.  A missing file
    /// yields the defaults; nothing is written back.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        if !config_path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&config_path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
