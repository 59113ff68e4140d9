// Settings management and persistence
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::assets::DEFAULT_EXTENSIONS;

/// Output device settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Open the platform audio device when available
    pub prefer_device: bool,
    /// Rate used by the headless clock
    pub sample_rate: u32,
    pub channels: u16,
    /// Frames rendered per headless tick
    pub block_frames: usize,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            prefer_device: true,
            sample_rate: 44100,
            channels: 2,
            block_frames: 512,
        }
    }
}

/// Main player settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerSettings {
    pub version: i32, // Settings schema version for future migrations
    /// Directory holding bundled sounds for `play_named`
    pub asset_dir: PathBuf,
    /// Extensions tried, in order, for identifiers without one
    pub asset_extensions: Vec<String>,
    /// Initial primary volume (0.0 - 1.0)
    pub default_volume: f32,
    /// Resume players paused by an audio session interruption once it ends
    pub resume_after_interruption: bool,
    pub output: OutputSettings,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            version: 1,
            asset_dir: PathBuf::from("sounds"),
            asset_extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            default_volume: 1.0,
            resume_after_interruption: false,
            output: OutputSettings::default(),
        }
    }
}

impl PlayerSettings {
    /// Get the settings file path
    pub fn get_settings_path(app_dir: &Path) -> PathBuf {
        app_dir.join("settings.json")
    }

    /// Load settings from file, or return defaults if file doesn't exist
    pub fn load(app_dir: &Path) -> Result<Self> {
        let path = Self::get_settings_path(app_dir);

        if !path.exists() {
            info!("No settings file at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read settings file {:?}", path))?;
        let settings: PlayerSettings = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings file {:?}", path))?;

        info!("Loaded settings from {:?}", path);
        Ok(settings.sanitized())
    }

    /// Save settings to file
    pub fn save(&self, app_dir: &Path) -> Result<()> {
        fs::create_dir_all(app_dir)
            .with_context(|| format!("Failed to create settings directory {:?}", app_dir))?;

        let path = Self::get_settings_path(app_dir);
        let content = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        fs::write(&path, content).with_context(|| format!("Failed to write settings file {:?}", path))?;

        info!("Saved settings to {:?}", path);
        Ok(())
    }

    /// Clamp values a hand-edited file may have pushed out of range
    fn sanitized(mut self) -> Self {
        self.default_volume = if self.default_volume.is_nan() {
            1.0
        } else {
            self.default_volume.clamp(0.0, 1.0)
        };
        self.output.channels = self.output.channels.max(1);
        self.output.sample_rate = self.output.sample_rate.max(1);
        self.output.block_frames = self.output.block_frames.max(1);
        self
    }
}
