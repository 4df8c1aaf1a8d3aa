use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid renderer config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerPreference {
    #[default]
    HighPerformance,
    LowPower,
}

impl From<PowerPreference> for wgpu::PowerPreference {
    fn from(preference: PowerPreference) -> Self {
        match preference {
            PowerPreference::HighPerformance => wgpu::PowerPreference::HighPerformance,
            PowerPreference::LowPower => wgpu::PowerPreference::LowPower,
        }
    }
}

/// Start-up options of a renderer instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Background colour (RGBA, 0..1) for idle frames and letterbox bars
    pub clear_color: [f64; 4],

    pub power_preference: PowerPreference,

    /// Frames queued in the presentation chain; never below 2
    pub frame_latency: u32,

    /// Letterbox planes to their physical aspect ratio instead of stretching
    pub preserve_aspect: bool,

    /// Accept a software adapter for headless targets. Windowed devices
    /// always require hardware.
    pub allow_software_adapter: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            clear_color: [0.1, 0.2, 0.3, 1.0],
            power_preference: PowerPreference::HighPerformance,
            frame_latency: 2,
            preserve_aspect: true,
            allow_software_adapter: false,
        }
    }
}

impl RendererConfig {
    pub fn from_yaml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(source)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_yaml_str(&fs::read_to_string(path.as_ref())?)
    }

    pub fn frame_latency(&self) -> u32 {
        self.frame_latency.max(2)
    }

    pub fn clear_color(&self) -> wgpu::Color {
        let [r, g, b, a] = self.clear_color;
        wgpu::Color { r, g, b, a }
    }
}
