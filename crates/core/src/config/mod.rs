use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Result, VisualiserError};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub render: RenderConfig,
}

impl AppConfig {
    /// Reads a JSON configuration file. Missing fields fall back to their
    /// defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|err| VisualiserError::InvalidConfig(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.audio.validate()?;
        self.render.validate()
    }
}

/// How raw spectrum magnitudes are presented in an [`AudioFrame`](crate::AudioFrame).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpectrumScale {
    /// Decibels mapped linearly onto `[0, 255]`.
    Decibel,
    /// Smoothed magnitude normalised by the FFT size.
    Linear,
}

/// Configuration specific to the audio subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Input device name. `None` selects the host default.
    pub device: Option<String>,
    /// Samples per analysis block; one frame is emitted per block.
    pub block_size: usize,
    /// FFT window length, a power of two no smaller than `block_size`.
    pub fft_size: usize,
    pub scale: SpectrumScale,
    pub min_decibels: f32,
    pub max_decibels: f32,
    /// Time smoothing between consecutive spectra, in `[0, 1)`.
    pub smoothing: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            block_size: 512,
            fft_size: 1024,
            scale: SpectrumScale::Decibel,
            min_decibels: -100.0,
            max_decibels: -30.0,
            smoothing: 0.8,
        }
    }
}

impl AudioConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.fft_size.is_power_of_two() || self.fft_size < 32 {
            return Err(VisualiserError::InvalidConfig(format!(
                "fft_size must be a power of two of at least 32, got {}",
                self.fft_size
            )));
        }
        if self.block_size == 0 || self.block_size > self.fft_size {
            return Err(VisualiserError::InvalidConfig(format!(
                "block_size must be between 1 and fft_size ({}), got {}",
                self.fft_size, self.block_size
            )));
        }
        if !(self.min_decibels < self.max_decibels) {
            return Err(VisualiserError::InvalidConfig(format!(
                "min_decibels ({}) must be below max_decibels ({})",
                self.min_decibels, self.max_decibels
            )));
        }
        if !(0.0..1.0).contains(&self.smoothing) {
            return Err(VisualiserError::InvalidConfig(format!(
                "smoothing must be in [0, 1), got {}",
                self.smoothing
            )));
        }
        Ok(())
    }
}

/// Configuration of the render loop driven by the command line host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub fps: u32,
    /// How often the script file is checked for modifications.
    pub reload_interval_ms: u64,
    /// How often object transforms are written to the log.
    pub report_interval_ms: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            fps: 60,
            reload_interval_ms: 500,
            report_interval_ms: 1000,
        }
    }
}

impl RenderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.fps == 0 || self.fps > 1000 {
            return Err(VisualiserError::InvalidConfig(format!(
                "fps must be between 1 and 1000, got {}",
                self.fps
            )));
        }
        Ok(())
    }
}
