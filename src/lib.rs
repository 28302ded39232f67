pub mod capture;
pub mod error;
pub mod pacing;
pub mod pipeline;
pub mod utils;

use std::path::Path;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

pub use capture::{Frame, FrameMetadata, PixelFormat};
pub use error::{PacerError, Result};
pub use pacing::{CaptureOutcome, FramePacer, PacerThread, PtsPolicy, SkipReason};
pub use pipeline::{ChannelSet, FrameSlot};

/// Global configuration that can be atomically swapped at runtime
pub static CONFIG: once_cell::sync::Lazy<ArcSwap<Config>> =
    once_cell::sync::Lazy::new(|| ArcSwap::from_pointee(Config::default()));

/// System configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub pacing: PacingConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Largest expected output size; sizes the readback buffer up front
    pub output_width: u32,
    pub output_height: u32,
    /// Viewports smaller than this on either side are not captured
    pub min_dimension: u32,
    pub pixel_format: PixelFormat,
    /// Consult the rate-control gate before every capture
    pub rate_control: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    pub target_fps: u32,
    /// Share of `target_fps` that must be delivered even when idle
    pub minimum_rate_fraction: f64,
    pub pts_policy: PtsPolicy,
    /// Pin the pacer thread to this core id
    pub pacer_core: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Output channels; channel 0 is primary
    pub channels: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            output_width: 1280,
            output_height: 720,
            min_dimension: 16,
            pixel_format: PixelFormat::Rgba,
            rate_control: false,
        }
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            target_fps: 30,
            minimum_rate_fraction: 0.8, // keep at least 80% of the target rate
            pts_policy: PtsPolicy::Elapsed,
            pacer_core: None,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { channels: 1 }
    }
}

impl Config {
    /// Defaults, overridden by an optional TOML file, then `FRAMEPACE__*`
    /// env vars (e.g. `FRAMEPACE__PACING__TARGET_FPS=60`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        let config: Config = builder
            .add_source(
                config::Environment::with_prefix("FRAMEPACE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pacing.target_fps == 0 {
            return Err(PacerError::InvalidConfig("target_fps must be positive".into()));
        }
        let fraction = self.pacing.minimum_rate_fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(PacerError::InvalidConfig(format!(
                "minimum_rate_fraction {} outside (0, 1]",
                fraction
            )));
        }
        if self.pipeline.channels == 0 {
            return Err(PacerError::InvalidConfig("at least one channel required".into()));
        }
        if self.capture.output_width == 0 || self.capture.output_height == 0 {
            return Err(PacerError::InvalidConfig(format!(
                "output size {}x{} is empty",
                self.capture.output_width, self.capture.output_height
            )));
        }
        Ok(())
    }
}
