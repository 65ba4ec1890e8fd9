use crate::error::ConfigError;
use crate::inversion::{InversionSettings, DEFAULT_FABRY_PEROT_ITERATIONS};
use crate::math_tools::WindowKind;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings of one extraction run.
///
/// Missing fields of a config file fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Zero-padding factor of the FFT.
    pub upsampling: u32,
    /// Lower edge of the evaluated band in THz.
    pub freq_min: f64,
    /// Upper edge of the evaluated band in THz.
    pub freq_max: f64,
    /// Half-width of the time-domain window in samples.
    pub window_half_width: usize,
    pub window_kind: WindowKind,
    pub fabry_perot_iterations: usize,
    /// Measurement to evaluate, the first one of the container if `None`.
    pub measurement: Option<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        ExtractionConfig {
            upsampling: 3,
            freq_min: 0.2,
            freq_max: 3.0,
            window_half_width: 128,
            window_kind: WindowKind::AdaptedBlackman,
            fabry_perot_iterations: DEFAULT_FABRY_PEROT_ITERATIONS,
            measurement: None,
        }
    }
}

impl ExtractionConfig {
    /// Reads a config from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&text)?;
        log::debug!("loaded extraction config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn inversion_settings(&self) -> InversionSettings {
        InversionSettings {
            upsampling: self.upsampling,
            freq_min: self.freq_min,
            freq_max: self.freq_max,
            fabry_perot_iterations: self.fabry_perot_iterations,
        }
    }
}
