//! Application configuration, loaded from a TOML file with sensible
//! defaults for a stock 1220x610 machine.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Pathing used when rastering an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum RasterMode {
    Forward,
    Reverse,
    #[default]
    Bidirectional,
}

// An unrecognized mode is not worth refusing to start over; warn and
// engrave bidirectionally.
impl<'de> Deserialize<'de> for RasterMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(match s.as_str() {
            "Forward" => RasterMode::Forward,
            "Reverse" => RasterMode::Reverse,
            "Bidirectional" => RasterMode::Bidirectional,
            other => {
                tracing::warn!(mode = other, "unknown raster mode, using Bidirectional");
                RasterMode::Bidirectional
            }
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Port the HTTP API listens on.
    pub network_port: u16,
    /// Serial device of the driveboard; empty means not configured.
    pub serial_port: String,
    pub baudrate: u32,
    /// Machine work area in mm, [x, y, z].
    pub workspace: [f64; 3],
    /// Default rate to a pass's first vertex, mm/min.
    pub seekrate: f64,
    /// Default rate through remaining vertices, mm/min.
    pub feedrate: f64,
    /// Default beam size for rastering, mm.
    pub pxsize: f64,
    /// Test pulse intensity, percent.
    pub pulse_intensity: f64,
    /// Test pulse duration, seconds.
    pub pulse_duration: f64,
    /// Engrave light-on-dark materials (slate, black marble).
    pub raster_invert: bool,
    /// Dithering levels, 2 (pure on/off) to 128 (smooth).
    pub raster_levels: u8,
    pub raster_mode: RasterMode,
    /// Travel before/after an engrave segment to reach stable speed, mm.
    pub raster_leadin: f64,
    /// Spindle RPM that maps to 100% intensity in mill jobs.
    pub mill_max_rpm: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network_port: 4444,
            serial_port: String::new(),
            baudrate: 57_600,
            workspace: [1220.0, 610.0, 0.0],
            seekrate: 6000.0,
            feedrate: 2000.0,
            pxsize: 0.2,
            pulse_intensity: 10.0,
            pulse_duration: 0.1,
            raster_invert: false,
            raster_levels: 128,
            raster_mode: RasterMode::default(),
            raster_leadin: 10.0,
            mill_max_rpm: 18_000.0,
        }
    }
}

impl Config {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        let cfg: Config = toml::from_str(&text)?;
        Ok(cfg)
    }
}
