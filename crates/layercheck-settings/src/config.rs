//! Configuration management for LayerCheck
//!
//! Provides configuration file handling, defaults and validation.
//! Supports JSON and TOML file formats.
//!
//! Configuration is organized into logical sections:
//! - Toolpath source and command streaming
//! - Printer geometry (bead cross-section, layer height, bed size)
//! - Support sampling
//! - Stability evaluation timing and tolerances

use layercheck_core::{ConfigurationError, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Toolpath source and command streaming settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolpathSettings {
    /// Toolpath file to simulate
    pub source: Option<PathBuf>,
    /// Commands executed per assembler step before yielding to the caller
    pub commands_per_iteration: usize,
    /// Leading extruding moves demoted to travel moves (nozzle priming)
    pub priming_extrusions_to_skip: usize,
    /// First allocation batch of the command pool
    pub command_pool_batch: usize,
}

impl Default for ToolpathSettings {
    fn default() -> Self {
        Self {
            source: None,
            commands_per_iteration: 1,
            priming_extrusions_to_skip: 0,
            command_pool_batch: 100,
        }
    }
}

/// Printer and bead geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrinterSettings {
    /// Bead width in mm, usually the nozzle diameter
    pub extruder_width: f32,
    /// Layer height in mm (constant for the whole build)
    pub layer_height: f32,
    /// Two beads closer than this vertically share a layer (mm)
    pub layer_height_tolerance: f32,
    /// Extruding moves shorter than this deposit nothing (mm)
    pub minimum_extrusion_length: f32,
    /// Print bed extent along X (mm)
    pub bed_size_x: f32,
    /// Print bed extent along toolpath Y (mm)
    pub bed_size_y: f32,
    /// First allocation batch of the scene body pool
    pub line_pool_batch: usize,
}

impl Default for PrinterSettings {
    fn default() -> Self {
        Self {
            extruder_width: 0.2,
            layer_height: 0.12,
            layer_height_tolerance: 0.01,
            minimum_extrusion_length: 0.01,
            bed_size_x: 400.0,
            bed_size_y: 400.0,
            line_pool_batch: 10_000,
        }
    }
}

/// Support sampling settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupportSettings {
    /// Distance between support samples along a bead (mm)
    pub sampling_resolution: f32,
    /// Downward search distance as a multiple of the layer height
    pub search_factor: f32,
}

impl Default for SupportSettings {
    fn default() -> Self {
        Self {
            sampling_resolution: 0.05,
            search_factor: 1.1,
        }
    }
}

impl SupportSettings {
    /// How far below a bead to look for supporting material
    pub fn search_distance(&self, layer_height: f32) -> f32 {
        layer_height * self.search_factor
    }
}

/// Stability evaluation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilitySettings {
    /// Simulated seconds a released layer settles before it is judged
    pub settle_duration: f32,
    /// Maximum displacement a bead may show and still count as stable
    pub displacement_tolerance: f32,
    /// Extra simulated seconds to wait after a stable verdict
    pub post_settle_delay: f32,
    /// Fixed simulation timestep in seconds
    pub fixed_timestep: f32,
    /// Force at which an attachment joint breaks
    pub joint_break_force: f32,
    /// Torque at which an attachment joint breaks
    pub joint_break_torque: f32,
    /// Gravitational acceleration applied to released beads
    pub gravity: f32,
    /// Material density used to weigh beads
    pub material_density: f32,
}

impl Default for StabilitySettings {
    fn default() -> Self {
        Self {
            settle_duration: 0.1,
            displacement_tolerance: 0.01,
            post_settle_delay: 0.1,
            fixed_timestep: 0.02,
            joint_break_force: 1.0e6,
            joint_break_torque: 1.0e6,
            gravity: 9.81,
            material_density: 1.0,
        }
    }
}

/// Complete simulation configuration
///
/// Aggregates all settings sections and provides file I/O operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub toolpath: ToolpathSettings,
    pub printer: PrinterSettings,
    pub support: SupportSettings,
    pub stability: StabilitySettings,
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Default location of the user config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("layercheck").join("config.toml"))
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigurationError::LoadFailed {
                reason: format!("{}: {}", path.display(), e),
            }
        })?;

        let config: Self = match extension_of(path).as_str() {
            "json" => serde_json::from_str(&content).map_err(|e| {
                ConfigurationError::LoadFailed {
                    reason: format!("Invalid JSON config: {}", e),
                }
            })?,
            "toml" => toml::from_str(&content).map_err(|e| ConfigurationError::LoadFailed {
                reason: format!("Invalid TOML config: {}", e),
            })?,
            other => {
                return Err(ConfigurationError::UnsupportedFormat {
                    extension: other.to_string(),
                }
                .into())
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        self.validate()?;

        let content = match extension_of(path).as_str() {
            "json" => serde_json::to_string_pretty(self)
                .map_err(|e| Error::other(format!("Failed to serialize config: {}", e)))?,
            "toml" => toml::to_string_pretty(self)
                .map_err(|e| Error::other(format!("Failed to serialize config: {}", e)))?,
            other => {
                return Err(ConfigurationError::UnsupportedFormat {
                    extension: other.to_string(),
                }
                .into())
            }
        };

        std::fs::write(path, content)?;
        Ok(())
    }

    /// The toolpath to simulate, or a configuration error if none was given
    pub fn toolpath_source(&self) -> Result<&Path> {
        self.toolpath
            .source
            .as_deref()
            .ok_or_else(|| ConfigurationError::MissingToolpath.into())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.toolpath.commands_per_iteration == 0 {
            return Err(invalid("toolpath.commands_per_iteration", "must be > 0"));
        }
        if self.toolpath.command_pool_batch == 0 {
            return Err(invalid("toolpath.command_pool_batch", "must be > 0"));
        }
        if self.printer.line_pool_batch == 0 {
            return Err(invalid("printer.line_pool_batch", "must be > 0"));
        }

        let positive = [
            ("printer.extruder_width", self.printer.extruder_width),
            ("printer.layer_height", self.printer.layer_height),
            (
                "printer.layer_height_tolerance",
                self.printer.layer_height_tolerance,
            ),
            ("printer.bed_size_x", self.printer.bed_size_x),
            ("printer.bed_size_y", self.printer.bed_size_y),
            (
                "support.sampling_resolution",
                self.support.sampling_resolution,
            ),
            ("support.search_factor", self.support.search_factor),
            ("stability.settle_duration", self.stability.settle_duration),
            (
                "stability.displacement_tolerance",
                self.stability.displacement_tolerance,
            ),
            ("stability.fixed_timestep", self.stability.fixed_timestep),
            ("stability.joint_break_force", self.stability.joint_break_force),
            (
                "stability.joint_break_torque",
                self.stability.joint_break_torque,
            ),
            ("stability.material_density", self.stability.material_density),
        ];
        for (key, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(invalid(key, format!("must be a finite value > 0, got {}", value)));
            }
        }

        let non_negative = [
            (
                "printer.minimum_extrusion_length",
                self.printer.minimum_extrusion_length,
            ),
            ("stability.post_settle_delay", self.stability.post_settle_delay),
            ("stability.gravity", self.stability.gravity),
        ];
        for (key, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(key, format!("must be a finite value >= 0, got {}", value)));
            }
        }

        if self.printer.layer_height_tolerance > self.printer.layer_height {
            return Err(invalid(
                "printer.layer_height_tolerance",
                "must not exceed printer.layer_height",
            ));
        }

        Ok(())
    }
}

fn invalid(key: &str, reason: impl Into<String>) -> Error {
    ConfigurationError::invalid(key, reason).into()
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.toolpath.commands_per_iteration, 1);
        assert_eq!(config.printer.layer_height, 0.12);
        assert_eq!(config.stability.settle_duration, 0.1);
    }

    #[test]
    fn test_missing_toolpath_is_configuration_error() {
        let config = Config::default();
        let err = config.toolpath_source().unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_rejects_non_positive_layer_height() {
        let mut config = Config::default();
        config.printer.layer_height = 0.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("printer.layer_height"));
    }

    #[test]
    fn test_rejects_zero_commands_per_iteration() {
        let mut config = Config::default();
        config.toolpath.commands_per_iteration = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_tolerance_above_layer_height() {
        let mut config = Config::default();
        config.printer.layer_height_tolerance = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_search_distance() {
        let support = SupportSettings::default();
        assert!((support.search_distance(0.2) - 0.22).abs() < 1e-6);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str("[printer]\nlayer_height = 0.2\n").unwrap();
        assert_eq!(config.printer.layer_height, 0.2);
        assert_eq!(config.printer.extruder_width, 0.2);
        assert_eq!(config.support, SupportSettings::default());
    }
}
