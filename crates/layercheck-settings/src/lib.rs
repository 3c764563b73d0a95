//! LayerCheck Settings Crate
//!
//! Handles simulation configuration: defaults, file persistence and validation.

pub mod config;

pub use config::{Config, PrinterSettings, StabilitySettings, SupportSettings, ToolpathSettings};
