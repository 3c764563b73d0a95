//! # LayerCheck
//!
//! Layer-by-layer structural simulator for extrusion toolpaths. A toolpath
//! is replayed bead by bead; every completed layer is dropped onto the one
//! below it in a physics scene and flagged if any of its beads move.
//!
//! ## Architecture
//!
//! LayerCheck is organized as a workspace with multiple crates:
//!
//! 1. **layercheck-core** - Error taxonomy, bead geometry, object pooling
//! 2. **layercheck-settings** - Configuration sections, file I/O, validation
//! 3. **layercheck-gcode** - Toolpath command streaming and print-head execution
//! 4. **layercheck-simulation** - Layer assembly, support analysis, stability evaluation
//! 5. **layercheck** - Command-line binary that integrates all crates

pub use layercheck_core::{
    ConfigurationError, Error, ParseError, Pool, PoolKey, Reset, Result, Segment,
    UnsupportedCommandError, Vec3,
};

pub use layercheck_settings::{
    Config, PrinterSettings, StabilitySettings, SupportSettings, ToolpathSettings,
};

pub use layercheck_gcode::{
    Command, CommandStream, ExecutorSettings, HeadState, MoveCommand, Positioning, Step,
    ToolpathExecutor,
};

pub use layercheck_simulation::{
    BodyHandle, BuildSimulation, BuildStatus, FailedSegment, GeometryBuilder, HeadlessScene,
    LayerAssembler, LayerReport, PhysicsProvider, Scene, StabilityEvaluator, StabilityOutcome,
};

use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Outcome of a whole build
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildSummary {
    pub toolpath: Option<PathBuf>,
    pub layers: usize,
    pub failed_layers: Vec<usize>,
    pub reports: Vec<LayerReport>,
}

impl BuildSummary {
    pub fn is_stable(&self) -> bool {
        self.failed_layers.is_empty()
    }
}

/// Simulate the toolpath named in `config` on the headless scene
///
/// Failed layers are acknowledged as they come so every layer gets a
/// verdict.
pub fn simulate(config: &Config) -> Result<BuildSummary> {
    let mut simulation = BuildSimulation::load(config)?;
    let mut scene = HeadlessScene::from_config(config);
    let reports = simulation
        .run(config.stability.fixed_timestep, &mut scene, true)?
        .to_vec();

    let failed_layers: Vec<usize> = reports
        .iter()
        .filter(|report| !report.outcome.is_stable())
        .map(|report| report.layer_id)
        .collect();
    info!(
        "Simulated {} layers, {} failed",
        reports.len(),
        failed_layers.len()
    );

    Ok(BuildSummary {
        toolpath: config.toolpath.source.clone(),
        layers: reports.len(),
        failed_layers,
        reports,
    })
}

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Pretty console output on stderr, keeping stdout for the report
/// - RUST_LOG environment variable support
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(tracing::Level::INFO.to_string()));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_line_number(true)
        .pretty();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
