//! Layer-by-layer build simulation
//!
//! Ties the assembler and the evaluator together: layers are fetched in
//! order, the first one is pinned to the bed, and every later layer is
//! evaluated against the one below it. A failed layer halts the build until
//! the failure is acknowledged.

use layercheck_core::{Error, Result};
use layercheck_gcode::CommandStream;
use layercheck_settings::Config;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::assembler::{Fetch, LayerAssembler};
use crate::scene::Scene;
use crate::stability::{Progress, StabilityEvaluator, StabilityOutcome};

/// Verdict for one layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerReport {
    pub layer_id: usize,
    pub segments: usize,
    pub attachments: usize,
    #[serde(flatten)]
    pub outcome: StabilityOutcome,
}

/// Result of one [`BuildSimulation::tick`]
#[derive(Debug, Clone, PartialEq)]
pub enum BuildStatus {
    /// Work is in progress; tick again
    Running,
    /// A layer received its verdict during this tick
    LayerEvaluated(LayerReport),
    /// The build is stopped on a failed layer
    Halted(usize),
    /// Every layer has been evaluated
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Fetching,
    Evaluating(usize),
    Halted(usize),
    Finished,
}

#[derive(Debug)]
pub struct BuildSimulation {
    assembler: LayerAssembler,
    evaluator: StabilityEvaluator,
    phase: Phase,
    next_layer: usize,
    reports: Vec<LayerReport>,
}

impl BuildSimulation {
    pub fn new(assembler: LayerAssembler, evaluator: StabilityEvaluator) -> Self {
        Self {
            assembler,
            evaluator,
            phase: Phase::Fetching,
            next_layer: 0,
            reports: Vec::new(),
        }
    }

    /// Set up a simulation of `toolpath` text
    pub fn from_config(config: &Config, toolpath: &str) -> Result<Self> {
        config.validate()?;
        let stream = CommandStream::with_pool_batch(toolpath, config.toolpath.command_pool_batch)?;
        Ok(Self::new(
            LayerAssembler::from_config(config, stream),
            StabilityEvaluator::from_config(config),
        ))
    }

    /// Set up a simulation of the toolpath file named in the config
    pub fn load(config: &Config) -> Result<Self> {
        let path = config.toolpath_source()?;
        info!("Loading toolpath {}", path.display());
        let toolpath = std::fs::read_to_string(path)?;
        Self::from_config(config, &toolpath)
    }

    pub fn assembler(&self) -> &LayerAssembler {
        &self.assembler
    }

    pub fn evaluator(&self) -> &StabilityEvaluator {
        &self.evaluator
    }

    /// Reports of every evaluated layer, in layer order
    pub fn reports(&self) -> &[LayerReport] {
        &self.reports
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }

    pub fn is_halted(&self) -> bool {
        matches!(self.phase, Phase::Halted(_))
    }

    /// Whether any evaluated layer failed
    pub fn has_failures(&self) -> bool {
        self.reports.iter().any(|report| !report.outcome.is_stable())
    }

    /// Advance the build by one simulation step of `dt` seconds
    ///
    /// The scene's physics is not stepped here; the caller steps it
    /// alongside.
    pub fn tick<S: Scene + ?Sized>(&mut self, dt: f32, scene: &mut S) -> Result<BuildStatus> {
        match self.phase {
            Phase::Finished => Ok(BuildStatus::Finished),
            Phase::Halted(id) => Ok(BuildStatus::Halted(id)),
            Phase::Evaluating(id) => match self.evaluator.tick(dt, scene) {
                Progress::Completed(outcome) => Ok(self.complete_layer(id, outcome, scene)),
                _ => Ok(BuildStatus::Running),
            },
            Phase::Fetching => match self.assembler.fetch_layer(self.next_layer, scene)? {
                Fetch::Pending => Ok(BuildStatus::Running),
                Fetch::EndOfModel => {
                    self.phase = Phase::Finished;
                    info!("Build finished after {} layers", self.reports.len());
                    Ok(BuildStatus::Finished)
                }
                Fetch::Ready(0) => Ok(self.pin_first_layer(scene)),
                Fetch::Ready(id) => {
                    let (Some(bottom), Some(test)) =
                        (self.assembler.layer(id - 1), self.assembler.layer(id))
                    else {
                        return Err(Error::other(format!(
                            "Layer {} or the layer below it is missing",
                            id
                        )));
                    };
                    self.evaluator.begin(bottom, test, scene)?;
                    self.phase = Phase::Evaluating(id);
                    Ok(BuildStatus::Running)
                }
            },
        }
    }

    /// Resume after a failed layer
    ///
    /// Returns `false` if the build was not halted.
    pub fn acknowledge_failure<S: Scene + ?Sized>(&mut self, scene: &mut S) -> bool {
        let Phase::Halted(id) = self.phase else {
            return false;
        };
        self.evaluator.acknowledge();
        self.assembler.retire(id - 1, scene);
        self.next_layer = id + 1;
        self.phase = Phase::Fetching;
        debug!("Resuming build after failed layer {}", id);
        true
    }

    /// Step the scene and the build until the toolpath is used up
    ///
    /// With `continue_after_failure` every failure is acknowledged as soon
    /// as it is reported; otherwise the run stops on the first failure.
    pub fn run<S: Scene + ?Sized>(
        &mut self,
        dt: f32,
        scene: &mut S,
        continue_after_failure: bool,
    ) -> Result<&[LayerReport]> {
        if dt <= 0.0 {
            return Err(Error::other(format!("Timestep must be positive, got {}", dt)));
        }
        loop {
            scene.step(dt);
            match self.tick(dt, scene)? {
                BuildStatus::Finished => break,
                BuildStatus::Halted(_) if continue_after_failure => {
                    self.acknowledge_failure(scene);
                }
                BuildStatus::Halted(_) => break,
                BuildStatus::Running | BuildStatus::LayerEvaluated(_) => {}
            }
        }
        Ok(&self.reports)
    }

    fn pin_first_layer<S: Scene + ?Sized>(&mut self, scene: &mut S) -> BuildStatus {
        let Some(layer) = self.assembler.layer(0) else {
            return BuildStatus::Running;
        };
        for body in layer.bodies() {
            scene.set_kinematic(body, true);
            scene.set_gravity(body, false);
        }
        let report = LayerReport {
            layer_id: 0,
            segments: layer.len(),
            attachments: 0,
            outcome: StabilityOutcome::Stable,
        };
        debug!("Pinned layer 0 ({} segments) to the bed", report.segments);
        self.reports.push(report.clone());
        self.next_layer = 1;
        BuildStatus::LayerEvaluated(report)
    }

    fn complete_layer<S: Scene + ?Sized>(
        &mut self,
        id: usize,
        outcome: StabilityOutcome,
        scene: &mut S,
    ) -> BuildStatus {
        let (segments, attachments) = self
            .assembler
            .layer(id)
            .map(|layer| (layer.len(), layer.attachments().len()))
            .unwrap_or_default();
        let report = LayerReport {
            layer_id: id,
            segments,
            attachments,
            outcome,
        };

        if report.outcome.is_stable() {
            self.assembler.retire(id - 1, scene);
            self.next_layer = id + 1;
            self.phase = Phase::Fetching;
        } else {
            warn!("Build halted on layer {}", id);
            self.phase = Phase::Halted(id);
        }
        self.reports.push(report.clone());
        BuildStatus::LayerEvaluated(report)
    }
}
