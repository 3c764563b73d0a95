//! Stability evaluation
//!
//! A freshly completed layer is released onto the pinned layer below it and
//! left to settle for a fixed amount of simulated time. Any bead that moved
//! further than the displacement tolerance in that time fails the layer.
//! Evaluation is driven by [`StabilityEvaluator::tick`], which the caller
//! invokes once per simulation step. Simulated time is accumulated in whole
//! microseconds, so a verdict never arrives before the settle duration has
//! fully elapsed.

use std::time::Duration;

use layercheck_core::{Error, Result, Segment, Vec3};
use layercheck_settings::Config;
use serde::Serialize;
use tracing::{debug, warn};

use crate::layer::{Layer, PlacedSegment};
use crate::scene::{BodyHandle, JointLimits, Scene};

/// Convert simulated seconds to a whole number of microseconds
fn simulated(seconds: f32) -> Duration {
    Duration::from_micros((f64::from(seconds.max(0.0)) * 1.0e6).round() as u64)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluatorSettings {
    pub settle_duration: f32,
    pub displacement_tolerance: f32,
    pub post_settle_delay: f32,
    pub joint_limits: JointLimits,
}

impl EvaluatorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            settle_duration: config.stability.settle_duration,
            displacement_tolerance: config.stability.displacement_tolerance,
            post_settle_delay: config.stability.post_settle_delay,
            joint_limits: JointLimits {
                break_force: config.stability.joint_break_force,
                break_torque: config.stability.joint_break_torque,
            },
        }
    }
}

impl Default for EvaluatorSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// A bead that moved too far while its layer settled
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FailedSegment {
    pub body: BodyHandle,
    pub segment: Segment,
    pub displacement: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum StabilityOutcome {
    Stable,
    Failed { segments: Vec<FailedSegment> },
}

impl StabilityOutcome {
    pub fn is_stable(&self) -> bool {
        matches!(self, Self::Stable)
    }
}

/// Where the evaluator is in its cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EvaluatorState {
    Idle,
    /// The test layer is settling
    Running { layer: usize, elapsed: Duration },
    /// Stable verdict reached, waiting out the post-settle delay
    Settling { layer: usize, remaining: Duration },
    /// Failed verdict reached, waiting for acknowledgement
    Held { layer: usize },
}

/// What a single [`StabilityEvaluator::tick`] produced
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    Idle,
    Running,
    Held,
    Completed(StabilityOutcome),
}

#[derive(Debug)]
pub struct StabilityEvaluator {
    settings: EvaluatorSettings,
    state: EvaluatorState,
    trial: Vec<(PlacedSegment, Vec3)>,
}

impl StabilityEvaluator {
    pub fn new(settings: EvaluatorSettings) -> Self {
        Self {
            settings,
            state: EvaluatorState::Idle,
            trial: Vec::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(EvaluatorSettings::from_config(config))
    }

    pub fn state(&self) -> EvaluatorState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == EvaluatorState::Idle
    }

    /// Pin `bottom` and release `test` onto it
    pub fn begin<S: Scene + ?Sized>(
        &mut self,
        bottom: &Layer,
        test: &Layer,
        scene: &mut S,
    ) -> Result<()> {
        if !self.is_idle() {
            return Err(Error::other(format!(
                "Cannot evaluate layer {} while in state {:?}",
                test.id(),
                self.state
            )));
        }

        for body in bottom.bodies() {
            scene.set_kinematic(body, true);
            scene.set_gravity(body, false);
        }

        self.trial.clear();
        for placed in test.segments() {
            let start = scene
                .current_position(placed.body)
                .unwrap_or_else(|| placed.segment.center());
            self.trial.push((*placed, start));
        }
        let segments = test.segments();
        for (i, a) in segments.iter().enumerate() {
            for b in &segments[i + 1..] {
                if overlaps(&a.segment, &b.segment) {
                    scene.ignore_collision(a.body, b.body);
                }
            }
        }
        for edge in test.attachments() {
            scene.attach(edge.segment, edge.support, self.settings.joint_limits);
        }
        for body in test.bodies() {
            scene.set_kinematic(body, false);
            scene.set_gravity(body, true);
        }

        debug!(
            "Evaluating layer {} ({} segments, {} attachments) on layer {}",
            test.id(),
            test.len(),
            test.attachments().len(),
            bottom.id()
        );
        self.state = EvaluatorState::Running {
            layer: test.id(),
            elapsed: Duration::ZERO,
        };
        Ok(())
    }

    /// Advance the evaluation clock by `dt` simulated seconds
    pub fn tick<S: Scene + ?Sized>(&mut self, dt: f32, scene: &mut S) -> Progress {
        match self.state {
            EvaluatorState::Idle => Progress::Idle,
            EvaluatorState::Held { .. } => Progress::Held,
            EvaluatorState::Running { layer, elapsed } => {
                let elapsed = elapsed + simulated(dt);
                if elapsed < simulated(self.settings.settle_duration) {
                    self.state = EvaluatorState::Running { layer, elapsed };
                    return Progress::Running;
                }

                let outcome = self.evaluate(layer, scene);
                if !outcome.is_stable() {
                    self.state = EvaluatorState::Held { layer };
                    return Progress::Completed(outcome);
                }
                let remaining = simulated(self.settings.post_settle_delay);
                if remaining.is_zero() {
                    self.state = EvaluatorState::Idle;
                    return Progress::Completed(outcome);
                }
                self.state = EvaluatorState::Settling { layer, remaining };
                Progress::Running
            }
            EvaluatorState::Settling { layer, remaining } => {
                let remaining = remaining.saturating_sub(simulated(dt));
                if !remaining.is_zero() {
                    self.state = EvaluatorState::Settling { layer, remaining };
                    return Progress::Running;
                }
                self.state = EvaluatorState::Idle;
                debug!("Layer {} is stable", layer);
                Progress::Completed(StabilityOutcome::Stable)
            }
        }
    }

    /// Clear a failed verdict so the next layer can be evaluated
    ///
    /// Returns `false` if there was no failure to acknowledge.
    pub fn acknowledge(&mut self) -> bool {
        if let EvaluatorState::Held { layer } = self.state {
            debug!("Failure of layer {} acknowledged", layer);
            self.state = EvaluatorState::Idle;
            true
        } else {
            false
        }
    }

    fn evaluate<S: Scene + ?Sized>(&mut self, layer: usize, scene: &mut S) -> StabilityOutcome {
        let mut failed = Vec::new();
        for (placed, start) in self.trial.drain(..) {
            let position = scene.current_position(placed.body).unwrap_or(start);
            let displacement = start.distance(position);
            // Freeze the layer so it can act as the next layer's floor
            scene.set_kinematic(placed.body, true);

            if displacement > self.settings.displacement_tolerance {
                scene.mark_failed(placed.body);
                failed.push(FailedSegment {
                    body: placed.body,
                    segment: placed.segment,
                    displacement,
                });
            }
        }

        if failed.is_empty() {
            return StabilityOutcome::Stable;
        }
        warn!("Layer {} failed: {} segments moved", layer, failed.len());
        for segment in &failed {
            warn!(
                "  {} from {} to {} moved {:.4}",
                segment.body, segment.segment.start, segment.segment.end, segment.displacement
            );
        }
        StabilityOutcome::Failed { segments: failed }
    }
}

/// Whether two beads of one layer are close enough to touch
fn overlaps(a: &Segment, b: &Segment) -> bool {
    a.center().distance(b.center()) <= a.length() + b.length()
}
