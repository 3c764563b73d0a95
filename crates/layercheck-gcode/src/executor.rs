//! Print-head state machine
//!
//! Consumes toolpath commands in file order, tracks where the nozzle is and
//! emits a [`Segment`] for every move that actually deposits material.

use layercheck_core::{toolpath_to_world, Result, Segment, UnsupportedCommandError, Vec3};
use layercheck_settings::Config;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::{Command, CommandStream, MoveCommand};

/// Distance mode of the print head
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Positioning {
    /// `G90`: axis words are target coordinates
    #[default]
    Absolute,
    /// `G91`: axis words are offsets from the current position
    Relative,
}

impl std::fmt::Display for Positioning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Absolute => write!(f, "Absolute positioning (G90)"),
            Self::Relative => write!(f, "Relative positioning (G91)"),
        }
    }
}

/// Print-head state, in world space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HeadState {
    pub position: Vec3,
    pub positioning: Positioning,
    /// Whether the move being processed deposits material
    pub extruding: bool,
}

/// Bead geometry and filtering used by the executor
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorSettings {
    pub extruder_width: f32,
    pub layer_height: f32,
    pub minimum_extrusion_length: f32,
    pub priming_extrusions_to_skip: usize,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ExecutorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            extruder_width: config.printer.extruder_width,
            layer_height: config.printer.layer_height,
            minimum_extrusion_length: config.printer.minimum_extrusion_length,
            priming_extrusions_to_skip: config.toolpath.priming_extrusions_to_skip,
        }
    }
}

/// Result of executing one command from the stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    /// The command deposited a bead
    Deposited(Segment),
    /// The command ran but deposited nothing
    Advanced,
    /// No commands are left
    Exhausted,
}

/// Executes toolpath commands against a simulated print head
#[derive(Debug)]
pub struct ToolpathExecutor {
    stream: CommandStream,
    head: HeadState,
    settings: ExecutorSettings,
    primes_skipped: usize,
    commands_executed: usize,
    segments_emitted: usize,
}

impl ToolpathExecutor {
    pub fn new(stream: CommandStream, settings: ExecutorSettings) -> Self {
        Self {
            stream,
            head: HeadState::default(),
            settings,
            primes_skipped: 0,
            commands_executed: 0,
            segments_emitted: 0,
        }
    }

    pub fn head(&self) -> &HeadState {
        &self.head
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    pub fn stream(&self) -> &CommandStream {
        &self.stream
    }

    pub fn is_exhausted(&self) -> bool {
        self.stream.is_exhausted()
    }

    pub fn commands_executed(&self) -> usize {
        self.commands_executed
    }

    pub fn segments_emitted(&self) -> usize {
        self.segments_emitted
    }

    /// Pull the next command from the stream and execute it
    pub fn step(&mut self) -> Result<Step> {
        self.skip_priming_extrusion();

        let Some(key) = self.stream.pop() else {
            return Ok(Step::Exhausted);
        };
        let command = self.stream.get(key).copied().unwrap_or_default();
        self.stream.release(key);

        Ok(match self.execute(&command)? {
            Some(segment) => Step::Deposited(segment),
            None => Step::Advanced,
        })
    }

    /// Execute a single command, returning the bead it deposited, if any
    pub fn execute(&mut self, command: &Command) -> Result<Option<Segment>> {
        self.commands_executed += 1;
        match command {
            Command::Home => {
                trace!("Homing from {}", self.head.position);
                self.head.position = Vec3::ZERO;
                Ok(None)
            }
            Command::SetAbsolutePositioning => {
                self.head.positioning = Positioning::Absolute;
                Ok(None)
            }
            Command::SetRelativePositioning => {
                self.head.positioning = Positioning::Relative;
                Ok(None)
            }
            Command::Move(mv) => Ok(self.move_head(mv)),
            Command::Unset => Err(UnsupportedCommandError {
                command: format!("{:?}", command),
            }
            .into()),
        }
    }

    fn move_head(&mut self, mv: &MoveCommand) -> Option<Segment> {
        let start = self.head.position;
        self.head.extruding = mv.is_extruding();

        let target = match self.head.positioning {
            Positioning::Relative => {
                start
                    + toolpath_to_world(
                        mv.x.unwrap_or(0.0),
                        mv.y.unwrap_or(0.0),
                        mv.z.unwrap_or(0.0),
                    )
            }
            Positioning::Absolute => {
                // Fill absent words from the current position, in toolpath space
                let current_y = start.z;
                let current_z = start.y;
                toolpath_to_world(
                    mv.x.unwrap_or(start.x),
                    mv.y.unwrap_or(current_y),
                    mv.z.unwrap_or(current_z),
                )
            }
        };

        let segment = (self.head.extruding
            && mv.has_position()
            && start.distance(target) >= self.settings.minimum_extrusion_length)
            .then(|| {
                Segment::new(
                    start,
                    target,
                    self.settings.extruder_width,
                    self.settings.layer_height,
                )
            });

        self.head.position = target;
        self.head.extruding = false;

        if segment.is_some() {
            self.segments_emitted += 1;
        }
        segment
    }

    fn skip_priming_extrusion(&mut self) {
        if self.primes_skipped >= self.settings.priming_extrusions_to_skip {
            return;
        }
        let Some(mv) = self.stream.peek_mut().and_then(Command::as_move_mut) else {
            return;
        };
        if mv.is_extruding() {
            mv.clear_extrusion();
            self.primes_skipped += 1;
            debug!(
                "Demoted priming extrusion {} of {} to a travel move",
                self.primes_skipped, self.settings.priming_extrusions_to_skip
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor(gcode: &str) -> ToolpathExecutor {
        ToolpathExecutor::new(
            CommandStream::parse(gcode).unwrap(),
            ExecutorSettings::default(),
        )
    }

    fn run(executor: &mut ToolpathExecutor) -> Vec<Segment> {
        let mut segments = Vec::new();
        loop {
            match executor.step().unwrap() {
                Step::Deposited(segment) => segments.push(segment),
                Step::Advanced => {}
                Step::Exhausted => return segments,
            }
        }
    }

    #[test]
    fn test_absolute_moves_emit_segments() {
        let mut exec = executor("G90\nG1 X10 Y0 Z0 E1\nG1 X20 Y0 Z0 E1");
        let segments = run(&mut exec);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].start, Vec3::ZERO);
        assert_eq!(segments[0].end, Vec3::new(10.0, 0.0, 0.0));
        assert_eq!(segments[1].start, Vec3::new(10.0, 0.0, 0.0));
        assert_eq!(segments[1].end, Vec3::new(20.0, 0.0, 0.0));
        assert_eq!(segments[0].width, 0.2);
        assert_eq!(segments[0].height, 0.12);
    }

    #[test]
    fn test_axes_are_swapped_into_world_space() {
        let mut exec = executor("G90\nG1 X1 Y2 Z3");
        run(&mut exec);
        assert_eq!(exec.head().position, Vec3::new(1.0, 3.0, 2.0));
    }

    #[test]
    fn test_absent_axes_unchanged_in_absolute_mode() {
        let mut exec = executor("G90\nG1 X1 Y2 Z3\nG1 X5");
        run(&mut exec);
        assert_eq!(exec.head().position, Vec3::new(5.0, 3.0, 2.0));
    }

    #[test]
    fn test_relative_moves_accumulate() {
        let mut exec = executor("G91\nG1 X1 Y1 Z0.2\nG1 X1\nG1 Y-3");
        run(&mut exec);
        let position = exec.head().position;
        assert!((position - Vec3::new(2.0, 0.2, -2.0)).length() < 1e-5);
        assert_eq!(exec.head().positioning, Positioning::Relative);
    }

    #[test]
    fn test_home_resets_position_without_segment() {
        let mut exec = executor("G90\nG1 X10 Y10 Z1 E1\nG91\nG1 X5 E1\nG28");
        let segments = run(&mut exec);
        assert_eq!(segments.len(), 2);
        assert_eq!(exec.head().position, Vec3::ZERO);
    }

    #[test]
    fn test_travel_moves_emit_nothing() {
        let mut exec = executor("G0 X10\nG1 X20 E0\nG1 X30 E-1");
        let segments = run(&mut exec);
        assert!(segments.is_empty());
        assert_eq!(exec.head().position.x, 30.0);
    }

    #[test]
    fn test_extrusion_without_position_emits_nothing() {
        let mut exec = executor("G1 E5\nG1 F1200 E1");
        assert!(run(&mut exec).is_empty());
    }

    #[test]
    fn test_short_extrusions_are_dropped() {
        let mut exec = executor("G1 X0.005 E1\nG1 X1 E1");
        let segments = run(&mut exec);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].start.x, 0.005);
    }

    #[test]
    fn test_mode_switches_emit_nothing() {
        let mut exec = executor("G90\nG91\nG90\nG1\nG91");
        assert!(run(&mut exec).is_empty());
        assert_eq!(exec.commands_executed(), 5);
        assert_eq!(exec.segments_emitted(), 0);
    }

    #[test]
    fn test_priming_extrusions_are_skipped() {
        let settings = ExecutorSettings {
            priming_extrusions_to_skip: 2,
            ..Default::default()
        };
        let stream = CommandStream::parse("G1 X5 E3\nG0 X0\nG1 X5 E3\nG1 X10 E1\nG1 X20 E1").unwrap();
        let mut exec = ToolpathExecutor::new(stream, settings);
        let segments = run(&mut exec);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].start.x, 5.0);
    }

    #[test]
    fn test_unset_command_is_rejected() {
        let mut exec = executor("");
        let err = exec.execute(&Command::Unset).unwrap_err();
        assert!(err.is_unsupported_command());
    }
}
