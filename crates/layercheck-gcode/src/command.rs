//! Toolpath command types

use layercheck_core::{ParseError, Reset};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Axis words of a linear move
///
/// Each axis is `None` when the word was absent from the line, which means
/// "leave this coordinate unchanged". Values are in toolpath space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MoveCommand {
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub z: Option<f32>,
    pub e: Option<f32>,
}

impl MoveCommand {
    pub fn has_x(&self) -> bool {
        self.x.is_some()
    }

    pub fn has_y(&self) -> bool {
        self.y.is_some()
    }

    pub fn has_z(&self) -> bool {
        self.z.is_some()
    }

    pub fn has_e(&self) -> bool {
        self.e.is_some()
    }

    /// True if at least one positional axis is present
    pub fn has_position(&self) -> bool {
        self.has_x() || self.has_y() || self.has_z()
    }

    /// True if this move pushes filament out of the nozzle
    pub fn is_extruding(&self) -> bool {
        self.e.is_some_and(|e| e > 0.0)
    }

    /// Turn this move into a pure travel move
    pub fn clear_extrusion(&mut self) {
        self.e = None;
    }

    /// Parse the axis words of a `G0`/`G1` line
    ///
    /// `line` is the comment-free line including its command word. Words may
    /// appear in any order; words for axes other than X, Y, Z and E (feed
    /// rate and the like) are ignored.
    pub fn parse(line: &str, line_number: usize) -> Result<Self, ParseError> {
        let mut command = Self::default();
        for word in line.split_whitespace().skip(1) {
            let mut chars = word.chars();
            let Some(letter) = chars.next() else {
                continue;
            };
            let axis = letter.to_ascii_uppercase();
            let slot = match axis {
                'X' => &mut command.x,
                'Y' => &mut command.y,
                'Z' => &mut command.z,
                'E' => &mut command.e,
                _ => continue,
            };
            let value = chars.as_str().parse::<f32>().map_err(|_| ParseError {
                line_number,
                axis,
                token: word.to_string(),
            })?;
            *slot = Some(value);
        }
        Ok(command)
    }
}

/// A parsed toolpath command
///
/// `Unset` is the neutral state of a pooled command that is not in use. It
/// never comes out of a [`CommandStream`](crate::CommandStream), and the
/// executor rejects it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Command {
    #[default]
    Unset,
    /// `G28`
    Home,
    /// `G90`
    SetAbsolutePositioning,
    /// `G91`
    SetRelativePositioning,
    /// `G0` / `G1`
    Move(MoveCommand),
}

impl Command {
    pub fn as_move(&self) -> Option<&MoveCommand> {
        match self {
            Command::Move(mv) => Some(mv),
            _ => None,
        }
    }

    pub fn as_move_mut(&mut self) -> Option<&mut MoveCommand> {
        match self {
            Command::Move(mv) => Some(mv),
            _ => None,
        }
    }
}

impl Reset for Command {
    fn reset(&mut self) {
        *self = Command::Unset;
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => write!(f, "Unset"),
            Self::Home => write!(f, "G28"),
            Self::SetAbsolutePositioning => write!(f, "G90"),
            Self::SetRelativePositioning => write!(f, "G91"),
            Self::Move(mv) => {
                write!(f, "G1")?;
                for (letter, value) in [('X', mv.x), ('Y', mv.y), ('Z', mv.z), ('E', mv.e)] {
                    if let Some(value) = value {
                        write!(f, " {}{}", letter, value)?;
                    }
                }
                Ok(())
            }
        }
    }
}
