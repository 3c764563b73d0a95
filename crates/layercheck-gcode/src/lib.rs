//! # LayerCheck G-Code
//!
//! Toolpath interpretation for LayerCheck.
//! Includes the pooled command stream and the print-head state machine that
//! turns extruding moves into deposited segments.

pub mod command;
pub mod executor;
pub mod stream;

pub use command::{Command, MoveCommand};
pub use executor::{ExecutorSettings, HeadState, Positioning, Step, ToolpathExecutor};
pub use stream::CommandStream;
