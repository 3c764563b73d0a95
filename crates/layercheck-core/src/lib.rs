//! # LayerCheck Core
//!
//! Core types and utilities shared by every LayerCheck crate.
//! Provides the error taxonomy, the deposited-segment geometry model
//! and the generational free-list pool used for commands and scene bodies.

pub mod error;
pub mod geometry;
pub mod pool;

pub use error::{ConfigurationError, Error, ParseError, Result, UnsupportedCommandError};
pub use geometry::{toolpath_to_world, Segment, Vec3, UP};
pub use pool::{Pool, PoolKey, Reset};
