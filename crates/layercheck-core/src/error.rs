//! Error handling for LayerCheck
//!
//! Provides the error types for every stage of the build pipeline:
//! - Configuration errors (missing toolpath, invalid options)
//! - Parse errors (malformed move commands)
//! - Unsupported command errors (executor invariant violations)
//!
//! Running out of toolpath and a layer failing its stability check are not
//! errors; they are reported as ordinary values by the simulation crate.
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Configuration error type
///
/// Raised while assembling the pipeline. Always fatal to initialization.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    /// No toolpath source was supplied
    #[error("No toolpath source configured")]
    MissingToolpath,

    /// An option has a value outside its valid range
    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue {
        /// The option name.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// The configuration file could not be read or decoded
    #[error("Failed to load configuration: {reason}")]
    LoadFailed {
        /// The reason the load failed.
        reason: String,
    },

    /// The configuration file has an extension we cannot handle
    #[error("Config file must be .json or .toml, got '{extension}'")]
    UnsupportedFormat {
        /// The file extension that was found.
        extension: String,
    },
}

impl ConfigurationError {
    /// Shorthand for [`ConfigurationError::InvalidValue`]
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Toolpath parse error
///
/// A recognized move line carried an axis word whose value is not a number.
/// The whole toolpath is rejected; there is no partial recovery.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Invalid value for axis {axis} at line {line_number}: '{token}'")]
pub struct ParseError {
    /// 1-based line number in the toolpath text.
    pub line_number: usize,
    /// Axis letter (X, Y, Z or E).
    pub axis: char,
    /// The full offending token, e.g. `X1O.5`.
    pub token: String,
}

/// A command reached the executor that it does not know how to run
///
/// Only a released (neutral) pooled command can trigger this, so seeing it
/// means the pool contract was broken somewhere upstream.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Toolpath executor does not support command {command}")]
pub struct UnsupportedCommandError {
    /// Debug rendering of the rejected command.
    pub command: String,
}

/// Main error type for LayerCheck
///
/// A unified error type that can represent any error from all stages.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Toolpath parse error
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Executor invariant violation
    #[error(transparent)]
    UnsupportedCommand(#[from] UnsupportedCommandError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a configuration error
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }

    /// Check if this is a parse error
    pub fn is_parse_error(&self) -> bool {
        matches!(self, Error::Parse(_))
    }

    /// Check if this is an unsupported command error
    pub fn is_unsupported_command(&self) -> bool {
        matches!(self, Error::UnsupportedCommand(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
