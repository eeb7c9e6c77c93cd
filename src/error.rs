//! Custom error types for the application.
//!
//! This module defines the primary error type, `DaqError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to
//! handle the different failure kinds of the acquisition engine.
//!
//! ## Error Hierarchy
//!
//! `DaqError` consolidates four families of failures:
//!
//! - **Transient line errors** (`Frame`, `Decode`, `Io`, `ReadTimeout`): a
//!   malformed or partially transmitted line. The acquisition loop discards
//!   the line and keeps going; these never reach a caller.
//! - **Connection errors** (`Connection`, `SerialFeatureDisabled`): a port could
//!   not be opened. The engine stays disconnected and logs a diagnostic.
//! - **Command errors** (`NotConnected`, `EngineStopped`): reported on the
//!   ticket of the specific command that failed.
//! - **Precondition errors** (`EmptyHistory`): returned directly to the caller.
//!
//! `Config` and `Configuration` cover loading and validating [`crate::config::Settings`].

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Reasons a raw sensor line is rejected by the frame parser.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FrameError {
    #[error("expected 4 axis tokens, found {0}")]
    TokenCount(usize),

    #[error("token {index} has tag '{found}', expected '{expected}'")]
    UnexpectedTag {
        index: usize,
        expected: &'static str,
        found: String,
    },

    #[error("token {index} has a non-numeric value '{value}'")]
    InvalidValue { index: usize, value: String },
}

#[derive(Error, Debug)]
pub enum DaqError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed frame: {0}")]
    Frame(#[from] FrameError),

    #[error("Line is not valid UTF-8: {0}")]
    Decode(#[from] std::str::Utf8Error),

    #[error("Serial read timed out before a line terminator arrived")]
    ReadTimeout,

    #[error("Failed to open '{port}' at {baud_rate} baud: {reason}")]
    Connection {
        port: String,
        baud_rate: u32,
        reason: String,
    },

    #[error("Serial port not connected")]
    NotConnected,

    #[error("Serial support not enabled. Rebuild with --features instrument_serial")]
    SerialFeatureDisabled,

    #[error("No force sample has been acquired yet")]
    EmptyHistory,

    #[error("Acquisition engine is not running")]
    EngineStopped,

    #[error("Acquisition engine was already started")]
    AlreadyStarted,

    #[error("Failed to spawn acquisition worker: {0}")]
    Spawn(std::io::Error),
}

impl DaqError {
    /// Returns `true` for per-line failures the acquisition loop may discard.
    ///
    /// Anything else seen while processing a line is still dropped, but logged
    /// as a warning so genuine defects stay visible.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DaqError::Frame(_) | DaqError::Decode(_) | DaqError::Io(_) | DaqError::ReadTimeout
        )
    }
}

impl From<figment::Error> for DaqError {
    fn from(value: figment::Error) -> Self {
        DaqError::Config(Box::new(value))
    }
}
