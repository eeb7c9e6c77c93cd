//! # Force DAQ Core Library
//!
//! Real-time acquisition engine for serial-attached 4-axis force sensors. A
//! dedicated worker thread polls the sensor, smooths each axis with its own
//! recursive filter, folds the four readings into one 3D load vector and keeps
//! a short history of recent samples. The `force_daq` binary is a thin CLI on
//! top of this library.
//!
//! ## Crate Structure
//!
//! - **`config`**: `Settings` loaded from TOML plus `FORCE_DAQ_*` environment
//!   overrides, with validation.
//! - **`data`**: frame parsing, the per-axis filter bank, zero calibration,
//!   force vector construction and the history buffer.
//! - **`engine`**: the command queue, the acquisition worker and sample sinks.
//! - **`error`**: the `DaqError` enum shared by the whole crate.
//! - **`hardware`**: the byte-channel abstraction with serial and mock backends.
//! - **`logging`**: `tracing-subscriber` initialization.

pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod hardware;
pub mod logging;

pub use config::Settings;
pub use engine::{AcquisitionEngine, BroadcastSink, EngineState};
pub use error::{AppResult, DaqError};
