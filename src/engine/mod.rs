//! Acquisition engine: command queue, polling worker and sample sinks.
pub mod acquisition;
pub mod commands;
pub mod sink;

pub use acquisition::{AcquisitionEngine, AcquisitionWorker, EngineState, TickReport};
pub use commands::{CommandQueue, CommandTicket, ConnectionStatus, SensorCommand};
pub use sink::{BroadcastSink, ForceSample, SampleSink};
