//! Duplex byte channel abstraction.
//!
//! The acquisition worker only talks to the sensor through [`ByteChannel`],
//! and only obtains channels through a [`PortOpener`]. This keeps the worker
//! independent of the transport: the `serialport` backend in
//! [`crate::hardware::serial`] is used in production, the in-memory channel in
//! [`crate::hardware::mock`] in tests and in the CLI's `--mock` mode.
//!
//! All methods are synchronous. Implementations must keep
//! [`ByteChannel::bytes_available`] non-blocking; the worker polls it before
//! every read to preserve its tick cadence.

use crate::error::AppResult;
use std::time::Duration;

/// An opened (or reopenable) connection to the sensor.
pub trait ByteChannel: Send {
    /// (Re)open the underlying device. No-op when already open.
    fn open(&mut self) -> AppResult<()>;

    /// Whether the device is currently open.
    fn is_open(&self) -> bool;

    /// Number of bytes that can be read without blocking.
    fn bytes_available(&mut self) -> AppResult<usize>;

    /// Read up to and including the next `\n`.
    ///
    /// May block for at most the channel's read timeout.
    fn read_line(&mut self) -> AppResult<Vec<u8>>;

    /// Write all bytes and flush them to the device.
    fn write(&mut self, bytes: &[u8]) -> AppResult<()>;

    /// Discard everything received but not yet read.
    fn reset_input_buffer(&mut self) -> AppResult<()>;

    /// Close the device. Further reads fail until [`ByteChannel::open`] is called.
    fn close(&mut self);

    /// Human-readable identifier for logging.
    fn describe(&self) -> String;
}

/// Factory that turns a port name into a [`ByteChannel`].
pub trait PortOpener: Send {
    /// Open `port` at `baud_rate` with the given per-line read timeout.
    ///
    /// # Errors
    ///
    /// [`crate::error::DaqError::Connection`] when the device cannot be opened.
    fn open(&self, port: &str, baud_rate: u32, timeout: Duration)
        -> AppResult<Box<dyn ByteChannel>>;

    /// Ports that could currently be opened, for diagnostics.
    fn available_ports(&self) -> Vec<String>;
}
