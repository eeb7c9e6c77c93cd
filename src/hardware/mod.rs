//! Transport layer between the acquisition worker and the sensor.
//!
//! - [`channel`]: the [`ByteChannel`] / [`PortOpener`] traits
//! - [`serial`]: `serialport` backend (feature `instrument_serial`)
//! - [`mock`]: in-memory backend for tests and demos
pub mod channel;
pub mod mock;
pub mod serial;

pub use channel::{ByteChannel, PortOpener};
pub use mock::{MockChannel, MockOpener, MockSensor};
pub use serial::{list_serial_ports, SerialOpener};
