//! Serial port backend for RS-232/USB-serial force sensors
//!
//! Wraps the `serialport` crate behind [`ByteChannel`]. The port is opened
//! with the standard 8N1 settings the sensor firmware uses; line framing is
//! done here with a small pending buffer, so `bytes_available` reports both
//! bytes already pulled off the device and bytes still in the OS buffer.

use crate::error::{AppResult, DaqError};
use crate::hardware::channel::{ByteChannel, PortOpener};
use std::time::Duration;

#[cfg(feature = "instrument_serial")]
use serialport::{ClearBuffer, SerialPort};
#[cfg(feature = "instrument_serial")]
use std::io::{Read, Write};
#[cfg(feature = "instrument_serial")]
use std::time::Instant;
#[cfg(feature = "instrument_serial")]
use tracing::debug;

/// Serial channel backed by the `serialport` crate.
#[cfg(feature = "instrument_serial")]
pub struct SerialChannel {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    port_name: String,

    /// Baud rate (e.g., 9600, 115200)
    baud_rate: u32,

    /// Per-line read timeout
    timeout: Duration,

    /// Open port, `None` while closed
    port: Option<Box<dyn SerialPort>>,

    /// Bytes read from the device but not yet returned as a line
    pending: Vec<u8>,
}

#[cfg(feature = "instrument_serial")]
impl SerialChannel {
    /// Open a serial channel immediately.
    pub fn open_new(port_name: &str, baud_rate: u32, timeout: Duration) -> AppResult<Self> {
        let mut channel = Self {
            port_name: port_name.to_string(),
            baud_rate,
            timeout,
            port: None,
            pending: Vec::new(),
        };
        channel.open()?;
        Ok(channel)
    }

    fn port_mut(&mut self) -> AppResult<&mut Box<dyn SerialPort>> {
        self.port.as_mut().ok_or(DaqError::NotConnected)
    }

    fn take_line(&mut self) -> Option<Vec<u8>> {
        let end = self.pending.iter().position(|b| *b == b'\n')?;
        Some(self.pending.drain(..=end).collect())
    }
}

#[cfg(feature = "instrument_serial")]
impl ByteChannel for SerialChannel {
    fn open(&mut self) -> AppResult<()> {
        if self.port.is_some() {
            return Ok(());
        }

        let port = serialport::new(&self.port_name, self.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(self.timeout)
            .open()
            .map_err(|e| DaqError::Connection {
                port: self.port_name.clone(),
                baud_rate: self.baud_rate,
                reason: e.to_string(),
            })?;

        debug!(port = %self.port_name, baud_rate = self.baud_rate, "Serial port opened");
        self.port = Some(port);
        self.pending.clear();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn bytes_available(&mut self) -> AppResult<usize> {
        let pending = self.pending.len();
        let queued = self
            .port_mut()?
            .bytes_to_read()
            .map_err(std::io::Error::from)?;
        Ok(pending + queued as usize)
    }

    fn read_line(&mut self) -> AppResult<Vec<u8>> {
        let start = Instant::now();
        let mut chunk = [0u8; 256];

        loop {
            if let Some(line) = self.take_line() {
                return Ok(line);
            }

            if start.elapsed() > self.timeout {
                // Drop the partial line; the sensor will resend a whole frame
                self.pending.clear();
                return Err(DaqError::ReadTimeout);
            }

            let read = self.port_mut()?.read(&mut chunk);
            match read {
                Ok(0) => {
                    return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
                }
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn write(&mut self, bytes: &[u8]) -> AppResult<()> {
        let port = self.port_mut()?;
        port.write_all(bytes)?;
        port.flush()?;
        Ok(())
    }

    fn reset_input_buffer(&mut self) -> AppResult<()> {
        self.pending.clear();
        self.port_mut()?
            .clear(ClearBuffer::Input)
            .map_err(std::io::Error::from)?;
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            debug!(port = %self.port_name, "Serial port closed");
        }
        self.pending.clear();
    }

    fn describe(&self) -> String {
        format!("{}@{}", self.port_name, self.baud_rate)
    }
}

/// [`PortOpener`] for real serial hardware.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialOpener;

impl PortOpener for SerialOpener {
    #[cfg(feature = "instrument_serial")]
    fn open(
        &self,
        port: &str,
        baud_rate: u32,
        timeout: Duration,
    ) -> AppResult<Box<dyn ByteChannel>> {
        Ok(Box::new(SerialChannel::open_new(port, baud_rate, timeout)?))
    }

    #[cfg(not(feature = "instrument_serial"))]
    fn open(
        &self,
        _port: &str,
        _baud_rate: u32,
        _timeout: Duration,
    ) -> AppResult<Box<dyn ByteChannel>> {
        Err(DaqError::SerialFeatureDisabled)
    }

    fn available_ports(&self) -> Vec<String> {
        list_serial_ports()
    }
}

/// Names of the serial ports currently visible to the OS.
#[cfg(feature = "instrument_serial")]
pub fn list_serial_ports() -> Vec<String> {
    match serialport::available_ports() {
        Ok(ports) => ports.into_iter().map(|p| p.port_name).collect(),
        Err(e) => {
            debug!(error = %e, "Serial port enumeration failed");
            Vec::new()
        }
    }
}

/// Names of the serial ports currently visible to the OS.
#[cfg(not(feature = "instrument_serial"))]
pub fn list_serial_ports() -> Vec<String> {
    Vec::new()
}
