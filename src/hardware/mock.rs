//! Mock Hardware Implementations
//!
//! In-memory stand-ins for the serial link, for testing without a sensor
//! attached and for the CLI's `--mock` mode.
//!
//! # Architecture
//!
//! A [`MockChannel`] (handed to the engine) and a [`MockSensor`] (kept by the
//! test) share one buffer:
//! - the sensor side queues lines for the channel to read and can inject
//!   read failures
//! - the channel side records every write so the test can assert on commands
//!
//! [`MockOpener`] hands out channels for registered port names and fails for
//! anything else, which exercises the engine's connection-error path.
//!
//! # Example
//!
//! ```rust
//! use force_daq::hardware::mock::MockOpener;
//! use force_daq::hardware::PortOpener;
//! use std::time::Duration;
//!
//! let opener = MockOpener::new();
//! let sensor = opener.register("/dev/mock0");
//! sensor.push_line("$+x1.0 -x0.0 +y0.0 -y0.0;");
//!
//! let mut channel = opener.open("/dev/mock0", 9600, Duration::from_millis(200)).unwrap();
//! assert_eq!(channel.read_line().unwrap(), b"$+x1.0 -x0.0 +y0.0 -y0.0;\n");
//! ```

use crate::error::{AppResult, DaqError};
use crate::hardware::channel::{ByteChannel, PortOpener};
use parking_lot::Mutex;
use rand::Rng;
use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct MockState {
    incoming: VecDeque<u8>,
    writes: Vec<Vec<u8>>,
    open: bool,
    read_failures: usize,
    open_failures: usize,
    input_resets: usize,
    opens: usize,
}

/// Channel side of the mock serial link.
#[derive(Debug)]
pub struct MockChannel {
    name: String,
    state: Arc<Mutex<MockState>>,
}

/// Device side of the mock serial link.
///
/// Cheap to clone; all clones drive the same channel.
#[derive(Debug, Clone)]
pub struct MockSensor {
    state: Arc<Mutex<MockState>>,
}

/// Creates a connected `MockChannel` / `MockSensor` pair. The channel starts open.
pub fn new(name: &str) -> (MockChannel, MockSensor) {
    let state = Arc::new(Mutex::new(MockState {
        open: true,
        ..MockState::default()
    }));
    (
        MockChannel {
            name: name.to_string(),
            state: state.clone(),
        },
        MockSensor { state },
    )
}

// =============================================================================
// MockChannel
// =============================================================================

impl ByteChannel for MockChannel {
    fn open(&mut self) -> AppResult<()> {
        let mut state = self.state.lock();
        if state.open {
            return Ok(());
        }
        if state.open_failures > 0 {
            state.open_failures -= 1;
            return Err(DaqError::Connection {
                port: self.name.clone(),
                baud_rate: 0,
                reason: "mock device refused to open".into(),
            });
        }
        state.open = true;
        state.opens += 1;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.lock().open
    }

    fn bytes_available(&mut self) -> AppResult<usize> {
        let state = self.state.lock();
        if !state.open {
            return Err(DaqError::NotConnected);
        }
        Ok(state.incoming.len())
    }

    fn read_line(&mut self) -> AppResult<Vec<u8>> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(DaqError::NotConnected);
        }

        let end = state.incoming.iter().position(|b| *b == b'\n');
        let take = end.map_or(state.incoming.len(), |pos| pos + 1);
        let line: Vec<u8> = state.incoming.drain(..take).collect();

        if state.read_failures > 0 {
            state.read_failures -= 1;
            return Err(io::Error::new(io::ErrorKind::Other, "injected read failure").into());
        }
        if end.is_none() {
            return Err(DaqError::ReadTimeout);
        }
        Ok(line)
    }

    fn write(&mut self, bytes: &[u8]) -> AppResult<()> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(DaqError::NotConnected);
        }
        state.writes.push(bytes.to_vec());
        Ok(())
    }

    fn reset_input_buffer(&mut self) -> AppResult<()> {
        let mut state = self.state.lock();
        state.incoming.clear();
        state.input_resets += 1;
        Ok(())
    }

    fn close(&mut self) {
        self.state.lock().open = false;
    }

    fn describe(&self) -> String {
        format!("mock:{}", self.name)
    }
}

// =============================================================================
// MockSensor
// =============================================================================

impl MockSensor {
    /// Queue one line for the channel; `\n` is appended.
    pub fn push_line(&self, line: &str) {
        let mut state = self.state.lock();
        state.incoming.extend(line.as_bytes().iter().copied());
        state.incoming.push_back(b'\n');
    }

    /// Queue raw bytes, no terminator added.
    pub fn push_bytes(&self, bytes: &[u8]) {
        self.state.lock().incoming.extend(bytes.iter().copied());
    }

    /// Queue a well-formed frame with the given axis values.
    pub fn push_frame(&self, plus_x: f64, minus_x: f64, plus_y: f64, minus_y: f64) {
        self.push_line(&format_frame(plus_x, minus_x, plus_y, minus_y));
    }

    /// Make the next `count` line reads fail with an I/O error.
    pub fn fail_next_reads(&self, count: usize) {
        self.state.lock().read_failures += count;
    }

    /// Make the next `count` reopen attempts fail.
    pub fn fail_next_opens(&self, count: usize) {
        self.state.lock().open_failures += count;
    }

    /// Close the link from the device side (cable pulled).
    pub fn unplug(&self) {
        self.state.lock().open = false;
    }

    /// Everything written by the channel so far, one entry per write.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state.lock().writes.clone()
    }

    /// Writes decoded as UTF-8 text.
    pub fn written_lines(&self) -> Vec<String> {
        self.writes()
            .iter()
            .map(|w| String::from_utf8_lossy(w).into_owned())
            .collect()
    }

    /// Bytes queued but not yet read.
    pub fn pending_bytes(&self) -> usize {
        self.state.lock().incoming.len()
    }

    /// Whether the channel side is open.
    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    /// How many times the input buffer was reset.
    pub fn input_resets(&self) -> usize {
        self.state.lock().input_resets
    }

    /// How many times a closed channel was reopened.
    pub fn reopen_count(&self) -> usize {
        self.state.lock().opens
    }

    /// Queue a frame of `base` values plus Gaussian-ish noise of amplitude `noise`.
    pub fn push_noisy_frame<R: Rng>(&self, rng: &mut R, base: [f64; 4], noise: f64) {
        let mut jitter = || {
            if noise > 0.0 {
                rng.gen_range(-noise..noise)
            } else {
                0.0
            }
        };
        self.push_frame(
            base[0] + jitter(),
            base[1] + jitter(),
            base[2] + jitter(),
            base[3] + jitter(),
        );
    }
}

/// Render axis values in the sensor's wire format.
pub fn format_frame(plus_x: f64, minus_x: f64, plus_y: f64, minus_y: f64) -> String {
    format!("$+x{plus_x:.4} -x{minus_x:.4} +y{plus_y:.4} -y{minus_y:.4};")
}

// =============================================================================
// MockOpener
// =============================================================================

/// [`PortOpener`] serving registered mock ports.
#[derive(Debug, Clone, Default)]
pub struct MockOpener {
    ports: Arc<Mutex<BTreeMap<String, Arc<Mutex<MockState>>>>>,
}

impl MockOpener {
    /// Create an opener with no ports.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a port and return the sensor harness driving it.
    ///
    /// Registering the same name twice returns a harness for the existing port.
    pub fn register(&self, port: &str) -> MockSensor {
        let mut ports = self.ports.lock();
        let state = ports
            .entry(port.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(MockState::default())))
            .clone();
        MockSensor { state }
    }

    /// Remove a port; later opens fail.
    pub fn unregister(&self, port: &str) {
        self.ports.lock().remove(port);
    }
}

impl PortOpener for MockOpener {
    fn open(
        &self,
        port: &str,
        baud_rate: u32,
        _timeout: Duration,
    ) -> AppResult<Box<dyn ByteChannel>> {
        let state = self
            .ports
            .lock()
            .get(port)
            .cloned()
            .ok_or_else(|| DaqError::Connection {
                port: port.to_string(),
                baud_rate,
                reason: "no such mock port".into(),
            })?;
        state.lock().open = true;
        Ok(Box::new(MockChannel {
            name: port.to_string(),
            state,
        }))
    }

    fn available_ports(&self) -> Vec<String> {
        self.ports.lock().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_are_read_back_with_terminator() {
        let (mut channel, sensor) = new("test");
        sensor.push_line("hello");
        sensor.push_line("world");

        assert_eq!(channel.bytes_available().unwrap(), 12);
        assert_eq!(channel.read_line().unwrap(), b"hello\n");
        assert_eq!(channel.read_line().unwrap(), b"world\n");
        assert_eq!(channel.bytes_available().unwrap(), 0);
    }

    #[test]
    fn partial_line_times_out_and_is_dropped() {
        let (mut channel, sensor) = new("test");
        sensor.push_bytes(b"$+x1.0 -x");
        assert!(matches!(channel.read_line(), Err(DaqError::ReadTimeout)));
        assert_eq!(sensor.pending_bytes(), 0);
    }

    #[test]
    fn injected_failure_consumes_the_line() {
        let (mut channel, sensor) = new("test");
        sensor.push_line("first");
        sensor.push_line("second");
        sensor.fail_next_reads(1);

        assert!(matches!(channel.read_line(), Err(DaqError::Io(_))));
        assert_eq!(channel.read_line().unwrap(), b"second\n");
    }

    #[test]
    fn writes_and_resets_are_recorded() {
        let (mut channel, sensor) = new("test");
        sensor.push_line("stale");
        channel.write(b"TARE\n").unwrap();
        channel.reset_input_buffer().unwrap();

        assert_eq!(sensor.written_lines(), vec!["TARE\n".to_string()]);
        assert_eq!(sensor.input_resets(), 1);
        assert_eq!(sensor.pending_bytes(), 0);
    }

    #[test]
    fn closed_channel_refuses_io_until_reopened() {
        let (mut channel, sensor) = new("test");
        sensor.unplug();
        assert!(!channel.is_open());
        assert!(channel.write(b"x").is_err());

        channel.open().unwrap();
        assert!(channel.is_open());
        assert_eq!(sensor.reopen_count(), 1);
    }

    #[test]
    fn opener_serves_only_registered_ports() {
        let opener = MockOpener::new();
        let _sensor = opener.register("/dev/mock0");

        assert!(opener
            .open("/dev/mock0", 9600, Duration::from_millis(10))
            .is_ok());
        assert!(matches!(
            opener.open("/dev/mock1", 9600, Duration::from_millis(10)),
            Err(DaqError::Connection { .. })
        ));
        assert_eq!(opener.available_ports(), vec!["/dev/mock0".to_string()]);
    }

    #[test]
    fn formatted_frames_use_wire_tags() {
        assert_eq!(
            format_frame(1.5, -0.25, 0.0, 2.0),
            "$+x1.5000 -x-0.2500 +y0.0000 -y2.0000;"
        );
        assert_eq!(
            format_frame(-1.0, 0.0, 0.0, 0.0),
            "$+x-1.0000 -x0.0000 +y0.0000 -y0.0000;"
        );
    }
}
