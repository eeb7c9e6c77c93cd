//! The acquisition worker and its owning engine handle.
//!
//! [`AcquisitionEngine`] is the public face: it owns the command queue, the
//! shared history buffer and the handle of one dedicated OS thread running an
//! [`AcquisitionWorker`]. The worker owns the channel, the filter bank and the
//! calibration offsets outright; nothing else touches them. Callers change
//! that state only by enqueuing [`SensorCommand`]s.
//!
//! # Tick
//!
//! Each iteration of the worker loop:
//! 1. checks the engine state and exits unless it is `Running`
//! 2. sleeps for the poll interval
//! 3. executes at most one pending command
//! 4. if a channel is attached, reopens it when closed and drains every
//!    complete line: parse → filter → calibrate → vector → history → sink
//!
//! A line that fails to decode or parse is dropped; the loop never exits
//! because of channel or line errors.

use crate::config::Settings;
use crate::data::{
    parse_line, AxisFilterBank, CalibrationOffsets, Frame, HistoryBuffer, HistoryEntry,
    HistoryReader,
};
use crate::engine::commands::{
    CommandQueue, CommandReceiver, CommandTicket, ConnectionStatus, SensorCommand,
};
use crate::engine::sink::SampleSink;
use crate::error::{AppResult, DaqError};
use crate::hardware::{ByteChannel, PortOpener};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Name of the acquisition thread.
pub const WORKER_THREAD_NAME: &str = "force-acquisition";

/// Lifecycle of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EngineState {
    /// Created, worker not started.
    Idle,
    /// Worker thread polling.
    Running,
    /// Stop requested; the current tick is finishing.
    Terminating,
    /// Worker exited (or was never started and the engine was shut down).
    Stopped,
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Name of the command executed this tick
    pub command: Option<&'static str>,
    /// Lines turned into history entries
    pub frames: usize,
    /// Lines dropped because of read, decode or parse failures
    pub discarded: usize,
}

/// State owned by the acquisition thread.
///
/// Normally driven by [`AcquisitionEngine`]; tests may construct one directly
/// and call [`AcquisitionWorker::tick`] on their own thread.
pub struct AcquisitionWorker {
    opener: Box<dyn PortOpener>,
    channel: Option<Box<dyn ByteChannel>>,
    filters: AxisFilterBank,
    offsets: CalibrationOffsets,
    history: Arc<RwLock<HistoryBuffer>>,
    commands: CommandReceiver,
    sink: Option<Arc<dyn SampleSink>>,
    state: Arc<Mutex<EngineState>>,
    read_timeout: Duration,
    poll_interval: Duration,
}

impl AcquisitionWorker {
    /// Create a worker and the queue feeding it.
    pub fn new(settings: &Settings, opener: Box<dyn PortOpener>) -> (Self, CommandQueue) {
        let (queue, commands) = CommandQueue::channel();
        let worker = Self {
            opener,
            channel: None,
            filters: AxisFilterBank::new(&settings.filter),
            offsets: CalibrationOffsets::default(),
            history: Arc::new(RwLock::new(HistoryBuffer::new(
                settings.acquisition.history_len,
            ))),
            commands,
            sink: None,
            state: Arc::new(Mutex::new(EngineState::Idle)),
            read_timeout: settings.sensor.read_timeout,
            poll_interval: settings.acquisition.poll_interval,
        };
        (worker, queue)
    }

    /// Attach a sink receiving every accepted sample.
    pub fn set_sink(&mut self, sink: Arc<dyn SampleSink>) {
        self.sink = Some(sink);
    }

    /// Shared handle to the history buffer.
    pub fn history_handle(&self) -> Arc<RwLock<HistoryBuffer>> {
        self.history.clone()
    }

    /// Current filter state.
    pub fn filters(&self) -> &AxisFilterBank {
        &self.filters
    }

    /// Current calibration offsets.
    pub fn offsets(&self) -> CalibrationOffsets {
        self.offsets
    }

    /// Whether a channel is attached.
    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    /// Run one tick without sleeping: one command, then channel I/O.
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();

        if let Some(command) = self.commands.next() {
            report.command = Some(command.name());
            self.execute(command);
        }

        if self.channel.is_some() && self.ensure_open() {
            while let Some(read) = self.next_line() {
                let outcome = read.and_then(|bytes| self.process_line(&bytes));
                match outcome {
                    Ok(true) => report.frames += 1,
                    Ok(false) => {}
                    Err(e) => {
                        report.discarded += 1;
                        if e.is_transient() {
                            trace!(error = %e, "Discarding sensor line");
                        } else {
                            warn!(error = %e, "Dropping sensor line after unexpected error");
                        }
                    }
                }
            }
        }

        report
    }

    /// Poll until the engine state leaves `Running`, then release the channel.
    pub fn run(mut self) {
        debug!(interval = ?self.poll_interval, "Acquisition loop started");

        while *self.state.lock() == EngineState::Running {
            std::thread::sleep(self.poll_interval);
            let report = self.tick();
            if report != TickReport::default() {
                trace!(
                    command = report.command,
                    frames = report.frames,
                    discarded = report.discarded,
                    "Tick"
                );
            }
        }

        self.finish();
        debug!("Acquisition loop stopped");
    }

    fn finish(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.close();
            info!(channel = %channel.describe(), "Sensor disconnected on shutdown");
        }
        self.commands.close();
        *self.state.lock() = EngineState::Stopped;
    }

    fn execute(&mut self, command: SensorCommand) {
        trace!(?command, "Executing command");
        match command {
            SensorCommand::Connect {
                port,
                baud_rate,
                reply,
            } => {
                let status = self.connect(&port, baud_rate);
                let _ = reply.send(status);
            }
            SensorCommand::Disconnect { reply } => {
                let _ = reply.send(self.disconnect());
            }
            SensorCommand::Send { text, reply } => {
                let result = match self.channel.as_deref_mut() {
                    Some(channel) => send_line(channel, &text),
                    None => Err(DaqError::NotConnected),
                };
                if let Err(e) = &result {
                    debug!(error = %e, text = %text, "Send failed");
                }
                let _ = reply.send(result);
            }
            SensorCommand::Zero { reply } => {
                let latest = self.history.read().latest().map(|entry| entry.frame);
                let result = latest.map(|frame| {
                    self.offsets.zero_from(&frame);
                    info!(offsets = ?self.offsets, "Zero calibration captured");
                    self.offsets
                });
                let _ = reply.send(result);
            }
            SensorCommand::ClearZero { reply } => {
                self.offsets.clear();
                info!("Zero calibration cleared");
                let _ = reply.send(());
            }
        }
    }

    fn connect(&mut self, port: &str, baud_rate: u32) -> ConnectionStatus {
        if let Some(mut previous) = self.channel.take() {
            previous.close();
            debug!(channel = %previous.describe(), "Closed previous channel");
        }

        match self.opener.open(port, baud_rate, self.read_timeout) {
            Ok(channel) => {
                info!(port, baud_rate, "Sensor connected");
                self.channel = Some(channel);
                ConnectionStatus::Connected {
                    port: port.to_string(),
                    baud_rate,
                }
            }
            Err(e) => {
                let available_ports = self.opener.available_ports();
                warn!(
                    port,
                    baud_rate,
                    error = %e,
                    available_ports = ?available_ports,
                    "Could not open sensor port"
                );
                ConnectionStatus::Unavailable {
                    reason: e.to_string(),
                    available_ports,
                }
            }
        }
    }

    fn disconnect(&mut self) -> bool {
        match self.channel.take() {
            Some(mut channel) => {
                channel.close();
                info!(channel = %channel.describe(), "Sensor disconnected");
                true
            }
            None => false,
        }
    }

    fn ensure_open(&mut self) -> bool {
        let Some(channel) = self.channel.as_mut() else {
            return false;
        };
        if channel.is_open() {
            return true;
        }
        match channel.open() {
            Ok(()) => {
                info!(channel = %channel.describe(), "Sensor channel reopened");
                true
            }
            Err(e) => {
                warn!(channel = %channel.describe(), error = %e, "Failed to reopen sensor channel");
                false
            }
        }
    }

    fn next_line(&mut self) -> Option<AppResult<Vec<u8>>> {
        let channel = self.channel.as_mut()?;
        match channel.bytes_available() {
            Ok(0) => None,
            Ok(_) => Some(channel.read_line()),
            Err(e) => {
                warn!(channel = %channel.describe(), error = %e, "Polling sensor channel failed");
                None
            }
        }
    }

    /// Returns `Ok(false)` for a line carrying no frame.
    fn process_line(&mut self, bytes: &[u8]) -> AppResult<bool> {
        let text = std::str::from_utf8(bytes)?;
        let Some(raw) = parse_line(text)? else {
            return Ok(false);
        };

        let filtered = self.filters.apply(&raw);
        let entry = HistoryEntry::from_frame(Frame::corrected(&filtered, &self.offsets));
        if let Some(sink) = &self.sink {
            sink.push(&entry.vector, &entry.frame);
        }
        self.history.write().push(entry);
        Ok(true)
    }
}

fn send_line(channel: &mut dyn ByteChannel, text: &str) -> AppResult<()> {
    channel.open()?;
    let mut line = Vec::with_capacity(text.len() + 1);
    line.extend_from_slice(text.as_bytes());
    line.push(b'\n');
    channel.write(&line)?;
    channel.reset_input_buffer()
}

/// Handle to one acquisition engine.
///
/// Commands may be issued before [`AcquisitionEngine::start`]; they wait in
/// the queue. Dropping the engine shuts the worker down.
///
/// ```no_run
/// use force_daq::config::Settings;
/// use force_daq::engine::AcquisitionEngine;
/// use force_daq::hardware::SerialOpener;
///
/// let mut engine = AcquisitionEngine::new(&Settings::default(), Box::new(SerialOpener));
/// engine.start()?;
/// let status = engine.connect("/dev/ttyUSB0", 9600).wait()?;
/// println!("{status:?}");
/// engine.shutdown();
/// # Ok::<(), force_daq::error::DaqError>(())
/// ```
pub struct AcquisitionEngine {
    queue: CommandQueue,
    history: HistoryReader,
    state: Arc<Mutex<EngineState>>,
    worker: Option<AcquisitionWorker>,
    handle: Option<JoinHandle<()>>,
}

impl AcquisitionEngine {
    /// Create an idle engine. Nothing runs until [`AcquisitionEngine::start`].
    ///
    /// When a sensor port is configured, a connect command is queued here, so
    /// it runs ahead of anything the caller queues before starting.
    pub fn new(settings: &Settings, opener: Box<dyn PortOpener>) -> Self {
        let (worker, queue) = AcquisitionWorker::new(settings, opener);
        if let Some(port) = settings.sensor.port.clone() {
            let (cmd, _ticket) = SensorCommand::connect(port, settings.sensor.baud_rate);
            queue.enqueue(cmd);
        }
        Self {
            queue,
            history: HistoryReader::new(worker.history_handle()),
            state: worker.state.clone(),
            worker: Some(worker),
            handle: None,
        }
    }

    /// Attach a sink. Only effective before [`AcquisitionEngine::start`].
    pub fn with_sink(mut self, sink: Arc<dyn SampleSink>) -> Self {
        match self.worker.as_mut() {
            Some(worker) => worker.set_sink(sink),
            None => warn!("Sink attached after start, ignoring"),
        }
        self
    }

    /// Spawn the acquisition thread.
    ///
    /// # Errors
    ///
    /// [`DaqError::AlreadyStarted`] on a second call, [`DaqError::Spawn`] if
    /// the OS refuses the thread.
    pub fn start(&mut self) -> AppResult<()> {
        let worker = self.worker.take().ok_or(DaqError::AlreadyStarted)?;
        *self.state.lock() = EngineState::Running;
        let spawned = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || worker.run());

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                info!("Acquisition engine started");
                Ok(())
            }
            Err(e) => {
                *self.state.lock() = EngineState::Stopped;
                error!(error = %e, "Failed to spawn acquisition thread");
                Err(DaqError::Spawn(e))
            }
        }
    }

    /// Queue a connect command.
    pub fn connect(&self, port: &str, baud_rate: u32) -> CommandTicket<ConnectionStatus> {
        self.submit(SensorCommand::connect(port, baud_rate))
    }

    /// Queue a disconnect command.
    pub fn disconnect(&self) -> CommandTicket<bool> {
        self.submit(SensorCommand::disconnect())
    }

    /// Queue a line to send to the sensor.
    pub fn send(&self, text: &str) -> CommandTicket<AppResult<()>> {
        self.submit(SensorCommand::send(text))
    }

    /// Queue a zero calibration against the newest sample.
    pub fn zero(&self) -> CommandTicket<AppResult<CalibrationOffsets>> {
        self.submit(SensorCommand::zero())
    }

    /// Queue a reset of the zero calibration.
    pub fn clear_zero(&self) -> CommandTicket<()> {
        self.submit(SensorCommand::clear_zero())
    }

    fn submit<T>(&self, (command, ticket): (SensorCommand, CommandTicket<T>)) -> CommandTicket<T> {
        self.queue.enqueue(command);
        ticket
    }

    /// Another producer for this engine's command queue, usable from any thread.
    pub fn command_queue(&self) -> CommandQueue {
        self.queue.clone()
    }

    /// Newest history entry.
    ///
    /// # Errors
    ///
    /// [`DaqError::EmptyHistory`] before the first accepted sample.
    pub fn latest(&self) -> AppResult<HistoryEntry> {
        self.history.latest()
    }

    /// All history entries, oldest first.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.history.snapshot()
    }

    /// Read-only history handle that can be moved to other threads.
    pub fn history_reader(&self) -> HistoryReader {
        self.history.clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        *self.state.lock()
    }

    /// Request termination and wait for the worker to exit.
    ///
    /// Takes at most one poll interval plus one tick. Pending commands resolve
    /// to [`DaqError::EngineStopped`]. Idempotent.
    pub fn shutdown(&mut self) {
        {
            let mut state = self.state.lock();
            match *state {
                EngineState::Running => *state = EngineState::Terminating,
                EngineState::Idle => *state = EngineState::Stopped,
                EngineState::Terminating | EngineState::Stopped => {}
            }
        }

        // Never started: dropping the worker drops the queue receiver
        self.worker = None;

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Acquisition thread panicked");
                *self.state.lock() = EngineState::Stopped;
            } else {
                info!("Acquisition engine stopped");
            }
        }
    }
}

impl Drop for AcquisitionEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::MockOpener;

    fn worker_with_sensor() -> (AcquisitionWorker, CommandQueue, crate::hardware::MockSensor) {
        let opener = MockOpener::new();
        let sensor = opener.register("/dev/mock0");
        let (worker, queue) = AcquisitionWorker::new(&Settings::default(), Box::new(opener));
        (worker, queue, sensor)
    }

    fn connected() -> (AcquisitionWorker, CommandQueue, crate::hardware::MockSensor) {
        let (mut worker, queue, sensor) = worker_with_sensor();
        let (cmd, _ticket) = SensorCommand::connect("/dev/mock0", 9600);
        queue.enqueue(cmd);
        worker.tick();
        assert!(worker.is_connected());
        (worker, queue, sensor)
    }

    #[test]
    fn tick_without_channel_does_nothing() {
        let (mut worker, _queue, _sensor) = worker_with_sensor();
        assert_eq!(worker.tick(), TickReport::default());
    }

    #[test]
    fn one_command_per_tick() {
        let (mut worker, queue, _sensor) = worker_with_sensor();
        let (a, mut ta) = SensorCommand::clear_zero();
        let (b, mut tb) = SensorCommand::clear_zero();
        queue.enqueue(a);
        queue.enqueue(b);

        assert_eq!(worker.tick().command, Some("clear_zero"));
        assert!(matches!(ta.try_outcome(), Some(Ok(()))));
        assert!(tb.try_outcome().is_none());

        worker.tick();
        assert!(matches!(tb.try_outcome(), Some(Ok(()))));
    }

    #[test]
    fn frames_flow_into_history() {
        let (mut worker, _queue, sensor) = connected();
        sensor.push_frame(1.0, 0.0, 0.0, 0.0);
        sensor.push_frame(1.0, 0.0, 0.0, 0.0);

        let report = worker.tick();
        assert_eq!(report.frames, 2);
        let history = worker.history_handle();
        let history = history.read();
        assert_eq!(history.len(), 2);
        // First gain is one half
        assert!((history.snapshot()[0].frame.plus_x - 0.5).abs() < 1e-12);
    }

    #[test]
    fn malformed_line_leaves_filters_untouched() {
        let (mut worker, _queue, sensor) = connected();
        let before = worker.filters().clone();

        sensor.push_line("$+x1.0 -x2.0 +y3.0;");
        sensor.push_bytes(&[0xff, 0xfe, b'\n']);
        let report = worker.tick();

        assert_eq!(report.discarded, 2);
        assert_eq!(report.frames, 0);
        assert_eq!(worker.filters(), &before);
        assert!(worker.history_handle().read().is_empty());
    }

    #[test]
    fn empty_line_is_neither_frame_nor_discard() {
        let (mut worker, _queue, sensor) = connected();
        sensor.push_line("$;");
        assert_eq!(
            worker.tick(),
            TickReport {
                command: None,
                frames: 0,
                discarded: 0
            }
        );
    }

    #[test]
    fn unplugged_channel_is_reopened() {
        let (mut worker, _queue, sensor) = connected();
        sensor.unplug();
        sensor.push_frame(0.0, 0.0, 1.0, 0.0);

        let report = worker.tick();
        assert!(sensor.is_open());
        assert_eq!(report.frames, 1);
    }

    #[test]
    fn failed_reopen_skips_io() {
        let (mut worker, _queue, sensor) = connected();
        sensor.unplug();
        sensor.fail_next_opens(1);
        sensor.push_frame(0.0, 0.0, 1.0, 0.0);

        assert_eq!(worker.tick().frames, 0);
        assert_eq!(worker.tick().frames, 1);
    }

    #[test]
    fn zero_then_clear_through_queue() {
        let (mut worker, queue, sensor) = connected();
        sensor.push_frame(2.0, 0.0, 0.0, 0.0);
        worker.tick();

        let (cmd, mut ticket) = SensorCommand::zero();
        queue.enqueue(cmd);
        worker.tick();
        let offsets = ticket.try_outcome().unwrap().unwrap().unwrap();
        assert!((offsets.plus_x + 1.0).abs() < 1e-12);
        assert_eq!(worker.offsets(), offsets);

        let (cmd, _ticket) = SensorCommand::clear_zero();
        queue.enqueue(cmd);
        worker.tick();
        assert!(worker.offsets().is_cleared());
    }

    #[test]
    fn zero_with_empty_history_fails() {
        let (mut worker, queue, _sensor) = worker_with_sensor();
        let (cmd, mut ticket) = SensorCommand::zero();
        queue.enqueue(cmd);
        worker.tick();
        assert!(matches!(
            ticket.try_outcome(),
            Some(Ok(Err(DaqError::EmptyHistory)))
        ));
    }

    #[test]
    fn send_appends_newline_and_flushes_input() {
        let (mut worker, queue, sensor) = connected();
        sensor.push_line("stale reply");

        let (cmd, mut ticket) = SensorCommand::send("TARE");
        queue.enqueue(cmd);
        let report = worker.tick();

        assert!(matches!(ticket.try_outcome(), Some(Ok(Ok(())))));
        assert_eq!(sensor.written_lines(), vec!["TARE\n".to_string()]);
        assert_eq!(sensor.input_resets(), 1);
        // The stale line was flushed before the I/O phase
        assert_eq!(report.discarded, 0);
    }

    #[test]
    fn send_without_channel_is_not_connected() {
        let (mut worker, queue, _sensor) = worker_with_sensor();
        let (cmd, mut ticket) = SensorCommand::send("TARE");
        queue.enqueue(cmd);
        worker.tick();
        assert!(matches!(
            ticket.try_outcome(),
            Some(Ok(Err(DaqError::NotConnected)))
        ));
    }

    #[test]
    fn disconnect_reports_whether_attached() {
        let (mut worker, queue, sensor) = connected();
        let (cmd, mut first) = SensorCommand::disconnect();
        queue.enqueue(cmd);
        worker.tick();
        let (cmd, mut second) = SensorCommand::disconnect();
        queue.enqueue(cmd);
        worker.tick();

        assert!(matches!(first.try_outcome(), Some(Ok(true))));
        assert!(matches!(second.try_outcome(), Some(Ok(false))));
        assert!(!sensor.is_open());
    }

    #[test]
    fn engine_shutdown_before_start_fails_pending_tickets() {
        let mut engine = AcquisitionEngine::new(&Settings::default(), Box::new(MockOpener::new()));
        let ticket = engine.zero();
        engine.shutdown();
        assert_eq!(engine.state(), EngineState::Stopped);
        assert!(matches!(ticket.wait(), Err(DaqError::EngineStopped)));
    }

    #[test]
    fn engine_cannot_start_twice() {
        let mut settings = Settings::default();
        settings.acquisition.poll_interval = Duration::from_millis(5);
        let mut engine = AcquisitionEngine::new(&settings, Box::new(MockOpener::new()));
        engine.start().unwrap();
        assert!(matches!(engine.start(), Err(DaqError::AlreadyStarted)));
        engine.shutdown();
        assert_eq!(engine.state(), EngineState::Stopped);
    }
}
