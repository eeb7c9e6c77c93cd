//! Deferred commands for the acquisition worker.
//!
//! Every operation that mutates worker-owned state (the channel, the filter
//! bank, the calibration offsets) is expressed as a [`SensorCommand`] and
//! pushed onto the engine's [`CommandQueue`]. The worker pops at most one
//! command per tick, before it touches the channel, so commands run strictly
//! in submission order.
//!
//! # Message Flow
//!
//! ```text
//! Caller thread                      Worker thread
//! -------------                      -------------
//! 1. Build command + oneshot
//! 2. Enqueue on mpsc          ------>
//!                                    3. Dequeue at the next tick
//!                                    4. Execute against owned state
//!                                    5. Send reply
//! 6. Await / wait on ticket   <------
//! ```
//!
//! Each variant has a helper constructor returning the command together with
//! the [`CommandTicket`] for its reply:
//!
//! ```rust
//! use force_daq::engine::SensorCommand;
//!
//! let (cmd, ticket) = SensorCommand::send("TARE");
//! # drop(cmd);
//! // queue.enqueue(cmd);
//! // ticket.wait()?;
//! # let _ = ticket;
//! ```

use crate::data::CalibrationOffsets;
use crate::error::{AppResult, DaqError};
use serde::Serialize;
use std::fmt;
use tokio::sync::{mpsc, oneshot};

/// Outcome of a connect command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// A channel is now attached.
    Connected {
        /// Port name
        port: String,
        /// Baud rate the port was opened at
        baud_rate: u32,
    },
    /// Opening failed; the engine stays disconnected.
    Unavailable {
        /// Why the port could not be opened
        reason: String,
        /// Ports that were discoverable at the time of the failure
        available_ports: Vec<String>,
    },
}

impl ConnectionStatus {
    /// `true` for [`ConnectionStatus::Connected`].
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected { .. })
    }
}

/// Operations executed by the acquisition worker.
///
/// Use the helper constructors to get the reply ticket along with the command.
pub enum SensorCommand {
    /// Open `port`, replacing (and closing) any attached channel.
    ///
    /// # Response
    ///
    /// Always a [`ConnectionStatus`]; a failed open is not an error.
    Connect {
        /// Port name
        port: String,
        /// Baud rate
        baud_rate: u32,
        /// Reply channel
        reply: oneshot::Sender<ConnectionStatus>,
    },

    /// Close and detach the channel.
    ///
    /// # Response
    ///
    /// `true` if a channel was attached.
    Disconnect {
        /// Reply channel
        reply: oneshot::Sender<bool>,
    },

    /// Write `text` followed by `\n`, then discard pending input.
    ///
    /// # Response
    ///
    /// - `Ok(())`: the line was written and flushed
    /// - `Err(DaqError::NotConnected)`: no channel attached
    /// - `Err(_)`: the write or reopen failed
    Send {
        /// Line to send, without terminator
        text: String,
        /// Reply channel
        reply: oneshot::Sender<AppResult<()>>,
    },

    /// Capture zero offsets from the latest history entry.
    ///
    /// # Response
    ///
    /// The new offsets, or `Err(DaqError::EmptyHistory)`.
    Zero {
        /// Reply channel
        reply: oneshot::Sender<AppResult<CalibrationOffsets>>,
    },

    /// Reset all offsets to zero.
    ClearZero {
        /// Reply channel
        reply: oneshot::Sender<()>,
    },
}

impl SensorCommand {
    /// Create a connect command.
    pub fn connect(port: impl Into<String>, baud_rate: u32) -> (Self, CommandTicket<ConnectionStatus>) {
        let (reply, rx) = oneshot::channel();
        (
            Self::Connect {
                port: port.into(),
                baud_rate,
                reply,
            },
            CommandTicket::new(rx),
        )
    }

    /// Create a disconnect command.
    pub fn disconnect() -> (Self, CommandTicket<bool>) {
        let (reply, rx) = oneshot::channel();
        (Self::Disconnect { reply }, CommandTicket::new(rx))
    }

    /// Create a send command.
    pub fn send(text: impl Into<String>) -> (Self, CommandTicket<AppResult<()>>) {
        let (reply, rx) = oneshot::channel();
        (
            Self::Send {
                text: text.into(),
                reply,
            },
            CommandTicket::new(rx),
        )
    }

    /// Create a zero command.
    pub fn zero() -> (Self, CommandTicket<AppResult<CalibrationOffsets>>) {
        let (reply, rx) = oneshot::channel();
        (Self::Zero { reply }, CommandTicket::new(rx))
    }

    /// Create a clear-zero command.
    pub fn clear_zero() -> (Self, CommandTicket<()>) {
        let (reply, rx) = oneshot::channel();
        (Self::ClearZero { reply }, CommandTicket::new(rx))
    }

    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Disconnect { .. } => "disconnect",
            Self::Send { .. } => "send",
            Self::Zero { .. } => "zero",
            Self::ClearZero { .. } => "clear_zero",
        }
    }
}

impl fmt::Debug for SensorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect {
                port, baud_rate, ..
            } => f
                .debug_struct("Connect")
                .field("port", port)
                .field("baud_rate", baud_rate)
                .finish_non_exhaustive(),
            Self::Send { text, .. } => f
                .debug_struct("Send")
                .field("text", text)
                .finish_non_exhaustive(),
            other => f.write_str(other.name()),
        }
    }
}

/// Pending reply to an enqueued command.
///
/// Resolves to `Err(DaqError::EngineStopped)` if the worker exits before
/// executing the command.
#[derive(Debug)]
#[must_use = "a ticket does nothing unless its outcome is awaited"]
pub struct CommandTicket<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> CommandTicket<T> {
    fn new(rx: oneshot::Receiver<T>) -> Self {
        Self { rx }
    }

    /// Await the reply from async code.
    pub async fn outcome(self) -> AppResult<T> {
        self.rx.await.map_err(|_| DaqError::EngineStopped)
    }

    /// Block the current thread until the reply arrives.
    ///
    /// Must not be called from inside an async runtime.
    pub fn wait(self) -> AppResult<T> {
        self.rx.blocking_recv().map_err(|_| DaqError::EngineStopped)
    }

    /// Take the reply if it has already arrived.
    pub fn try_outcome(&mut self) -> Option<AppResult<T>> {
        match self.rx.try_recv() {
            Ok(value) => Some(Ok(value)),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(DaqError::EngineStopped)),
        }
    }
}

/// Per-engine FIFO of deferred commands (producer side).
///
/// Cloning yields another producer for the same queue.
#[derive(Debug, Clone)]
pub struct CommandQueue {
    tx: mpsc::UnboundedSender<SensorCommand>,
}

/// Consumer side of a [`CommandQueue`], owned by the worker.
#[derive(Debug)]
pub struct CommandReceiver {
    rx: mpsc::UnboundedReceiver<SensorCommand>,
}

impl CommandQueue {
    /// Create a connected producer/consumer pair.
    pub fn channel() -> (Self, CommandReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, CommandReceiver { rx })
    }

    /// Append a command. Callable from any thread, never blocks.
    ///
    /// If the worker has gone away the command is dropped, which resolves its
    /// ticket to `EngineStopped`.
    pub fn enqueue(&self, command: SensorCommand) {
        if let Err(mpsc::error::SendError(dropped)) = self.tx.send(command) {
            tracing::debug!(command = dropped.name(), "Command queue closed, dropping command");
        }
    }
}

impl CommandReceiver {
    /// Pop the oldest pending command, if any.
    pub fn next(&mut self) -> Option<SensorCommand> {
        self.rx.try_recv().ok()
    }

    /// Drop every pending command, resolving their tickets to `EngineStopped`.
    pub fn close(&mut self) {
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_come_out_in_submission_order() {
        let (queue, mut receiver) = CommandQueue::channel();
        let (a, _ta) = SensorCommand::send("A");
        let (b, _tb) = SensorCommand::zero();
        let (c, _tc) = SensorCommand::disconnect();
        queue.enqueue(a);
        queue.enqueue(b);
        queue.enqueue(c);

        let names: Vec<&str> = std::iter::from_fn(|| receiver.next())
            .map(|cmd| cmd.name())
            .collect();
        assert_eq!(names, vec!["send", "zero", "disconnect"]);
    }

    #[test]
    fn reply_reaches_ticket() {
        let (cmd, ticket) = SensorCommand::disconnect();
        match cmd {
            SensorCommand::Disconnect { reply } => reply.send(true).unwrap(),
            other => panic!("unexpected command {other:?}"),
        }
        assert!(ticket.wait().unwrap());
    }

    #[test]
    fn dropped_command_resolves_to_engine_stopped() {
        let (cmd, ticket) = SensorCommand::clear_zero();
        drop(cmd);
        assert!(matches!(ticket.wait(), Err(DaqError::EngineStopped)));
    }

    #[test]
    fn closing_receiver_fails_pending_and_future_tickets() {
        let (queue, mut receiver) = CommandQueue::channel();
        let (cmd, pending) = SensorCommand::zero();
        queue.enqueue(cmd);
        receiver.close();

        let (late, late_ticket) = SensorCommand::send("late");
        queue.enqueue(late);

        assert!(matches!(pending.wait(), Err(DaqError::EngineStopped)));
        assert!(matches!(late_ticket.wait(), Err(DaqError::EngineStopped)));
    }

    #[test]
    fn try_outcome_is_none_until_replied() {
        let (cmd, mut ticket) = SensorCommand::clear_zero();
        assert!(ticket.try_outcome().is_none());
        if let SensorCommand::ClearZero { reply } = cmd {
            reply.send(()).unwrap();
        }
        assert!(matches!(ticket.try_outcome(), Some(Ok(()))));
    }

    #[tokio::test]
    async fn outcome_can_be_awaited() {
        let (cmd, ticket) = SensorCommand::connect("/dev/ttyUSB0", 9600);
        if let SensorCommand::Connect {
            port,
            baud_rate,
            reply,
        } = cmd
        {
            reply
                .send(ConnectionStatus::Connected { port, baud_rate })
                .unwrap();
        }
        let status = ticket.outcome().await.unwrap();
        assert!(status.is_connected());
    }
}
