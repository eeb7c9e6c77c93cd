//! Consumers of accepted force samples.
//!
//! The worker pushes every accepted sample to an optional [`SampleSink`] and
//! never waits on it. There is no delivery guarantee: a sink that cannot keep
//! up loses samples.

use crate::data::{ForceVector, Frame};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Fire-and-forget receiver for accepted samples.
///
/// Called on the acquisition thread; implementations must not block.
pub trait SampleSink: Send + Sync {
    /// Deliver one sample.
    fn push(&self, vector: &ForceVector, frame: &Frame);
}

/// A sample as seen by broadcast subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForceSample {
    /// Load vector
    pub vector: ForceVector,
    /// Calibrated axis values
    pub frame: Frame,
    /// Time the sample was pushed
    pub timestamp: DateTime<Utc>,
}

/// Fans samples out to any number of `tokio::sync::broadcast` subscribers.
///
/// Subscribers that fall more than `capacity` samples behind receive
/// `RecvError::Lagged` and skip ahead.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<ForceSample>,
}

impl BroadcastSink {
    /// Create a sink buffering up to `capacity` samples per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Register a new subscriber. It only sees samples pushed after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ForceSample> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl SampleSink for BroadcastSink {
    fn push(&self, vector: &ForceVector, frame: &Frame) {
        // No subscribers is not an error
        let _ = self.tx.send(ForceSample {
            vector: *vector,
            frame: *frame,
            timestamp: Utc::now(),
        });
    }
}
