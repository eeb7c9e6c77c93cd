//! Bounded history of recent force samples.
//!
//! Single writer (the acquisition worker), many readers. The engine keeps the
//! buffer behind a `parking_lot::RwLock`; readers only ever receive clones.

use crate::data::frame::Frame;
use crate::data::vector::ForceVector;
use crate::error::{AppResult, DaqError};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

/// One accepted reading: the derived vector and the frame it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Load vector
    pub vector: ForceVector,
    /// Calibrated axis values
    pub frame: Frame,
    /// When the line was processed
    pub captured_at: DateTime<Utc>,
}

impl HistoryEntry {
    /// Derive the vector for `frame` and stamp it with the current time.
    pub fn from_frame(frame: Frame) -> Self {
        Self {
            vector: ForceVector::from_frame(&frame),
            frame,
            captured_at: Utc::now(),
        }
    }
}

/// Insertion-ordered FIFO with drop-oldest eviction.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl HistoryBuffer {
    /// Create an empty buffer. A capacity of 0 is raised to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an entry, evicting the oldest one when full.
    pub fn push(&mut self, entry: HistoryEntry) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Most recently pushed entry.
    ///
    /// # Errors
    ///
    /// [`DaqError::EmptyHistory`] if nothing was pushed yet.
    pub fn latest(&self) -> AppResult<&HistoryEntry> {
        self.entries.back().ok_or(DaqError::EmptyHistory)
    }

    /// Clone of all entries, oldest first.
    pub fn snapshot(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` before the first push
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of stored entries
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Cloneable read-only view of a shared [`HistoryBuffer`].
///
/// `Send + Sync`, so a display or controller thread can poll it while the
/// acquisition thread appends.
#[derive(Debug, Clone)]
pub struct HistoryReader {
    inner: Arc<RwLock<HistoryBuffer>>,
}

impl HistoryReader {
    /// Wrap a shared buffer.
    pub fn new(inner: Arc<RwLock<HistoryBuffer>>) -> Self {
        Self { inner }
    }

    /// Clone of the newest entry.
    ///
    /// # Errors
    ///
    /// [`DaqError::EmptyHistory`] before the first push.
    pub fn latest(&self) -> AppResult<HistoryEntry> {
        self.inner.read().latest().cloned()
    }

    /// Clone of all entries, oldest first.
    pub fn snapshot(&self) -> Vec<HistoryEntry> {
        self.inner.read().snapshot()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// `true` before the first push
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
