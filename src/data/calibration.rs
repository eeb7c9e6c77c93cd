//! Zero calibration offsets.

use crate::data::frame::Frame;
use serde::{Deserialize, Serialize};

/// Per-axis offsets subtracted from every filtered reading.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CalibrationOffsets {
    /// +x offset
    pub plus_x: f64,
    /// −x offset
    pub minus_x: f64,
    /// +y offset
    pub plus_y: f64,
    /// −y offset
    pub minus_y: f64,
}

impl CalibrationOffsets {
    /// Capture a baseline from the most recent frame.
    ///
    /// Each offset becomes the negation of the matching frame field. The result
    /// depends only on `latest`, so zeroing twice against the same frame
    /// leaves the offsets unchanged.
    pub fn zero_from(&mut self, latest: &Frame) {
        self.plus_x = -latest.plus_x;
        self.minus_x = -latest.minus_x;
        self.plus_y = -latest.plus_y;
        self.minus_y = -latest.minus_y;
    }

    /// Reset all offsets to zero.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// `true` when no offset is applied.
    pub fn is_cleared(&self) -> bool {
        *self == Self::default()
    }
}
