//! Sensor line parsing and the per-tick `Frame` type.
//!
//! The sensor streams one ASCII line per reading:
//!
//! ```text
//! $+x0.152 -x0.010 +y1.204 -y0.000;
//! ```
//!
//! A leading `$` and a trailing `;` delimit the frame. Inside, four
//! whitespace-separated tokens each carry a fixed two-character axis tag
//! followed by a signed decimal number. Token order is fixed: +x, −x, +y, −y.

use crate::data::calibration::CalibrationOffsets;
use crate::error::FrameError;
use serde::{Deserialize, Serialize};

const FRAME_START: char = '$';
const FRAME_END: char = ';';
const AXIS_TAGS: [&str; 4] = ["+x", "-x", "+y", "-y"];

/// Four axis values in wire order, before calibration.
///
/// Produced by the parser (raw) and by the filter bank (filtered).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RawReading {
    /// +x axis value
    pub plus_x: f64,
    /// −x axis value
    pub minus_x: f64,
    /// +y axis value
    pub plus_y: f64,
    /// −y axis value
    pub minus_y: f64,
}

/// One filtered, calibration-corrected reading across all four axes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Frame {
    /// +x axis load
    pub plus_x: f64,
    /// −x axis load
    pub minus_x: f64,
    /// +y axis load
    pub plus_y: f64,
    /// −y axis load
    pub minus_y: f64,
}

impl Frame {
    /// Subtract the calibration offsets from filtered axis values.
    pub fn corrected(filtered: &RawReading, offsets: &CalibrationOffsets) -> Self {
        Self {
            plus_x: filtered.plus_x - offsets.plus_x,
            minus_x: filtered.minus_x - offsets.minus_x,
            plus_y: filtered.plus_y - offsets.plus_y,
            minus_y: filtered.minus_y - offsets.minus_y,
        }
    }

    /// Sum of the absolute axis values, the total load on the sensor.
    pub fn total_load(&self) -> f64 {
        self.plus_x.abs() + self.minus_x.abs() + self.plus_y.abs() + self.minus_y.abs()
    }
}

/// Parse one raw sensor line.
///
/// Returns `Ok(None)` for a line that is empty once the delimiters and
/// surrounding whitespace are removed.
///
/// Tag text is checked as well as position: the four tokens must carry the
/// exact tags `+x`, `-x`, `+y`, `-y` in that order. A line with valid values
/// in the right slots but other tag text (`+X1.0`) is rejected.
///
/// # Errors
///
/// Any [`FrameError`] means the whole line is unusable.
pub fn parse_line(line: &str) -> Result<Option<RawReading>, FrameError> {
    let body = strip_delimiters(line);
    if body.is_empty() {
        return Ok(None);
    }

    let tokens: Vec<&str> = body.split_whitespace().collect();
    if tokens.len() != AXIS_TAGS.len() {
        return Err(FrameError::TokenCount(tokens.len()));
    }

    let mut values = [0.0f64; 4];
    for (index, (token, expected)) in tokens.iter().zip(AXIS_TAGS).enumerate() {
        values[index] = parse_token(index, token, expected)?;
    }

    Ok(Some(RawReading {
        plus_x: values[0],
        minus_x: values[1],
        plus_y: values[2],
        minus_y: values[3],
    }))
}

fn strip_delimiters(line: &str) -> &str {
    let trimmed = line.trim();
    let trimmed = trimmed.strip_prefix(FRAME_START).unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix(FRAME_END).unwrap_or(trimmed);
    trimmed.trim()
}

fn parse_token(index: usize, token: &str, expected: &'static str) -> Result<f64, FrameError> {
    let (tag, value) = match token.get(..expected.len()) {
        Some(tag) => (tag, &token[expected.len()..]),
        None => (token, ""),
    };

    if tag != expected {
        return Err(FrameError::UnexpectedTag {
            index,
            expected,
            found: tag.to_string(),
        });
    }

    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| FrameError::InvalidValue {
            index,
            value: value.to_string(),
        })
}
