//! Signal processing for force samples: parsing, filtering, calibration,
//! vector construction and history.
pub mod calibration;
pub mod filter;
pub mod frame;
pub mod history;
pub mod vector;

pub use calibration::CalibrationOffsets;
pub use filter::{AxisFilter, AxisFilterBank};
pub use frame::{parse_line, Frame, RawReading};
pub use history::{HistoryBuffer, HistoryEntry, HistoryReader};
pub use vector::ForceVector;
