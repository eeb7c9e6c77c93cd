//! Force vector construction.
//!
//! Each axis contributes a component vector whose in-plane part is its signed
//! value along its own direction and whose out-of-plane (z) part is the same
//! value:
//!
//! ```text
//! −x → (−m, 0, m)    +x → (p, 0, p)
//! −y → (0, −n, n)    +y → (0, q, q)
//! ```
//!
//! The sum of the four gives the direction (load balance). The length is then
//! forced to `|p| + |m| + |n| + |q|` (total load), not the geometric length of
//! the sum. Downstream consumers rely on that total-load reading.

use crate::data::frame::Frame;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Summed vectors shorter than this have no usable direction.
const DIRECTION_EPSILON: f64 = 1e-12;

/// 3D load vector derived from a [`Frame`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForceVector(Vector3<f64>);

impl ForceVector {
    /// Zero load.
    pub fn zero() -> Self {
        Self(Vector3::zeros())
    }

    /// Build the load vector for one frame.
    ///
    /// An all-zero frame gives the zero vector. A loaded frame whose
    /// components cancel out points along +z, so the length still equals the
    /// total load.
    pub fn from_frame(frame: &Frame) -> Self {
        let magnitude = frame.total_load();
        if magnitude == 0.0 {
            return Self::zero();
        }

        let components = [
            Vector3::new(-frame.minus_x, 0.0, frame.minus_x),
            Vector3::new(frame.plus_x, 0.0, frame.plus_x),
            Vector3::new(0.0, -frame.minus_y, frame.minus_y),
            Vector3::new(0.0, frame.plus_y, frame.plus_y),
        ];
        let sum = components
            .iter()
            .fold(Vector3::zeros(), |acc, component| acc + component);

        let direction = sum
            .try_normalize(DIRECTION_EPSILON)
            .unwrap_or_else(Vector3::z);
        Self(direction * magnitude)
    }

    /// Length of the vector, the total load.
    pub fn magnitude(&self) -> f64 {
        self.0.norm()
    }

    /// Unit direction, `None` for the zero vector.
    pub fn direction(&self) -> Option<Vector3<f64>> {
        self.0.try_normalize(DIRECTION_EPSILON)
    }

    /// X component
    pub fn x(&self) -> f64 {
        self.0.x
    }

    /// Y component
    pub fn y(&self) -> f64 {
        self.0.y
    }

    /// Z component
    pub fn z(&self) -> f64 {
        self.0.z
    }

    /// Underlying nalgebra vector.
    pub fn as_vector(&self) -> &Vector3<f64> {
        &self.0
    }
}

impl Default for ForceVector {
    fn default() -> Self {
        Self::zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-9;

    fn frame(plus_x: f64, minus_x: f64, plus_y: f64, minus_y: f64) -> Frame {
        Frame {
            plus_x,
            minus_x,
            plus_y,
            minus_y,
        }
    }

    #[test]
    fn all_zero_frame_gives_zero_vector() {
        let vector = ForceVector::from_frame(&Frame::default());
        assert_eq!(vector, ForceVector::zero());
        assert_eq!(vector.magnitude(), 0.0);
        assert!(vector.direction().is_none());
    }

    #[test]
    fn magnitude_is_total_load_for_every_sign_combination() {
        let magnitudes = [0.0, 0.7, 2.5, 11.0];
        for signs in 0..16u32 {
            let value = |axis: u32| {
                let sign = if signs & (1 << axis) == 0 { 1.0 } else { -1.0 };
                sign * magnitudes[axis as usize] + sign * 0.1 * f64::from(axis)
            };
            let f = frame(value(0), value(1), value(2), value(3));
            let vector = ForceVector::from_frame(&f);
            assert!(
                (vector.magnitude() - f.total_load()).abs() < TOLERANCE,
                "frame {:?} gave {}",
                f,
                vector.magnitude()
            );
        }
    }

    #[test]
    fn single_axis_points_along_its_diagonal() {
        let vector = ForceVector::from_frame(&frame(2.0, 0.0, 0.0, 0.0));
        let expected = 2.0 / 2f64.sqrt();
        assert!((vector.x() - expected).abs() < TOLERANCE);
        assert!(vector.y().abs() < TOLERANCE);
        assert!((vector.z() - expected).abs() < TOLERANCE);
    }

    #[test]
    fn balanced_load_points_straight_up() {
        let vector = ForceVector::from_frame(&frame(1.0, 1.0, 1.0, 1.0));
        assert!(vector.x().abs() < TOLERANCE);
        assert!(vector.y().abs() < TOLERANCE);
        assert!((vector.z() - 4.0).abs() < TOLERANCE);
    }

    #[test]
    fn magnitude_overrides_geometric_length() {
        let f = frame(3.0, 0.0, 0.0, 4.0);
        // Raw sum is (3, -4, 7) with length ~8.6; total load is 7
        let vector = ForceVector::from_frame(&f);
        assert!((vector.magnitude() - 7.0).abs() < TOLERANCE);
        let direction = vector.direction().unwrap();
        let raw = Vector3::new(3.0, -4.0, 7.0).normalize();
        assert!((direction - raw).norm() < TOLERANCE);
    }

    #[test]
    fn cancelling_components_fall_back_to_vertical() {
        // Sum is exactly zero while the sensor is loaded
        let f = frame(1.0, 1.0, -1.0, -1.0);
        let vector = ForceVector::from_frame(&f);
        assert!((vector.magnitude() - 4.0).abs() < TOLERANCE);
        assert!((vector.z() - 4.0).abs() < TOLERANCE);
    }
}
