//! Scalar recursive estimator (one-dimensional Kalman filter) for a single sensor axis.
//!
//! The sensor reports a static load, so the state model is a constant:
//! every measurement `z` is blended into the estimate `x̂` with a gain `K`
//! derived from the running error covariance `P`, the process variance `q`
//! and the measurement variance `r`:
//!
//! ```text
//! K  = P / (P + r)
//! x̂ ← x̂ + K·(z − x̂)
//! P  ← (1 − K)·P
//! P  ← P + q          (time update: prior for the next measurement)
//! ```
//!
//! `P` starts at `r`, which is the prior of the very first measurement, so the
//! first gain is exactly one half.

use crate::config::FilterConfig;
use crate::data::frame::RawReading;
use serde::Serialize;

/// One axis worth of filter state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AxisFilter {
    estimate: f64,
    error_covariance: f64,
    process_variance: f64,
    measurement_variance: f64,
    last_gain: Option<f64>,
}

impl AxisFilter {
    /// Create a filter with estimate 0 and covariance `measurement_variance`.
    pub fn new(process_variance: f64, measurement_variance: f64) -> Self {
        Self {
            estimate: 0.0,
            error_covariance: measurement_variance,
            process_variance,
            measurement_variance,
            last_gain: None,
        }
    }

    /// Blend in one raw measurement and return the updated estimate.
    pub fn update(&mut self, measurement: f64) -> f64 {
        let gain = self.error_covariance / (self.error_covariance + self.measurement_variance);
        self.estimate += gain * (measurement - self.estimate);
        self.error_covariance = ((1.0 - gain) * self.error_covariance).max(0.0);
        // q lands after the update so the first gain (P = r) is exactly 0.5
        self.error_covariance += self.process_variance;
        self.last_gain = Some(gain);
        self.estimate
    }

    /// Current estimate.
    pub fn estimate(&self) -> f64 {
        self.estimate
    }

    /// Prior error covariance for the next measurement.
    pub fn error_covariance(&self) -> f64 {
        self.error_covariance
    }

    /// Gain applied by the most recent update, `None` before the first one.
    pub fn last_gain(&self) -> Option<f64> {
        self.last_gain
    }
}

/// The four per-axis filters, in wire order (+x, −x, +y, −y).
#[derive(Debug, Clone, PartialEq)]
pub struct AxisFilterBank {
    /// Filter of the +x axis
    pub plus_x: AxisFilter,
    /// Filter of the −x axis
    pub minus_x: AxisFilter,
    /// Filter of the +y axis
    pub plus_y: AxisFilter,
    /// Filter of the −y axis
    pub minus_y: AxisFilter,
}

impl AxisFilterBank {
    /// Build four identical filters from configuration.
    pub fn new(config: &FilterConfig) -> Self {
        let filter = AxisFilter::new(config.process_variance, config.measurement_variance);
        Self {
            plus_x: filter,
            minus_x: filter,
            plus_y: filter,
            minus_y: filter,
        }
    }

    /// Filter each raw axis value independently.
    pub fn apply(&mut self, raw: &RawReading) -> RawReading {
        RawReading {
            plus_x: self.plus_x.update(raw.plus_x),
            minus_x: self.minus_x.update(raw.minus_x),
            plus_y: self.plus_y.update(raw.plus_y),
            minus_y: self.minus_y.update(raw.minus_y),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const Q: f64 = 1e-2;
    const R: f64 = 0.0025;

    #[test]
    fn first_gain_is_one_half() {
        let mut filter = AxisFilter::new(Q, R);
        assert_eq!(filter.last_gain(), None);

        let estimate = filter.update(2.0);

        assert_eq!(filter.last_gain(), Some(0.5));
        assert_eq!(estimate, 1.0);
    }

    #[test]
    fn second_gain_includes_process_variance() {
        let mut filter = AxisFilter::new(Q, R);
        filter.update(2.0);
        assert!((filter.error_covariance() - (0.5 * R + Q)).abs() < 1e-15);

        filter.update(2.0);
        let prior = 0.5 * R + Q;
        let expected = prior / (prior + R);
        assert!((filter.last_gain().unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn converges_to_constant_measurement() {
        let mut filter = AxisFilter::new(Q, R);
        for _ in 0..200 {
            filter.update(3.75);
        }
        assert!((filter.estimate() - 3.75).abs() < 1e-9);
    }

    #[test]
    fn covariance_stays_non_negative() {
        let mut filter = AxisFilter::new(Q, R);
        for i in 0..1000 {
            let z = if i % 2 == 0 { 100.0 } else { -100.0 };
            filter.update(z);
            assert!(filter.error_covariance() >= 0.0);
        }
    }

    #[test]
    fn covariance_settles_to_steady_state() {
        let mut filter = AxisFilter::new(Q, R);
        for _ in 0..100 {
            filter.update(1.0);
        }
        let settled = filter.error_covariance();
        filter.update(1.0);
        assert!((filter.error_covariance() - settled).abs() < 1e-12);
        // Steady-state prior lies between q and q + r
        assert!(settled > Q && settled < Q + R);
    }

    #[test]
    fn bank_filters_axes_independently() {
        let mut bank = AxisFilterBank::new(&FilterConfig {
            process_variance: Q,
            measurement_variance: R,
        });
        let out = bank.apply(&RawReading {
            plus_x: 2.0,
            minus_x: -4.0,
            plus_y: 0.0,
            minus_y: 8.0,
        });
        assert_eq!(out.plus_x, 1.0);
        assert_eq!(out.minus_x, -2.0);
        assert_eq!(out.plus_y, 0.0);
        assert_eq!(out.minus_y, 4.0);

        // Feeding only +x again leaves other axes' covariance untouched
        let minus_x_before = bank.minus_x;
        bank.plus_x.update(2.0);
        assert_eq!(bank.minus_x, minus_x_before);
    }
}
