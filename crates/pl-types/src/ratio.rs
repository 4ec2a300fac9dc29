//! Risk-adjusted ratios with a defined value for a zero denominator.

use serde::{Deserialize, Serialize};

/// Denominators at or below this magnitude are treated as zero.
pub const RATIO_EPSILON: f64 = 1e-12;

/// A ratio such as Sharpe or Sortino.
///
/// When the risk denominator is zero (or not finite) the ratio is reported as
/// `0.0` with `undefined = true` instead of an infinity or NaN.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GuardedRatio {
    pub value: f64,
    pub undefined: bool,
}

impl GuardedRatio {
    pub fn new(numerator: f64, denominator: f64) -> Self {
        if !denominator.is_finite() || denominator.abs() <= RATIO_EPSILON || !numerator.is_finite() {
            return Self::undefined();
        }
        Self {
            value: numerator / denominator,
            undefined: false,
        }
    }

    pub fn undefined() -> Self {
        Self {
            value: 0.0,
            undefined: true,
        }
    }
}

/// `numerator / denominator`, or 0 when the denominator is zero.
pub fn safe_div(numerator: f64, denominator: f64) -> f64 {
    if denominator.abs() <= RATIO_EPSILON || !denominator.is_finite() {
        0.0
    } else {
        numerator / denominator
    }
}
