//! Periodic return series derived from price bars.

use pl_types::{Bar, Symbol};
use rayon::prelude::*;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Ordered close-to-close returns for one symbol.
///
/// Never contains a non-finite value: a return whose prior close is zero or
/// not representable is dropped at derivation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnSeries {
    pub symbol: Symbol,
    pub returns: Vec<f64>,
}

impl ReturnSeries {
    /// Build a series from raw values, discarding non-finite entries.
    pub fn new(symbol: Symbol, returns: Vec<f64>) -> Self {
        let returns = returns.into_iter().filter(|r| r.is_finite()).collect();
        Self { symbol, returns }
    }

    /// Derive `r_t = (close_t - close_{t-1}) / close_{t-1}` from bars.
    ///
    /// Bars are ordered by timestamp first, so out-of-order input is accepted.
    pub fn from_bars(symbol: Symbol, bars: &[Bar]) -> Self {
        let mut closes: Vec<(chrono::DateTime<chrono::Utc>, Option<f64>)> = bars
            .iter()
            .map(|bar| (bar.timestamp, bar.close.to_f64()))
            .collect();
        closes.sort_by(|a, b| a.0.cmp(&b.0));

        let returns = closes
            .windows(2)
            .filter_map(|pair| match (pair[0].1, pair[1].1) {
                (Some(prev), Some(cur)) if prev != 0.0 => {
                    let r = (cur - prev) / prev;
                    r.is_finite().then_some(r)
                }
                _ => None,
            })
            .collect();

        Self { symbol, returns }
    }

    /// Derive return series for many symbols in parallel. Output order
    /// matches input order.
    pub fn derive_many(histories: &[(Symbol, Vec<Bar>)]) -> Vec<ReturnSeries> {
        histories
            .par_iter()
            .map(|(symbol, bars)| Self::from_bars(symbol.clone(), bars))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.returns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.returns.is_empty()
    }

    /// The most recent `n` observations (all of them if fewer exist).
    pub fn tail(&self, n: usize) -> &[f64] {
        let start = self.returns.len().saturating_sub(n);
        &self.returns[start..]
    }

    pub fn mean(&self) -> f64 {
        mean(&self.returns)
    }

    pub fn sample_std_dev(&self) -> f64 {
        sample_std_dev(&self.returns)
    }
}

/// Arithmetic mean; 0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (divisor N-1); 0 when fewer than two values.
pub fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    (ss / (values.len() - 1) as f64).sqrt()
}

/// Continuous percentile with linear interpolation between order statistics.
///
/// `q` is a fraction in `[0, 1]`. Returns `None` for an empty slice.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let q = q.clamp(0.0, 1.0);
    let rank = q * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Downside deviation of returns below `target` (divisor N-1 over the
/// shortfall observations); 0 when fewer than two fall below target.
pub fn downside_deviation(values: &[f64], target: f64) -> f64 {
    let shortfalls: Vec<f64> = values
        .iter()
        .filter(|&&r| r < target)
        .map(|r| r - target)
        .collect();
    if shortfalls.len() < 2 {
        return 0.0;
    }
    let ss: f64 = shortfalls.iter().map(|d| d * d).sum();
    (ss / (shortfalls.len() - 1) as f64).sqrt()
}
