//! Expected returns and sample covariance across a basket of symbols.

use pl_data::ReturnSeries;
use pl_types::{DataError, OptimizationError, PlResult, Symbol};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Mean vector and covariance matrix estimated from aligned return series.
///
/// `covariance` is symmetric with a non-negative diagonal; entry `(i, j)` and
/// `(j, i)` are computed from the same products and are bit-identical.
///
/// Estimates built by hand or deserialized may be malformed. The helpers
/// below read missing entries as 0; [`check_dimensions`](Self::check_dimensions)
/// reports the mismatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CovarianceEstimate {
    pub symbols: Vec<Symbol>,
    pub expected_returns: Vec<f64>,
    pub covariance: Vec<Vec<f64>>,
    /// Number of aligned observations each series was truncated to.
    pub observations: usize,
}

impl CovarianceEstimate {
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Every vector and matrix row must have one entry per symbol.
    pub fn check_dimensions(&self) -> PlResult<()> {
        let n = self.len();
        let mismatch = |actual: usize| -> PlResult<()> {
            Err(OptimizationError::DimensionMismatch { expected: n, actual }.into())
        };
        if self.expected_returns.len() != n {
            return mismatch(self.expected_returns.len());
        }
        if self.covariance.len() != n {
            return mismatch(self.covariance.len());
        }
        if let Some(row) = self.covariance.iter().find(|row| row.len() != n) {
            return mismatch(row.len());
        }
        Ok(())
    }

    fn entry(&self, i: usize, j: usize) -> f64 {
        self.covariance
            .get(i)
            .and_then(|row| row.get(j))
            .copied()
            .unwrap_or(0.0)
    }

    /// Scale per-period estimates to annual figures.
    pub fn annualized(&self, periods_per_year: f64) -> Self {
        Self {
            symbols: self.symbols.clone(),
            expected_returns: self
                .expected_returns
                .iter()
                .map(|m| m * periods_per_year)
                .collect(),
            covariance: self
                .covariance
                .iter()
                .map(|row| row.iter().map(|c| c * periods_per_year).collect())
                .collect(),
            observations: self.observations,
        }
    }

    /// Standard deviation of each symbol.
    pub fn volatilities(&self) -> Vec<f64> {
        (0..self.len()).map(|i| self.entry(i, i).max(0.0).sqrt()).collect()
    }

    /// Pearson correlation matrix. Pairs involving a zero-variance series
    /// correlate at 0; the diagonal is always 1.
    pub fn correlation(&self) -> Vec<Vec<f64>> {
        let vols = self.volatilities();
        let n = self.len();
        (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| {
                        if i == j {
                            1.0
                        } else {
                            let denom = vols[i] * vols[j];
                            if denom > 0.0 {
                                (self.entry(i, j) / denom).clamp(-1.0, 1.0)
                            } else {
                                0.0
                            }
                        }
                    })
                    .collect()
            })
            .collect()
    }

    pub fn portfolio_return(&self, weights: &[f64]) -> f64 {
        weights
            .iter()
            .zip(&self.expected_returns)
            .map(|(w, m)| w * m)
            .sum()
    }

    pub fn portfolio_variance(&self, weights: &[f64]) -> f64 {
        let mut variance = 0.0;
        for (i, wi) in weights.iter().enumerate() {
            for (j, wj) in weights.iter().enumerate() {
                variance += wi * wj * self.entry(i, j);
            }
        }
        variance.max(0.0)
    }

    /// `Σw`, the covariance matrix applied to a weight vector.
    pub fn covariance_times(&self, weights: &[f64]) -> Vec<f64> {
        self.covariance
            .iter()
            .map(|row| row.iter().zip(weights).map(|(c, w)| c * w).sum())
            .collect()
    }
}

/// Sample mean / covariance estimator with a minimum-history requirement.
#[derive(Debug, Clone)]
pub struct CovarianceEstimator {
    min_observations: usize,
}

impl CovarianceEstimator {
    pub fn new(min_observations: usize) -> Self {
        Self {
            min_observations: min_observations.max(2),
        }
    }

    /// Estimate μ and Σ (divisor N-1).
    ///
    /// Every series must carry at least `min_observations` returns. Longer
    /// series are truncated to the shortest length, keeping the most recent
    /// observations.
    pub fn estimate(&self, series: &[ReturnSeries]) -> PlResult<CovarianceEstimate> {
        if series.is_empty() {
            return Err(OptimizationError::NoSymbols.into());
        }

        for s in series {
            if s.len() < self.min_observations {
                return Err(DataError::InsufficientData {
                    symbol: s.symbol.to_string(),
                    required: self.min_observations,
                    available: s.len(),
                }
                .into());
            }
        }

        let observations = series.iter().map(|s| s.len()).min().unwrap_or(0);
        let aligned: Vec<&[f64]> = series.iter().map(|s| s.tail(observations)).collect();

        let expected_returns: Vec<f64> = aligned.par_iter().map(|r| pl_data::mean(r)).collect();

        let centered: Vec<Vec<f64>> = aligned
            .par_iter()
            .zip(expected_returns.par_iter())
            .map(|(r, m)| r.iter().map(|x| x - m).collect())
            .collect();

        let divisor = (observations - 1) as f64;
        let n = centered.len();
        let covariance: Vec<Vec<f64>> = (0..n)
            .into_par_iter()
            .map(|i| {
                (0..n)
                    .map(|j| {
                        let dot: f64 = centered[i]
                            .iter()
                            .zip(&centered[j])
                            .map(|(a, b)| a * b)
                            .sum();
                        dot / divisor
                    })
                    .collect()
            })
            .collect();

        debug!(
            "Estimated covariance for {} symbols over {} observations",
            n, observations
        );

        Ok(CovarianceEstimate {
            symbols: series.iter().map(|s| s.symbol.clone()).collect(),
            expected_returns,
            covariance,
            observations,
        })
    }
}

impl Default for CovarianceEstimator {
    fn default() -> Self {
        Self::new(30)
    }
}
