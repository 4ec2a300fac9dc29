//! Single-symbol return and risk statistics.

use pl_data::{downside_deviation, percentile, ReturnSeries};
use pl_types::{GuardedRatio, RiskThresholds, Symbol};
use serde::{Deserialize, Serialize};

/// Annualized statistics for one symbol over its trailing window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolRiskMetrics {
    pub symbol: Symbol,
    pub observations: usize,
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    pub sharpe_ratio: f64,
    pub sharpe_undefined: bool,
    pub sortino_ratio: f64,
    pub sortino_undefined: bool,
    /// Largest peak-to-trough decline of the closes, as a fraction.
    pub max_drawdown: f64,
    /// One-period historical VaR at the configured confidence, as a positive
    /// return fraction.
    pub value_at_risk: f64,
}

#[derive(Debug, Clone)]
pub struct SymbolMetricsCalculator {
    risk_free_rate: f64,
    var_confidence: f64,
    periods_per_year: f64,
}

impl SymbolMetricsCalculator {
    pub fn new(thresholds: &RiskThresholds, periods_per_year: f64) -> Self {
        Self {
            risk_free_rate: thresholds.risk_free_rate,
            var_confidence: thresholds.var_confidence,
            periods_per_year,
        }
    }

    /// Statistics for `series`; `closes` are the prices the series was
    /// derived from, oldest first.
    pub fn compute(&self, series: &ReturnSeries, closes: &[f64]) -> SymbolRiskMetrics {
        let periodic_rf = self.risk_free_rate / self.periods_per_year;
        let scale = self.periods_per_year.sqrt();
        let mean = series.mean();
        let sd = series.sample_std_dev();

        let sharpe = GuardedRatio::new(mean - periodic_rf, sd);
        let sortino = GuardedRatio::new(mean - periodic_rf, downside_deviation(&series.returns, periodic_rf));

        SymbolRiskMetrics {
            symbol: series.symbol.clone(),
            observations: series.len(),
            annualized_return: mean * self.periods_per_year,
            annualized_volatility: sd * scale,
            sharpe_ratio: sharpe.value * scale,
            sharpe_undefined: sharpe.undefined,
            sortino_ratio: sortino.value * scale,
            sortino_undefined: sortino.undefined,
            max_drawdown: max_drawdown(closes),
            value_at_risk: percentile(&series.returns, 1.0 - self.var_confidence)
                .map(|q| (-q).max(0.0))
                .unwrap_or(0.0),
        }
    }
}

/// Largest fall from a running peak, as a fraction of that peak.
pub fn max_drawdown(closes: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut worst: f64 = 0.0;
    for &close in closes {
        if close > peak {
            peak = close;
        } else if peak > 0.0 {
            worst = worst.max((peak - close) / peak);
        }
    }
    worst
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calculator() -> SymbolMetricsCalculator {
        SymbolMetricsCalculator::new(&RiskThresholds::default(), 252.0)
    }

    #[test]
    fn drawdown_tracks_running_peak() {
        assert_eq!(max_drawdown(&[]), 0.0);
        assert_eq!(max_drawdown(&[100.0, 110.0, 120.0]), 0.0);
        let dd = max_drawdown(&[100.0, 120.0, 90.0, 130.0, 117.0]);
        assert!((dd - 0.25).abs() < 1e-12);
    }

    #[test]
    fn constant_returns_have_undefined_sharpe() {
        let series = ReturnSeries::new(Symbol::equity("FLAT"), vec![0.001; 40]);
        let m = calculator().compute(&series, &[]);

        assert!(m.annualized_volatility < 1e-12);
        assert!(m.sharpe_undefined);
        assert_eq!(m.sharpe_ratio, 0.0);
        // nothing falls below the periodic risk-free rate
        assert!(m.sortino_undefined);
        assert_eq!(m.value_at_risk, 0.0);
    }

    #[test]
    fn annualized_statistics() {
        let returns: Vec<f64> = (0..60).map(|i| if i % 2 == 0 { 0.01 } else { -0.005 }).collect();
        let series = ReturnSeries::new(Symbol::equity("ALT"), returns.clone());
        let m = calculator().compute(&series, &[]);

        let mean = pl_data::mean(&returns);
        let sd = pl_data::sample_std_dev(&returns);
        let daily_rf = 0.02 / 252.0;
        assert!((m.annualized_return - mean * 252.0).abs() < 1e-12);
        assert!((m.annualized_volatility - sd * 252f64.sqrt()).abs() < 1e-12);
        assert!((m.sharpe_ratio - (mean - daily_rf) / sd * 252f64.sqrt()).abs() < 1e-9);
        assert!(!m.sortino_undefined);
        assert!(m.sortino_ratio > m.sharpe_ratio);
        assert!((m.value_at_risk - 0.005).abs() < 1e-12);
        assert_eq!(m.observations, 60);
    }
}
