//! Static risk configuration shared by every analysis.

use serde::{Deserialize, Serialize};

use crate::errors::{PlError, PlResult};

/// Risk thresholds and optimizer bounds.
///
/// Read-only for the lifetime of an engine; every call receives it explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskThresholds {
    /// Annualized risk-free rate.
    pub risk_free_rate: f64,
    /// Lower bound for each optimized weight.
    pub min_weight: f64,
    /// Upper bound for each optimized weight.
    pub max_weight: f64,
    /// Confidence level for historical VaR (0.95 ⇒ 5th percentile).
    pub var_confidence: f64,
    /// VaR horizon in trading days, scaled with the square-root-of-time rule.
    pub var_horizon_days: u32,
    /// Drawdown limit; also the limit VaR (as a fraction of value) is held to.
    pub max_drawdown: f64,
    /// Largest share of portfolio value allowed in one position.
    pub max_concentration: f64,
    /// Daily return standard deviation above which volatility is flagged.
    pub daily_volatility: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.02,
            min_weight: 0.0,
            max_weight: 0.4,
            var_confidence: 0.95,
            var_horizon_days: 10,
            max_drawdown: 0.15,
            max_concentration: 0.30,
            daily_volatility: 0.02,
        }
    }
}

impl RiskThresholds {
    pub fn validate(&self) -> PlResult<()> {
        if !self.risk_free_rate.is_finite() {
            return Err(PlError::Config("risk_free_rate must be finite".into()));
        }
        if !(0.0..=1.0).contains(&self.min_weight) || !(0.0..=1.0).contains(&self.max_weight) {
            return Err(PlError::Config(format!(
                "weight bounds must lie in [0, 1], got [{}, {}]",
                self.min_weight, self.max_weight
            )));
        }
        if self.min_weight > self.max_weight {
            return Err(PlError::Config(format!(
                "min_weight {} exceeds max_weight {}",
                self.min_weight, self.max_weight
            )));
        }
        if !(self.var_confidence > 0.0 && self.var_confidence < 1.0) {
            return Err(PlError::Config(format!(
                "var_confidence must lie in (0, 1), got {}",
                self.var_confidence
            )));
        }
        if self.var_horizon_days == 0 {
            return Err(PlError::Config("var_horizon_days must be at least 1".into()));
        }
        for (name, value) in [
            ("max_drawdown", self.max_drawdown),
            ("max_concentration", self.max_concentration),
            ("daily_volatility", self.daily_volatility),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(PlError::Config(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Lookback windows used when pulling history from collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisWindows {
    /// Bars used for VaR, drawdown and covariance estimation.
    pub risk_lookback: usize,
    /// Bars used for the trailing volatility figure.
    pub volatility_lookback: usize,
    /// Minimum return observations before a series is usable.
    pub min_observations: usize,
}

impl Default for AnalysisWindows {
    fn default() -> Self {
        Self {
            risk_lookback: 252,
            volatility_lookback: 30,
            min_observations: 30,
        }
    }
}

impl AnalysisWindows {
    pub fn validate(&self) -> PlResult<()> {
        if self.min_observations < 2 {
            return Err(PlError::Config(
                "min_observations must be at least 2 for a sample covariance".into(),
            ));
        }
        if self.risk_lookback <= self.min_observations {
            return Err(PlError::Config(format!(
                "risk_lookback {} must exceed min_observations {}",
                self.risk_lookback, self.min_observations
            )));
        }
        if self.volatility_lookback < 2 {
            return Err(PlError::Config("volatility_lookback must be at least 2".into()));
        }
        Ok(())
    }
}
