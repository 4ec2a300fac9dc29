//! Portfolio-level risk measures.
//!
//! [`RiskMetricsEngine`] marks each position to its latest price, pulls the
//! trailing history for its symbol and aggregates VaR, drawdown,
//! concentration and volatility into a [`RiskProfile`].
//!
//! Aggregation ignores correlation between holdings: VaR contributions are
//! summed and drawdown / volatility are value-weighted averages.

use chrono::{DateTime, Utc};
use pl_data::{percentile, sample_std_dev, MarketDataSource};
use pl_types::{
    checked_total, safe_div, AnalysisWindows, Bar, ExcludedSymbol, PlResult, Position, RiskThresholds, Symbol,
};
use rayon::prelude::*;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::alerts::{Alert, AlertEvaluator, AlertLevel};

/// The four headline measures alerts are evaluated against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskMeasures {
    /// Horizon-scaled historical VaR in currency units.
    pub value_at_risk: f64,
    /// `value_at_risk` as a fraction of total value.
    pub value_at_risk_pct: f64,
    pub drawdown: f64,
    pub concentration: f64,
    /// Value-weighted daily return standard deviation.
    pub volatility: f64,
}

/// Per-position risk breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRisk {
    pub symbol: Symbol,
    pub market_value: Decimal,
    /// Share of total portfolio value.
    pub weight: f64,
    /// Horizon-scaled VaR contribution; 0 without usable history.
    pub var_contribution: f64,
    /// `None` when the symbol's history was unusable.
    pub drawdown: Option<f64>,
    pub volatility: Option<f64>,
}

/// Risk assessment of a set of positions at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskProfile {
    pub timestamp: DateTime<Utc>,
    pub total_value: Decimal,

    // --- headline measures ---
    pub value_at_risk: f64,
    pub value_at_risk_pct: f64,
    pub drawdown: f64,
    pub concentration: f64,
    pub volatility: f64,

    // --- alerts ---
    pub alert_level: AlertLevel,
    pub alerts: Vec<Alert>,

    pub positions: Vec<PositionRisk>,
    pub excluded: Vec<ExcludedSymbol>,
}

impl RiskProfile {
    /// Profile of an empty portfolio: every measure 0, Green, no alerts.
    pub fn empty(as_of: DateTime<Utc>) -> Self {
        Self::from_parts(as_of, Decimal::ZERO, RiskMeasures::default(), Vec::new(), Vec::new(), Vec::new())
    }

    fn from_parts(
        as_of: DateTime<Utc>,
        total_value: Decimal,
        measures: RiskMeasures,
        alerts: Vec<Alert>,
        positions: Vec<PositionRisk>,
        excluded: Vec<ExcludedSymbol>,
    ) -> Self {
        Self {
            timestamp: as_of,
            total_value,
            value_at_risk: measures.value_at_risk,
            value_at_risk_pct: measures.value_at_risk_pct,
            drawdown: measures.drawdown,
            concentration: measures.concentration,
            volatility: measures.volatility,
            alert_level: AlertLevel::from_alerts(&alerts),
            alerts,
            positions,
            excluded,
        }
    }

    pub fn measures(&self) -> RiskMeasures {
        RiskMeasures {
            value_at_risk: self.value_at_risk,
            value_at_risk_pct: self.value_at_risk_pct,
            drawdown: self.drawdown,
            concentration: self.concentration,
            volatility: self.volatility,
        }
    }
}

/// History-derived figures for one symbol.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SymbolRisk {
    /// Return at the `1 - confidence` percentile.
    tail_return: f64,
    drawdown: f64,
    volatility: f64,
}

enum PositionOutcome {
    Valued {
        market_value: Decimal,
        history: Option<SymbolRisk>,
        excluded: Option<ExcludedSymbol>,
    },
    Unpriced(ExcludedSymbol),
}

/// Computes [`RiskProfile`]s from positions and a market data source.
#[derive(Debug, Clone)]
pub struct RiskMetricsEngine {
    thresholds: RiskThresholds,
    windows: AnalysisWindows,
}

impl RiskMetricsEngine {
    pub fn new(thresholds: RiskThresholds, windows: AnalysisWindows) -> Self {
        Self { thresholds, windows }
    }

    pub fn thresholds(&self) -> &RiskThresholds {
        &self.thresholds
    }

    /// Assess `positions` as of `as_of`.
    ///
    /// Symbols with no price or too little history are recorded in
    /// `excluded`; any other collaborator failure aborts the assessment.
    pub fn assess(
        &self,
        positions: &[Position],
        market: &dyn MarketDataSource,
        as_of: DateTime<Utc>,
    ) -> PlResult<RiskProfile> {
        for position in positions {
            position.validate()?;
        }
        if positions.is_empty() {
            return Ok(RiskProfile::empty(as_of));
        }

        let outcomes: Vec<PlResult<PositionOutcome>> = positions
            .par_iter()
            .map(|position| self.evaluate_position(position, market))
            .collect();

        let mut valued: Vec<(Symbol, Decimal, Option<SymbolRisk>)> = Vec::with_capacity(positions.len());
        let mut excluded = Vec::new();
        for (position, outcome) in positions.iter().zip(outcomes) {
            match outcome? {
                PositionOutcome::Valued {
                    market_value,
                    history,
                    excluded: skipped,
                } => {
                    excluded.extend(skipped);
                    valued.push((position.symbol.clone(), market_value, history));
                }
                PositionOutcome::Unpriced(skipped) => excluded.push(skipped),
            }
        }

        for e in &excluded {
            warn!("Excluding {} from risk metrics: {}", e.symbol, e.reason);
        }

        let total_value = checked_total(valued.iter().map(|(_, value, _)| *value), "value")?;
        let total = total_value.to_f64().unwrap_or(0.0);
        let horizon_scale = (self.thresholds.var_horizon_days as f64).sqrt();

        // --- per position ---
        let position_risks: Vec<PositionRisk> = valued
            .iter()
            .map(|(symbol, value, history)| {
                let value_f64 = value.to_f64().unwrap_or(0.0);
                PositionRisk {
                    symbol: symbol.clone(),
                    market_value: *value,
                    weight: safe_div(value_f64, total),
                    var_contribution: history
                        .map(|h| (-h.tail_return).max(0.0) * value_f64 * horizon_scale)
                        .unwrap_or(0.0),
                    drawdown: history.map(|h| h.drawdown),
                    volatility: history.map(|h| h.volatility),
                }
            })
            .collect();

        // --- VaR ---
        let value_at_risk: f64 = position_risks.iter().map(|p| p.var_contribution).sum();

        // --- drawdown / volatility ---
        let mut history_value = 0.0;
        let mut weighted_drawdown = 0.0;
        let mut weighted_volatility = 0.0;
        for p in &position_risks {
            if let (Some(dd), Some(vol)) = (p.drawdown, p.volatility) {
                let value = p.market_value.to_f64().unwrap_or(0.0);
                history_value += value;
                weighted_drawdown += dd * value;
                weighted_volatility += vol * value;
            }
        }

        // --- concentration ---
        let largest = position_risks
            .iter()
            .map(|p| p.market_value)
            .max()
            .unwrap_or(Decimal::ZERO);

        let measures = RiskMeasures {
            value_at_risk,
            value_at_risk_pct: safe_div(value_at_risk, total),
            drawdown: safe_div(weighted_drawdown, history_value),
            concentration: safe_div(largest.to_f64().unwrap_or(0.0), total),
            volatility: safe_div(weighted_volatility, history_value),
        };

        let alerts = AlertEvaluator::evaluate(&measures, &self.thresholds, as_of);
        let profile = RiskProfile::from_parts(as_of, total_value, measures, alerts, position_risks, excluded);

        info!(
            "Risk assessment of {} positions: VaR {:.2} ({:.2}%), level {}",
            positions.len(),
            profile.value_at_risk,
            profile.value_at_risk_pct * 100.0,
            profile.alert_level
        );
        Ok(profile)
    }

    fn evaluate_position(
        &self,
        position: &Position,
        market: &dyn MarketDataSource,
    ) -> PlResult<PositionOutcome> {
        let symbol = &position.symbol;
        let price = match market.latest_price(symbol) {
            Ok(price) => price,
            Err(e) if e.is_symbol_data_issue() => {
                return Ok(PositionOutcome::Unpriced(ExcludedSymbol::new(
                    symbol.clone(),
                    e.to_string(),
                )))
            }
            Err(e) => return Err(e),
        };

        let (history, excluded) = match self.symbol_risk(symbol, market) {
            Ok(history) => (Some(history), None),
            Err(e) if e.is_symbol_data_issue() => {
                (None, Some(ExcludedSymbol::new(symbol.clone(), e.to_string())))
            }
            Err(e) => return Err(e),
        };

        Ok(PositionOutcome::Valued {
            market_value: position.market_value(price)?,
            history,
            excluded,
        })
    }

    fn symbol_risk(&self, symbol: &Symbol, market: &dyn MarketDataSource) -> PlResult<SymbolRisk> {
        let returns = market.return_series(
            symbol,
            self.windows.risk_lookback,
            self.windows.min_observations,
        )?;
        let bars = market.price_bars(symbol, self.windows.risk_lookback)?;

        let tail_return = percentile(&returns.returns, 1.0 - self.thresholds.var_confidence).unwrap_or(0.0);
        let volatility = sample_std_dev(returns.tail(self.windows.volatility_lookback));
        let drawdown = high_to_low_drawdown(&bars);

        debug!(
            "{}: tail return {:.4}, drawdown {:.4}, volatility {:.4}",
            symbol, tail_return, drawdown, volatility
        );

        Ok(SymbolRisk {
            tail_return,
            drawdown,
            volatility,
        })
    }
}

/// `(max(high) - min(close)) / max(high)` over the window; 0 when empty.
pub fn high_to_low_drawdown(bars: &[Bar]) -> f64 {
    let Some(max_high) = bars.iter().map(|b| b.high).max() else {
        return 0.0;
    };
    let min_close = bars.iter().map(|b| b.close).min().unwrap_or(max_high);
    if max_high <= Decimal::ZERO {
        return 0.0;
    }
    ((max_high - min_close) / max_high)
        .to_f64()
        .unwrap_or(0.0)
        .max(0.0)
}
