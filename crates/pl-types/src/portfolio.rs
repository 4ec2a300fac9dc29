use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::{PlError, PlResult};
use crate::market::Symbol;

/// A held position as recorded by the host application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub portfolio_id: String,
    pub symbol: Symbol,
    pub quantity: Decimal,
    pub entry_price: Decimal,
}

impl Position {
    pub fn new(portfolio_id: &str, symbol: Symbol, quantity: Decimal, entry_price: Decimal) -> Self {
        Self {
            portfolio_id: portfolio_id.to_string(),
            symbol,
            quantity,
            entry_price,
        }
    }

    /// Quantity and entry price must both be strictly positive.
    pub fn validate(&self) -> PlResult<()> {
        if self.quantity <= Decimal::ZERO {
            return Err(PlError::Validation(format!(
                "position {} has non-positive quantity {}",
                self.symbol, self.quantity
            )));
        }
        if self.entry_price <= Decimal::ZERO {
            return Err(PlError::Validation(format!(
                "position {} has non-positive entry price {}",
                self.symbol, self.entry_price
            )));
        }
        self.cost_basis()?;
        Ok(())
    }

    /// Quantity times entry price; fails instead of overflowing.
    pub fn cost_basis(&self) -> PlResult<Decimal> {
        self.quantity.checked_mul(self.entry_price).ok_or_else(|| {
            PlError::Validation(format!(
                "position {} cost basis {} x {} is out of range",
                self.symbol, self.quantity, self.entry_price
            ))
        })
    }

    /// Quantity times `market_price`; fails instead of overflowing.
    pub fn market_value(&self, market_price: Decimal) -> PlResult<Decimal> {
        self.quantity.checked_mul(market_price).ok_or_else(|| {
            PlError::Validation(format!(
                "position {} value {} x {} is out of range",
                self.symbol, self.quantity, market_price
            ))
        })
    }
}

/// Exact sum of `values`, or a validation error naming `what` on overflow.
pub fn checked_total<I>(values: I, what: &str) -> PlResult<Decimal>
where
    I: IntoIterator<Item = Decimal>,
{
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(v))
        .ok_or_else(|| PlError::Validation(format!("portfolio {} is out of range", what)))
}

/// `numerator / denominator` as `f64`, falling back to float division when
/// the exact quotient does not fit a `Decimal`. 0 for a zero denominator.
pub fn decimal_ratio(numerator: Decimal, denominator: Decimal) -> f64 {
    if denominator.is_zero() {
        return 0.0;
    }
    numerator
        .checked_div(denominator)
        .and_then(|q| q.to_f64())
        .unwrap_or_else(|| {
            let den = denominator.to_f64().unwrap_or(0.0);
            if den == 0.0 {
                0.0
            } else {
                numerator.to_f64().unwrap_or(0.0) / den
            }
        })
}

/// A position marked to its latest price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionValuation {
    pub symbol: Symbol,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub current_price: Decimal,
    pub market_value: Decimal,
    pub unrealized_pnl: Decimal,
    /// Unrealized P&L relative to cost basis, in percent.
    pub pnl_percentage: f64,
}

impl PositionValuation {
    pub fn new(position: &Position, current_price: Decimal) -> PlResult<Self> {
        let market_value = position.market_value(current_price)?;
        let cost_basis = position.cost_basis()?;
        let unrealized_pnl = market_value.checked_sub(cost_basis).ok_or_else(|| {
            PlError::Validation(format!("position {} P&L is out of range", position.symbol))
        })?;
        let pnl_percentage = decimal_ratio(unrealized_pnl, cost_basis) * 100.0;

        Ok(Self {
            symbol: position.symbol.clone(),
            quantity: position.quantity,
            entry_price: position.entry_price,
            current_price,
            market_value,
            unrealized_pnl,
            pnl_percentage,
        })
    }

    pub fn market_value_f64(&self) -> f64 {
        self.market_value.to_f64().unwrap_or(0.0)
    }
}

/// A symbol left out of an analysis, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedSymbol {
    pub symbol: Symbol,
    pub reason: String,
}

impl ExcludedSymbol {
    pub fn new(symbol: Symbol, reason: impl Into<String>) -> Self {
        Self {
            symbol,
            reason: reason.into(),
        }
    }
}

/// Portfolio totals recomputed on every call; never persisted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub timestamp: DateTime<Utc>,
    pub total_value: Decimal,
    pub total_pnl: Decimal,
    /// Total P&L relative to cost basis, in percent.
    pub pnl_percentage: f64,
    /// Total P&L relative to cost basis, as a fraction.
    pub total_return: f64,
    /// Value-weighted daily return standard deviation.
    pub volatility: f64,
    pub sharpe_ratio: f64,
    /// Set when volatility is zero and the Sharpe ratio is the 0 sentinel.
    pub sharpe_undefined: bool,
    /// One minus the Herfindahl index of position weights: 0 for a single
    /// holding (or none), approaching 1 as value spreads out.
    pub diversification: f64,
    pub trailing_returns: TrailingReturns,
    pub positions: Vec<PositionValuation>,
    pub excluded: Vec<ExcludedSymbol>,
}

/// Returns of the current holdings over the last 1, 5, 21 and 252 bars.
///
/// A horizon is `None` when the shared history is too short to reach back
/// that far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrailingReturns {
    pub daily: Option<f64>,
    pub weekly: Option<f64>,
    pub monthly: Option<f64>,
    pub yearly: Option<f64>,
}

impl TrailingReturns {
    /// Bars spanned by each horizon, in field order.
    pub const HORIZONS: [usize; 4] = [1, 5, 21, 252];
}
