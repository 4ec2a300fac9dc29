//! Mark-to-market portfolio totals.

use chrono::{DateTime, Utc};
use pl_data::MarketDataSource;
use pl_types::{
    checked_total, decimal_ratio, AnalysisWindows, ExcludedSymbol, GuardedRatio, PlError, PlResult,
    PortfolioSnapshot, Position, PositionValuation, RiskThresholds, TrailingReturns,
};
use rayon::prelude::*;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::performance::{diversification_score, holdings_value_series, trailing_returns};

/// Values positions at their latest prices and derives portfolio P&L,
/// volatility, Sharpe ratio, diversification and trailing returns.
#[derive(Debug, Clone)]
pub struct PortfolioMetricsAggregator {
    thresholds: RiskThresholds,
    windows: AnalysisWindows,
}

impl PortfolioMetricsAggregator {
    pub fn new(thresholds: RiskThresholds, windows: AnalysisWindows) -> Self {
        Self { thresholds, windows }
    }

    /// Snapshot of `positions` as of `as_of`.
    ///
    /// Positions without a latest price are left out of the totals and
    /// listed in `excluded`; symbols without enough history only drop out of
    /// the volatility figure. Other collaborator failures propagate.
    pub fn snapshot(
        &self,
        positions: &[Position],
        market: &dyn MarketDataSource,
        as_of: DateTime<Utc>,
    ) -> PlResult<PortfolioSnapshot> {
        for position in positions {
            position.validate()?;
        }

        let priced: Vec<PlResult<Option<PositionValuation>>> = positions
            .par_iter()
            .map(|p| match market.latest_price(&p.symbol) {
                Ok(price) => PositionValuation::new(p, price).map(Some),
                Err(e) if e.is_symbol_data_issue() => Ok(None),
                Err(e) => Err(e),
            })
            .collect();

        let mut valuations = Vec::with_capacity(positions.len());
        let mut excluded = Vec::new();
        for (position, valuation) in positions.iter().zip(priced) {
            match valuation? {
                Some(v) => valuations.push(v),
                None => {
                    warn!("No price for {}; left out of portfolio totals", position.symbol);
                    excluded.push(ExcludedSymbol::new(position.symbol.clone(), "no latest price"));
                }
            }
        }

        let total_value = checked_total(valuations.iter().map(|v| v.market_value), "value")?;
        let total_pnl = checked_total(valuations.iter().map(|v| v.unrealized_pnl), "P&L")?;
        let cost_basis = total_value
            .checked_sub(total_pnl)
            .ok_or_else(|| PlError::Validation("portfolio cost basis is out of range".into()))?;

        let (pnl_percentage, total_return) = if cost_basis > Decimal::ZERO {
            let fraction = decimal_ratio(total_pnl, cost_basis);
            (fraction * 100.0, fraction)
        } else {
            (0.0, 0.0)
        };

        let (volatility, unusable) = self.weighted_volatility(&valuations, market)?;
        excluded.extend(unusable);
        let sharpe = GuardedRatio::new(total_return - self.thresholds.risk_free_rate, volatility);
        let values: Vec<f64> = valuations.iter().map(|v| v.market_value_f64()).collect();
        let diversification = diversification_score(&values);
        let trailing_returns = self.trailing_returns(&valuations, market)?;

        info!(
            "Portfolio snapshot: {} positions, value {}, pnl {} ({:.2}%)",
            valuations.len(),
            total_value,
            total_pnl,
            pnl_percentage
        );

        Ok(PortfolioSnapshot {
            timestamp: as_of,
            total_value,
            total_pnl,
            pnl_percentage,
            total_return,
            volatility,
            sharpe_ratio: sharpe.value,
            sharpe_undefined: sharpe.undefined,
            diversification,
            trailing_returns,
            positions: valuations,
            excluded,
        })
    }

    /// Trailing returns of the current holdings, valued at each past close.
    /// Holdings without at least two bars of history are left out.
    fn trailing_returns(
        &self,
        valuations: &[PositionValuation],
        market: &dyn MarketDataSource,
    ) -> PlResult<TrailingReturns> {
        let window = TrailingReturns::HORIZONS[TrailingReturns::HORIZONS.len() - 1] + 1;

        let histories: Vec<PlResult<Option<(f64, Vec<f64>)>>> = valuations
            .par_iter()
            .map(|v| match market.price_bars(&v.symbol, window) {
                Ok(bars) => {
                    let closes: Vec<f64> = bars.iter().filter_map(|b| b.close.to_f64()).collect();
                    let quantity = v.quantity.to_f64().unwrap_or(0.0);
                    Ok((closes.len() >= 2).then_some((quantity, closes)))
                }
                Err(e) if e.is_symbol_data_issue() => Ok(None),
                Err(e) => Err(e),
            })
            .collect();

        let mut holdings = Vec::with_capacity(histories.len());
        for (valuation, history) in valuations.iter().zip(histories) {
            match history? {
                Some(h) => holdings.push(h),
                None => debug!("No price history for {}; left out of trailing returns", valuation.symbol),
            }
        }
        Ok(trailing_returns(&holdings_value_series(&holdings)))
    }

    /// Value-weighted trailing standard deviation, normalized over the
    /// positions whose history was usable.
    fn weighted_volatility(
        &self,
        valuations: &[PositionValuation],
        market: &dyn MarketDataSource,
    ) -> PlResult<(f64, Vec<ExcludedSymbol>)> {
        let lookback = self.windows.volatility_lookback;
        let required = self.windows.min_observations.min(lookback);

        let per_position: Vec<PlResult<Option<f64>>> = valuations
            .par_iter()
            .map(|v| match market.return_series(&v.symbol, lookback, required) {
                Ok(series) => Ok(Some(series.sample_std_dev())),
                Err(e) if e.is_symbol_data_issue() => Ok(None),
                Err(e) => Err(e),
            })
            .collect();

        let mut excluded = Vec::new();
        let mut weighted = 0.0;
        let mut covered = 0.0;
        for (valuation, vol) in valuations.iter().zip(per_position) {
            match vol? {
                Some(vol) => {
                    let value = valuation.market_value_f64();
                    weighted += vol * value;
                    covered += value;
                }
                None => {
                    warn!("No usable history for {}; left out of volatility", valuation.symbol);
                    excluded.push(ExcludedSymbol::new(
                        valuation.symbol.clone(),
                        format!("fewer than {} returns in the last {} periods", required, lookback),
                    ));
                }
            }
        }

        let volatility = if covered > 0.0 { weighted / covered } else { 0.0 };
        Ok((volatility, excluded))
    }
}
