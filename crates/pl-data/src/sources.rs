//! Collaborator interfaces the engine reads market data and positions through.
//!
//! Implementations do their I/O before handing data over; the engine calls
//! these synchronously and never caches what they return.

use pl_types::{Bar, DataError, PlResult, Position, Symbol};
use rust_decimal::Decimal;

use crate::returns::ReturnSeries;

/// Source of price history and latest prices.
pub trait MarketDataSource: Send + Sync + std::fmt::Debug {
    /// The most recent `window` bars for `symbol`, oldest first.
    fn price_bars(&self, symbol: &Symbol, window: usize) -> PlResult<Vec<Bar>>;

    /// Latest traded price for `symbol`.
    fn latest_price(&self, symbol: &Symbol) -> PlResult<Decimal>;

    /// Trailing return series built from `window + 1` bars.
    ///
    /// Fails with [`DataError::InsufficientData`] when fewer than
    /// `min_observations` returns are available.
    fn return_series(
        &self,
        symbol: &Symbol,
        window: usize,
        min_observations: usize,
    ) -> PlResult<ReturnSeries> {
        let bars = self.price_bars(symbol, window + 1)?;
        let series = ReturnSeries::from_bars(symbol.clone(), &bars);
        if series.len() < min_observations {
            return Err(DataError::InsufficientData {
                symbol: symbol.to_string(),
                required: min_observations,
                available: series.len(),
            }
            .into());
        }
        Ok(series)
    }

    /// Human-readable source name for logging.
    fn name(&self) -> &str;
}

/// Source of the positions held in a portfolio.
pub trait PositionSource: Send + Sync + std::fmt::Debug {
    fn list_positions(&self, portfolio_id: &str) -> PlResult<Vec<Position>>;
}
