//! In-memory market data and position store.
//!
//! Hosts preload bars and prices here (from CSV, a database, a feed) and hand
//! the store to the engine as its [`MarketDataSource`].

use dashmap::DashMap;
use pl_types::{Bar, DataError, PlResult, Position, Symbol};
use rust_decimal::Decimal;
use tracing::debug;

use crate::sources::{MarketDataSource, PositionSource};

/// Thread-safe store keyed by symbol.
#[derive(Debug, Default)]
pub struct InMemoryMarketData {
    bars: DashMap<Symbol, Vec<Bar>>,
    price_overrides: DashMap<Symbol, Decimal>,
}

impl InMemoryMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the history for a symbol. Bars are kept ordered by timestamp;
    /// the last close serves as the latest price unless one was set
    /// explicitly.
    pub fn insert_bars(&self, symbol: Symbol, mut bars: Vec<Bar>) {
        bars.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        debug!("Stored {} bars for {}", bars.len(), symbol);
        self.bars.insert(symbol, bars);
    }

    /// Override the latest price for a symbol.
    pub fn set_latest_price(&self, symbol: Symbol, price: Decimal) {
        self.price_overrides.insert(symbol, price);
    }

    pub fn symbols(&self) -> Vec<Symbol> {
        let mut symbols: Vec<Symbol> = self.bars.iter().map(|e| e.key().clone()).collect();
        symbols.sort();
        symbols
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

impl MarketDataSource for InMemoryMarketData {
    fn price_bars(&self, symbol: &Symbol, window: usize) -> PlResult<Vec<Bar>> {
        let entry = self.bars.get(symbol).ok_or_else(|| DataError::SymbolNotFound {
            symbol: symbol.to_string(),
        })?;
        let start = entry.len().saturating_sub(window);
        Ok(entry[start..].to_vec())
    }

    fn latest_price(&self, symbol: &Symbol) -> PlResult<Decimal> {
        if let Some(price) = self.price_overrides.get(symbol) {
            return Ok(*price);
        }
        self.bars
            .get(symbol)
            .and_then(|bars| bars.last().map(|bar| bar.close))
            .ok_or_else(|| {
                DataError::SymbolNotFound {
                    symbol: symbol.to_string(),
                }
                .into()
            })
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}

/// Positions grouped by portfolio identifier.
#[derive(Debug, Default)]
pub struct InMemoryPositions {
    positions: DashMap<String, Vec<Position>>,
}

impl InMemoryPositions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, position: Position) {
        self.positions
            .entry(position.portfolio_id.clone())
            .or_default()
            .push(position);
    }
}

impl PositionSource for InMemoryPositions {
    fn list_positions(&self, portfolio_id: &str) -> PlResult<Vec<Position>> {
        Ok(self
            .positions
            .get(portfolio_id)
            .map(|p| p.clone())
            .unwrap_or_default())
    }
}
