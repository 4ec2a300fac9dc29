use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::PlError;

/// A listed instrument: ticker plus the venue it trades on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol {
    pub ticker: String,
    pub exchange: String,
    pub asset_class: AssetClass,
}

impl Symbol {
    pub fn new(ticker: &str, exchange: &str, asset_class: AssetClass) -> Self {
        Self {
            ticker: ticker.to_uppercase(),
            exchange: exchange.to_uppercase(),
            asset_class,
        }
    }

    pub fn equity(ticker: &str) -> Self {
        AssetClass::Equity.listing(ticker)
    }

    pub fn crypto(ticker: &str) -> Self {
        AssetClass::Crypto.listing(ticker)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.exchange, self.ticker)
    }
}

/// Parses `AAPL` (an equity on its default venue) or `EXCHANGE:TICKER`.
/// Known crypto venues yield crypto symbols; anything else is an equity.
impl FromStr for Symbol {
    type Err = PlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (exchange, ticker) = match s.trim().split_once(':') {
            Some((exchange, ticker)) => (Some(exchange.trim()), ticker.trim()),
            None => (None, s.trim()),
        };
        if ticker.is_empty() || exchange.is_some_and(str::is_empty) {
            return Err(PlError::Validation(format!("malformed symbol {:?}", s)));
        }
        Ok(match exchange {
            None => Symbol::equity(ticker),
            Some(venue) => {
                let asset_class = if venue.eq_ignore_ascii_case(AssetClass::Crypto.default_exchange()) {
                    AssetClass::Crypto
                } else {
                    AssetClass::Equity
                };
                Symbol::new(ticker, venue, asset_class)
            }
        })
    }
}

/// What kind of holding a symbol is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AssetClass {
    Equity,
    Etf,
    Bond,
    Crypto,
}

impl AssetClass {
    /// Venue assumed when a symbol is given without one.
    pub fn default_exchange(&self) -> &'static str {
        match self {
            AssetClass::Equity => "NASDAQ",
            AssetClass::Etf => "NYSEARCA",
            AssetClass::Bond => "NYSE",
            AssetClass::Crypto => "BINANCE",
        }
    }

    fn listing(self, ticker: &str) -> Symbol {
        Symbol::new(ticker, self.default_exchange(), self)
    }
}

/// OHLCV price bar. Supplied by the host, never mutated by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: Symbol,
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub resolution: Resolution,
}

impl Bar {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: Symbol,
        timestamp: DateTime<Utc>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
        resolution: Resolution,
    ) -> Self {
        Self {
            symbol,
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            resolution,
        }
    }
}

/// Sampling interval of a bar series. Sets how per-bar statistics are
/// annualized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    Hour,
    #[default]
    Day,
    Week,
    Month,
}

impl Resolution {
    /// Bars per trading year.
    pub fn periods_per_year(&self) -> f64 {
        match self {
            Resolution::Hour => 252.0 * 6.5,
            Resolution::Day => 252.0,
            Resolution::Week => 52.0,
            Resolution::Month => 12.0,
        }
    }

    /// Short code used in data file names.
    pub fn code(&self) -> &'static str {
        match self {
            Resolution::Hour => "1h",
            Resolution::Day => "1d",
            Resolution::Week => "1w",
            Resolution::Month => "1mo",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_listings() {
        let e = Symbol::equity("aapl");
        assert_eq!(e.ticker, "AAPL");
        assert_eq!(e.to_string(), "NASDAQ:AAPL");

        let c = Symbol::crypto("BTC-USD");
        assert_eq!(c.exchange, "BINANCE");
        assert_eq!(c.asset_class, AssetClass::Crypto);
    }

    #[test]
    fn parses_plain_and_qualified_symbols() {
        assert_eq!("MSFT".parse::<Symbol>().unwrap(), Symbol::equity("MSFT"));
        assert_eq!(" NASDAQ:msft ".parse::<Symbol>().unwrap(), Symbol::equity("MSFT"));
        assert_eq!("binance:ETH-USD".parse::<Symbol>().unwrap(), Symbol::crypto("ETH-USD"));

        let lse: Symbol = "LSE:VOD".parse().unwrap();
        assert_eq!(lse.exchange, "LSE");
        assert_eq!(lse.asset_class, AssetClass::Equity);

        assert!("".parse::<Symbol>().is_err());
        assert!(":AAPL".parse::<Symbol>().is_err());
        assert!("NASDAQ:".parse::<Symbol>().is_err());
    }

    #[test]
    fn resolution_codes_and_periods() {
        assert_eq!(Resolution::default(), Resolution::Day);
        assert_eq!(Resolution::Day.to_string(), "1d");
        assert_eq!(Resolution::Month.code(), "1mo");
        assert_eq!(Resolution::Day.periods_per_year(), 252.0);
        assert_eq!(Resolution::Week.periods_per_year(), 52.0);
    }
}
