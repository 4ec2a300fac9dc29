//! PortLens engine: portfolio valuation, risk assessment, mean-variance
//! optimization and per-symbol analytics behind one facade.
//!
//! Hosts inject a [`MarketDataSource`](pl_data::MarketDataSource) (and
//! optionally a [`PositionSource`](pl_data::PositionSource)) and call the
//! [`PortfolioEngine`] operations synchronously. Nothing is cached between
//! calls.

pub mod config;
pub mod engine;

pub use config::{EngineConfig, CONFIG_ENV_VAR};
pub use engine::{PortfolioEngine, SymbolAnalyticsReport};
