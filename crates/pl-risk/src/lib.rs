//! Portfolio risk analytics for PortLens.
//!
//! Provides:
//! - Mark-to-market valuation with P&L, volatility and Sharpe ratio
//! - Diversification score and trailing daily/weekly/monthly/yearly returns
//! - Historical VaR, drawdown, concentration and volatility per portfolio
//! - Threshold alerts rolled up into a Green / Yellow / Red level
//! - Per-symbol annualized statistics (Sharpe, Sortino, max drawdown)
//! - Alert publication via channels

pub mod alerts;
pub mod metrics;
pub mod monitor;
pub mod performance;
pub mod symbol_metrics;
pub mod valuation;

pub use alerts::{Alert, AlertEvaluator, AlertKind, AlertLevel, AlertSeverity, AlertType};
pub use metrics::{PositionRisk, RiskMeasures, RiskMetricsEngine, RiskProfile};
pub use monitor::RiskMonitor;
pub use performance::{diversification_score, holdings_value_series, trailing_returns};
pub use symbol_metrics::{max_drawdown, SymbolMetricsCalculator, SymbolRiskMetrics};
pub use valuation::PortfolioMetricsAggregator;
