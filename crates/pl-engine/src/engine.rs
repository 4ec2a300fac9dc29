//! The [`PortfolioEngine`] facade: valuation, risk, optimization and
//! per-symbol analytics over injected collaborators.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use crossbeam_channel::Sender;
use pl_data::{MarketDataSource, PositionSource, ReturnSeries};
use pl_optimizer::{
    CancellationFlag, CovarianceEstimator, MeanVarianceOptimizer, OptimizationResult,
};
use pl_risk::{
    Alert, PortfolioMetricsAggregator, RiskMetricsEngine, RiskMonitor, RiskProfile,
    SymbolMetricsCalculator, SymbolRiskMetrics,
};
use pl_types::{
    config_error, validation_error, ExcludedSymbol, OptimizationError, PlResult,
    PortfolioSnapshot, Position, Symbol,
};
use rayon::prelude::*;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::EngineConfig;

/// Per-symbol statistics plus the correlation matrix of the usable symbols.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolAnalyticsReport {
    pub metrics: Vec<SymbolRiskMetrics>,
    /// Row/column order of `correlation`.
    pub symbols: Vec<Symbol>,
    pub correlation: Vec<Vec<f64>>,
    pub excluded: Vec<ExcludedSymbol>,
}

/// Stateless analytics engine. Every call reads fresh data from the
/// collaborators; nothing is cached between calls.
#[derive(Debug)]
pub struct PortfolioEngine {
    config: EngineConfig,
    market: Arc<dyn MarketDataSource>,
    positions: Option<Arc<dyn PositionSource>>,
    alert_tx: Option<Sender<Alert>>,
}

impl PortfolioEngine {
    pub fn new(config: EngineConfig, market: Arc<dyn MarketDataSource>) -> PlResult<Self> {
        config.validate()?;
        info!("Initializing PortLens engine with {} market data", market.name());
        Ok(Self {
            config,
            market,
            positions: None,
            alert_tx: None,
        })
    }

    /// Enable the `*_by_id` operations.
    pub fn with_position_source(mut self, positions: Arc<dyn PositionSource>) -> Self {
        self.positions = Some(positions);
        self
    }

    /// Publish risk alerts on `alert_tx` as they are produced.
    pub fn with_alert_sink(mut self, alert_tx: Sender<Alert>) -> Self {
        self.alert_tx = Some(alert_tx);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // --- valuation ---

    pub fn analyze_portfolio(&self, positions: &[Position]) -> PlResult<PortfolioSnapshot> {
        self.analyze_portfolio_at(positions, Utc::now())
    }

    /// Valuation stamped with `as_of`; repeated calls over unchanged data
    /// return equal snapshots.
    pub fn analyze_portfolio_at(
        &self,
        positions: &[Position],
        as_of: DateTime<Utc>,
    ) -> PlResult<PortfolioSnapshot> {
        info!("Analyzing portfolio of {} positions", positions.len());
        PortfolioMetricsAggregator::new(self.config.thresholds.clone(), self.config.windows.clone())
            .snapshot(positions, self.market.as_ref(), as_of)
    }

    pub fn analyze_portfolio_by_id(&self, portfolio_id: &str) -> PlResult<PortfolioSnapshot> {
        let positions = self.load_positions(portfolio_id)?;
        self.analyze_portfolio(&positions)
    }

    // --- risk ---

    pub fn analyze_risk(&self, positions: &[Position]) -> PlResult<RiskProfile> {
        self.analyze_risk_at(positions, Utc::now())
    }

    pub fn analyze_risk_at(&self, positions: &[Position], as_of: DateTime<Utc>) -> PlResult<RiskProfile> {
        info!("Analyzing risk of {} positions", positions.len());
        let engine = RiskMetricsEngine::new(self.config.thresholds.clone(), self.config.windows.clone());
        match &self.alert_tx {
            Some(tx) => RiskMonitor::new(engine, tx.clone()).update(positions, self.market.as_ref(), as_of),
            None => engine.assess(positions, self.market.as_ref(), as_of),
        }
    }

    pub fn analyze_risk_by_id(&self, portfolio_id: &str) -> PlResult<RiskProfile> {
        let positions = self.load_positions(portfolio_id)?;
        self.analyze_risk(&positions)
    }

    // --- optimization ---

    /// Maximum-Sharpe weights for `symbols`, in input order.
    ///
    /// `risk_tolerance` is an annualized volatility budget; it is reported on
    /// the result and never alters the objective.
    pub fn optimize(&self, symbols: &[Symbol], risk_tolerance: Option<f64>) -> PlResult<OptimizationResult> {
        self.run_optimization(symbols, risk_tolerance, None)
    }

    /// As [`optimize`](Self::optimize), stopping early once `cancel` is set.
    pub fn optimize_with_cancel(
        &self,
        symbols: &[Symbol],
        risk_tolerance: Option<f64>,
        cancel: &CancellationFlag,
    ) -> PlResult<OptimizationResult> {
        self.run_optimization(symbols, risk_tolerance, Some(cancel))
    }

    fn run_optimization(
        &self,
        symbols: &[Symbol],
        risk_tolerance: Option<f64>,
        cancel: Option<&CancellationFlag>,
    ) -> PlResult<OptimizationResult> {
        if symbols.is_empty() {
            return Err(OptimizationError::NoSymbols.into());
        }
        let mut seen = HashSet::new();
        if let Some(dup) = symbols.iter().find(|s| !seen.insert(*s)) {
            return Err(validation_error!("{} appears more than once in the basket", dup));
        }
        if let Some(budget) = risk_tolerance {
            if !(budget.is_finite() && budget > 0.0) {
                return Err(validation_error!("risk tolerance must be positive, got {}", budget));
            }
        }

        info!("Optimizing allocation across {} symbols", symbols.len());
        let series = self.fetch_series(symbols)?;
        let estimate = CovarianceEstimator::new(self.config.windows.min_observations).estimate(&series)?;

        MeanVarianceOptimizer::new(&self.config.thresholds)
            .with_settings(self.config.optimizer.clone())
            .optimize_with(&estimate, risk_tolerance, None, cancel)
    }

    // --- per-symbol analytics ---

    /// Annualized statistics for each symbol and the correlation matrix of
    /// those with enough history. Symbols lacking data are listed in
    /// `excluded`.
    pub fn symbol_analytics(&self, symbols: &[Symbol]) -> PlResult<SymbolAnalyticsReport> {
        let calculator = SymbolMetricsCalculator::new(
            &self.config.thresholds,
            self.config.resolution.periods_per_year(),
        );
        let lookback = self.config.windows.risk_lookback;
        let required = self.config.windows.min_observations;

        let fetched: Vec<PlResult<(ReturnSeries, Vec<f64>)>> = symbols
            .par_iter()
            .map(|symbol| {
                let series = self.market.return_series(symbol, lookback, required)?;
                let closes = self
                    .market
                    .price_bars(symbol, lookback + 1)?
                    .iter()
                    .filter_map(|bar| bar.close.to_f64())
                    .collect();
                Ok((series, closes))
            })
            .collect();

        let mut usable = Vec::new();
        let mut metrics = Vec::new();
        let mut excluded = Vec::new();
        for (symbol, result) in symbols.iter().zip(fetched) {
            match result {
                Ok((series, closes)) => {
                    metrics.push(calculator.compute(&series, &closes));
                    usable.push(series);
                }
                Err(e) if e.is_symbol_data_issue() => {
                    warn!("Skipping analytics for {}: {}", symbol, e);
                    excluded.push(ExcludedSymbol::new(symbol.clone(), e.to_string()));
                }
                Err(e) => return Err(e),
            }
        }

        let correlation = if usable.is_empty() {
            Vec::new()
        } else {
            CovarianceEstimator::new(required).estimate(&usable)?.correlation()
        };

        Ok(SymbolAnalyticsReport {
            symbols: usable.iter().map(|s| s.symbol.clone()).collect(),
            metrics,
            correlation,
            excluded,
        })
    }

    fn fetch_series(&self, symbols: &[Symbol]) -> PlResult<Vec<ReturnSeries>> {
        let windows = &self.config.windows;
        let fetched: Vec<PlResult<ReturnSeries>> = symbols
            .par_iter()
            .map(|symbol| {
                self.market
                    .return_series(symbol, windows.risk_lookback, windows.min_observations)
            })
            .collect();
        // first failure in input order
        fetched.into_iter().collect()
    }

    fn load_positions(&self, portfolio_id: &str) -> PlResult<Vec<Position>> {
        let source = self
            .positions
            .as_ref()
            .ok_or_else(|| config_error!("no position source configured"))?;
        source.list_positions(portfolio_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use pl_data::{InMemoryMarketData, InMemoryPositions};
    use pl_optimizer::Termination;
    use pl_risk::AlertLevel;
    use pl_types::{Bar, DataError, PlError, Resolution};
    use rust_decimal::prelude::FromPrimitive;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 16, 0, 0).unwrap()
    }

    fn insert_returns(store: &InMemoryMarketData, ticker: &str, returns: &[f64]) {
        let sym = Symbol::equity(ticker);
        let start = Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap();
        let mut close = 100.0;
        let mut bars = Vec::with_capacity(returns.len() + 1);
        for i in 0..=returns.len() {
            if i > 0 {
                close *= 1.0 + returns[i - 1];
            }
            let px = Decimal::from_f64(close).unwrap();
            bars.push(Bar::new(sym.clone(), start + Duration::days(i as i64), px, px, px, px, dec!(1), Resolution::Day));
        }
        store.insert_bars(sym, bars);
    }

    fn pattern(n: usize, period: usize, mean: f64, amp: f64) -> Vec<f64> {
        (0..n)
            .map(|i| if (i / period) % 2 == 0 { mean + amp } else { mean - amp })
            .collect()
    }

    fn engine_with(store: InMemoryMarketData, config: EngineConfig) -> PortfolioEngine {
        PortfolioEngine::new(config, Arc::new(store)).unwrap()
    }

    fn three_asset_store() -> InMemoryMarketData {
        let store = InMemoryMarketData::new();
        insert_returns(&store, "AAA", &pattern(120, 1, 0.001, 0.01));
        insert_returns(&store, "BBB", &pattern(120, 2, 0.0008, 0.012));
        insert_returns(&store, "CCC", &pattern(120, 3, 0.0012, 0.015));
        store
    }

    #[test]
    fn optimize_returns_weights_in_input_order() {
        let engine = engine_with(three_asset_store(), EngineConfig::default());
        let basket = [Symbol::equity("CCC"), Symbol::equity("AAA"), Symbol::equity("BBB")];
        let result = engine.optimize(&basket, None).unwrap();

        assert_eq!(result.symbols, basket.to_vec());
        let sum: f64 = result.weights.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(result.weights.iter().all(|w| *w >= -1e-9 && *w <= 0.4 + 1e-9));
    }

    #[test]
    fn optimize_propagates_insufficient_history() {
        let store = three_asset_store();
        insert_returns(&store, "NEW", &pattern(5, 1, 0.001, 0.01));
        let engine = engine_with(store, EngineConfig::default());

        let err = engine
            .optimize(
                &[Symbol::equity("AAA"), Symbol::equity("NEW"), Symbol::equity("BBB")],
                None,
            )
            .unwrap_err();
        assert!(matches!(err, PlError::Data(DataError::InsufficientData { .. })));
    }

    #[test]
    fn optimize_rejects_bad_baskets() {
        let engine = engine_with(three_asset_store(), EngineConfig::default());
        assert!(matches!(
            engine.optimize(&[], None).unwrap_err(),
            PlError::Optimization(OptimizationError::NoSymbols)
        ));
        assert!(matches!(
            engine
                .optimize(&[Symbol::equity("AAA"), Symbol::equity("AAA"), Symbol::equity("BBB")], None)
                .unwrap_err(),
            PlError::Validation(_)
        ));
        assert!(matches!(
            engine
                .optimize(&[Symbol::equity("AAA"), Symbol::equity("BBB"), Symbol::equity("CCC")], Some(-1.0))
                .unwrap_err(),
            PlError::Validation(_)
        ));
    }

    #[test]
    fn cancelled_optimization_reports_it() {
        let engine = engine_with(three_asset_store(), EngineConfig::default());
        let flag = CancellationFlag::new();
        flag.cancel();

        let result = engine
            .optimize_with_cancel(
                &[Symbol::equity("AAA"), Symbol::equity("BBB"), Symbol::equity("CCC")],
                None,
                &flag,
            )
            .unwrap();
        assert_eq!(result.termination, Termination::Cancelled);
        assert!(!result.converged);
    }

    #[test]
    fn by_id_requires_a_position_source() {
        let engine = engine_with(three_asset_store(), EngineConfig::default());
        assert!(matches!(engine.analyze_risk_by_id("main").unwrap_err(), PlError::Config(_)));

        let positions = InMemoryPositions::new();
        positions.add(Position::new("main", Symbol::equity("AAA"), dec!(10), dec!(90)));
        let engine = engine.with_position_source(Arc::new(positions));

        let snapshot = engine.analyze_portfolio_by_id("main").unwrap();
        assert_eq!(snapshot.positions.len(), 1);
        let profile = engine.analyze_risk_by_id("main").unwrap();
        assert_eq!(profile.positions.len(), 1);
        let empty = engine.analyze_risk_by_id("other").unwrap();
        assert_eq!(empty.alert_level, AlertLevel::Green);
    }

    #[test]
    fn alert_sink_receives_risk_alerts() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let engine = engine_with(three_asset_store(), EngineConfig::default()).with_alert_sink(tx);

        // a single holding is 100% concentrated
        let positions = vec![Position::new("p", Symbol::equity("AAA"), dec!(10), dec!(90))];
        let profile = engine.analyze_risk_at(&positions, as_of()).unwrap();

        let received: Vec<Alert> = rx.try_iter().collect();
        assert!(!received.is_empty());
        assert_eq!(received, profile.alerts);
    }

    #[test]
    fn symbol_analytics_skips_short_histories() {
        let store = three_asset_store();
        insert_returns(&store, "NEW", &pattern(5, 1, 0.001, 0.01));
        let engine = engine_with(store, EngineConfig::default());

        let report = engine
            .symbol_analytics(&[Symbol::equity("AAA"), Symbol::equity("NEW"), Symbol::equity("BBB")])
            .unwrap();

        assert_eq!(report.metrics.len(), 2);
        assert_eq!(report.symbols, vec![Symbol::equity("AAA"), Symbol::equity("BBB")]);
        assert_eq!(report.excluded[0].symbol, Symbol::equity("NEW"));
        assert_eq!(report.correlation.len(), 2);
        assert_eq!(report.correlation[0][0], 1.0);
        // alternating and two-period waves are orthogonal
        assert!(report.correlation[0][1].abs() < 1e-6);
    }

    #[test]
    fn symbol_analytics_with_nothing_usable() {
        let engine = engine_with(InMemoryMarketData::new(), EngineConfig::default());
        let report = engine.symbol_analytics(&[Symbol::equity("GHOST")]).unwrap();
        assert!(report.metrics.is_empty());
        assert!(report.correlation.is_empty());
        assert_eq!(report.excluded.len(), 1);
    }

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let mut config = EngineConfig::default();
        config.thresholds.var_confidence = 1.5;
        let err = PortfolioEngine::new(config, Arc::new(InMemoryMarketData::new())).unwrap_err();
        assert!(matches!(err, PlError::Config(_)));
    }
}
