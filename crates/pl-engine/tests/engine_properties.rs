//! End-to-end behaviour of the engine facade over an in-memory market.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use pl_data::{InMemoryMarketData, MarketDataSource};
use pl_engine::{EngineConfig, PortfolioEngine};
use pl_optimizer::{CovarianceEstimator, MeanVarianceOptimizer, Termination};
use pl_risk::AlertLevel;
use pl_types::{Bar, Position, Resolution, Symbol};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn as_of() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 16, 0, 0).unwrap()
}

/// Store daily closes starting at 100 that realise `returns` in order.
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

/// Square wave `mean ± amp` flipping every `period` observations.
fn wave(n: usize, period: usize, mean: f64, amp: f64) -> Vec<f64> {
    (0..n)
        .map(|i| if (i / period) % 2 == 0 { mean + amp } else { mean - amp })
        .collect()
}

fn engine(store: InMemoryMarketData, config: EngineConfig) -> PortfolioEngine {
    PortfolioEngine::new(config, Arc::new(store)).unwrap()
}

fn unconstrained() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.thresholds.max_weight = 1.0;
    config
}

#[test]
fn single_position_valuation() {
    let store = InMemoryMarketData::new();
    insert_returns(&store, "AAPL", &wave(40, 1, 0.0, 0.01));
    store.set_latest_price(Symbol::equity("AAPL"), dec!(160));
    let engine = engine(store, EngineConfig::default());

    let positions = vec![Position::new("main", Symbol::equity("AAPL"), dec!(10), dec!(150))];
    let snapshot = engine.analyze_portfolio_at(&positions, as_of()).unwrap();

    assert_eq!(snapshot.total_value, dec!(1600));
    assert_eq!(snapshot.total_pnl, dec!(100));
    assert!((snapshot.pnl_percentage - 6.6667).abs() < 1e-3);
    assert_eq!(snapshot.diversification, 0.0);
    assert!(snapshot.trailing_returns.daily.is_some());
    assert!(snapshot.excluded.is_empty());
}

#[test]
fn empty_portfolio_risk_is_green() {
    let engine = engine(InMemoryMarketData::new(), EngineConfig::default());
    let profile = engine.analyze_risk_at(&[], as_of()).unwrap();

    assert_eq!(profile.total_value, Decimal::ZERO);
    assert_eq!(profile.value_at_risk, 0.0);
    assert_eq!(profile.drawdown, 0.0);
    assert_eq!(profile.concentration, 0.0);
    assert_eq!(profile.volatility, 0.0);
    assert_eq!(profile.alert_level, AlertLevel::Green);
    assert!(profile.alerts.is_empty());
}

#[test]
fn constant_returns_have_no_volatility() {
    let store = InMemoryMarketData::new();
    insert_returns(&store, "ONE", &[0.01; 30]);
    insert_returns(&store, "TWO", &[0.01; 30]);
    let engine = engine(store, EngineConfig::default());

    let positions = vec![
        Position::new("p", Symbol::equity("ONE"), dec!(5), dec!(100)),
        Position::new("p", Symbol::equity("TWO"), dec!(7), dec!(100)),
    ];
    let snapshot = engine.analyze_portfolio_at(&positions, as_of()).unwrap();

    assert!(snapshot.excluded.is_empty());
    assert!(snapshot.volatility.abs() < 1e-9);
}

#[test]
fn uncorrelated_twins_split_evenly() {
    let store = InMemoryMarketData::new();
    insert_returns(&store, "AAA", &wave(120, 1, 0.001, 0.01));
    insert_returns(&store, "BBB", &wave(120, 2, 0.001, 0.01));
    let basket = [Symbol::equity("AAA"), Symbol::equity("BBB")];
    let config = unconstrained();

    let series: Vec<_> = basket
        .iter()
        .map(|s| store.return_series(s, config.windows.risk_lookback, config.windows.min_observations).unwrap())
        .collect();
    let estimate = CovarianceEstimator::new(config.windows.min_observations)
        .estimate(&series)
        .unwrap();
    let optimizer = MeanVarianceOptimizer::new(&config.thresholds).with_settings(config.optimizer.clone());
    for start in [[0.9, 0.1], [0.1, 0.9], [1.0, 0.0], [0.5, 0.5]] {
        let result = optimizer
            .optimize_with(&estimate, None, Some(&start[..]), None)
            .unwrap();
        assert!(result.converged);
        assert!((result.weights[0] - 0.5).abs() < 1e-4, "from {:?}: {:?}", start, result.weights);
        assert!((result.weights[1] - 0.5).abs() < 1e-4, "from {:?}: {:?}", start, result.weights);
    }

    let result = engine(store, config).optimize(&basket, None).unwrap();
    assert_eq!(result.termination, Termination::Converged);
    assert!((result.weights[0] - 0.5).abs() < 1e-4);
}

#[test]
fn optimized_weights_respect_budget_and_bounds() {
    let store = InMemoryMarketData::new();
    insert_returns(&store, "AAA", &wave(200, 1, 0.0010, 0.010));
    insert_returns(&store, "BBB", &wave(200, 2, 0.0004, 0.006));
    insert_returns(&store, "CCC", &wave(200, 3, 0.0015, 0.020));
    insert_returns(&store, "DDD", &wave(200, 5, -0.0002, 0.004));
    let config = EngineConfig::default();
    let (lo, hi) = (config.thresholds.min_weight, config.thresholds.max_weight);
    let engine = engine(store, config);

    let basket: Vec<Symbol> = ["AAA", "BBB", "CCC", "DDD"].into_iter().map(Symbol::equity).collect();
    let result = engine.optimize(&basket, Some(0.25)).unwrap();

    let sum: f64 = result.weights.iter().sum();
    assert!((sum - 1.0).abs() < 1e-6);
    for w in &result.weights {
        assert!(*w >= lo - 1e-9 && *w <= hi + 1e-9, "weight {} outside [{}, {}]", w, lo, hi);
    }
    assert_eq!(result.risk_tolerance, Some(0.25));
    assert_eq!(result.exceeds_risk_tolerance, result.risk > 0.25);
}

#[test]
fn repeated_analysis_is_bit_identical() {
    let store = InMemoryMarketData::new();
    insert_returns(&store, "AAA", &wave(80, 1, 0.001, 0.01));
    insert_returns(&store, "BBB", &wave(80, 2, 0.002, 0.02));
    let engine = engine(store, EngineConfig::default());
    let positions = vec![
        Position::new("p", Symbol::equity("AAA"), dec!(12), dec!(95)),
        Position::new("p", Symbol::equity("BBB"), dec!(3), dec!(130)),
        Position::new("p", Symbol::equity("MISSING"), dec!(1), dec!(10)),
    ];

    let first = engine.analyze_portfolio_at(&positions, as_of()).unwrap();
    let second = engine.analyze_portfolio_at(&positions, as_of()).unwrap();
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
    assert_eq!(first.excluded.len(), 1);

    let risk_a = engine.analyze_risk_at(&positions, as_of()).unwrap();
    let risk_b = engine.analyze_risk_at(&positions, as_of()).unwrap();
    assert_eq!(risk_a, risk_b);
}
