//! Command-line report: values a portfolio from CSV history, assesses its
//! risk and optionally optimizes a basket, printing everything as JSON.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use pl_data::{CsvBarLoader, InMemoryMarketData};
use pl_engine::{EngineConfig, PortfolioEngine, CONFIG_ENV_VAR};
use pl_types::{Position, Symbol};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding `{symbol}_{resolution}.csv` bar files
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// JSON array of positions to analyze
    #[arg(long)]
    positions: Option<PathBuf>,

    /// Engine config JSON (falls back to $PORTLENS_CONFIG, then defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Symbols to optimize, `AAPL` or `EXCHANGE:TICKER` (comma separated)
    #[arg(long)]
    optimize: Option<String>,

    /// Annualized volatility budget reported against the optimized allocation
    #[arg(long)]
    risk_tolerance: Option<f64>,

    /// Also print per-symbol statistics and correlations
    #[arg(long)]
    analytics: bool,
}

fn init_logging() {
    let level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(level))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EngineConfig::from_env().with_context(|| format!("failed to load config from ${CONFIG_ENV_VAR}"))?,
    };

    let positions: Vec<Position> = match &args.positions {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read positions {}", path.display()))?;
            serde_json::from_str(&raw).context("positions file is not a JSON array of positions")?
        }
        None => Vec::new(),
    };
    let basket: Vec<Symbol> = match args.optimize.as_deref() {
        Some(list) => list
            .split(',')
            .filter(|t| !t.trim().is_empty())
            .map(str::parse::<Symbol>)
            .collect::<Result<Vec<_>, _>>()
            .context("invalid --optimize symbol")?,
        None => Vec::new(),
    };

    if positions.is_empty() && basket.is_empty() {
        bail!("nothing to do: pass --positions and/or --optimize");
    }

    let wanted: BTreeSet<Symbol> = positions
        .iter()
        .map(|p| p.symbol.clone())
        .chain(basket.iter().cloned())
        .collect();
    let wanted: Vec<Symbol> = wanted.into_iter().collect();

    let store = InMemoryMarketData::new();
    let loaded = CsvBarLoader::new(&args.data_dir)
        .with_resolution(config.resolution)
        .load_into(&store, &wanted)
        .context("failed to load bar history")?;
    info!("Loaded history for {}/{} symbols", loaded.len(), wanted.len());

    let engine = PortfolioEngine::new(config, Arc::new(store))?;
    let mut report = serde_json::Map::new();

    if !positions.is_empty() {
        let snapshot = engine.analyze_portfolio(&positions)?;
        let risk = engine.analyze_risk(&positions)?;
        report.insert("snapshot".into(), serde_json::to_value(&snapshot)?);
        report.insert("risk".into(), serde_json::to_value(&risk)?);
    }
    if !basket.is_empty() {
        let allocation = engine
            .optimize(&basket, args.risk_tolerance)
            .context("optimization failed")?;
        report.insert("optimization".into(), serde_json::to_value(&allocation)?);
    }
    if args.analytics {
        let analytics = engine.symbol_analytics(&wanted)?;
        report.insert("analytics".into(), serde_json::to_value(&analytics)?);
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
