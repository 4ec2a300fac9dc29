//! Market data plumbing for PortLens.
//!
//! The engine never performs I/O itself: hosts load history through the
//! [`MarketDataSource`] and [`PositionSource`] traits (the in-memory store and
//! CSV loader here are the stock implementations), and [`ReturnSeries`] turns
//! bars into the return observations every estimator works from.

pub mod loaders;
pub mod memory;
pub mod returns;
pub mod sources;

pub use loaders::CsvBarLoader;
pub use memory::{InMemoryMarketData, InMemoryPositions};
pub use returns::{downside_deviation, mean, percentile, sample_std_dev, ReturnSeries};
pub use sources::{MarketDataSource, PositionSource};
