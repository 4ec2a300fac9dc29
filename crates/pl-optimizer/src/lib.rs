//! # pl-optimizer
//!
//! Allocation optimization for PortLens.
//!
//! Estimates expected returns and the sample covariance matrix from aligned
//! return series, then solves the long-only maximum-Sharpe problem under
//! per-asset weight bounds with projected gradient ascent.

mod cancel;
mod covariance;
mod mean_variance;

pub use cancel::CancellationFlag;
pub use covariance::{CovarianceEstimate, CovarianceEstimator};
pub use mean_variance::{
    project_onto_bounds, GradientMethod, MeanVarianceOptimizer, OptimizationResult,
    OptimizerSettings, Termination,
};
