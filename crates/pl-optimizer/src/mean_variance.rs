//! Maximum-Sharpe allocation under per-asset bounds and a full-investment
//! budget.

use pl_types::{GuardedRatio, OptimizationError, PlError, PlResult, RiskThresholds, Symbol};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cancel::CancellationFlag;
use crate::covariance::CovarianceEstimate;

/// Weights within this distance of a bound count as sitting on it.
const BOUND_EPSILON: f64 = 1e-12;
/// Portfolio variances at or below this are treated as zero.
const VARIANCE_EPSILON: f64 = 1e-14;
const PROJECTION_ROUNDS: usize = 64;
const ARMIJO_FACTOR: f64 = 1e-4;
const MAX_BACKTRACKS: usize = 60;
const MAX_STEP: f64 = 1e4;

/// How the Sharpe gradient is evaluated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradientMethod {
    /// Closed form `μ/σ − (wᵗμ − r_f)·Σw/σ³`.
    #[default]
    Analytic,
    /// Central finite differences with the given step.
    CentralDifference { step: f64 },
}

/// Solver settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerSettings {
    pub max_iterations: usize,
    /// Projected-gradient norm below which the solver stops.
    pub tolerance: f64,
    /// Return periods per year; μ and Σ are scaled by this before solving.
    pub periods_per_year: f64,
    pub gradient: GradientMethod,
    /// First trial step of the line search.
    pub initial_step: f64,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            tolerance: 1e-9,
            periods_per_year: 252.0,
            gradient: GradientMethod::Analytic,
            initial_step: 1.0,
        }
    }
}

impl OptimizerSettings {
    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_periods_per_year(mut self, periods: f64) -> Self {
        self.periods_per_year = periods;
        self
    }

    pub fn with_gradient(mut self, gradient: GradientMethod) -> Self {
        self.gradient = gradient;
        self
    }

    pub fn validate(&self) -> PlResult<()> {
        if self.max_iterations == 0 {
            return Err(PlError::Config("max_iterations must be positive".into()));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(PlError::Config(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if !(self.periods_per_year.is_finite() && self.periods_per_year > 0.0) {
            return Err(PlError::Config(format!(
                "periods_per_year must be positive, got {}",
                self.periods_per_year
            )));
        }
        if !(self.initial_step.is_finite() && self.initial_step > 0.0) {
            return Err(PlError::Config(format!(
                "initial_step must be positive, got {}",
                self.initial_step
            )));
        }
        if let GradientMethod::CentralDifference { step } = self.gradient {
            if !(step.is_finite() && step > 0.0) {
                return Err(PlError::Config(format!(
                    "finite-difference step must be positive, got {}",
                    step
                )));
            }
        }
        Ok(())
    }
}

/// Why the solver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The projected gradient vanished or steps stopped improving the
    /// Sharpe ratio. This certifies a local optimum only: when every
    /// expected return is below the risk-free rate the ratio is negative
    /// and not concave, so another vertex may score higher.
    Converged,
    MaxIterations,
    Cancelled,
}

/// Optimized allocation. Return, risk and Sharpe are annualized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub symbols: Vec<Symbol>,
    pub weights: Vec<f64>,
    pub expected_return: f64,
    pub risk: f64,
    pub sharpe_ratio: f64,
    pub sharpe_undefined: bool,
    pub converged: bool,
    pub termination: Termination,
    pub iterations: usize,
    pub risk_tolerance: Option<f64>,
    /// True when `risk` is above the caller's volatility budget. The budget
    /// never changes the objective.
    pub exceeds_risk_tolerance: bool,
}

impl OptimizationResult {
    /// Weight assigned to `symbol`, if it was part of the basket.
    pub fn weight_of(&self, symbol: &Symbol) -> Option<f64> {
        self.symbols
            .iter()
            .position(|s| s == symbol)
            .and_then(|i| self.weights.get(i).copied())
    }
}

/// Projected gradient ascent on the Sharpe ratio.
#[derive(Debug, Clone)]
pub struct MeanVarianceOptimizer {
    settings: OptimizerSettings,
    risk_free_rate: f64,
    min_weight: f64,
    max_weight: f64,
}

impl MeanVarianceOptimizer {
    pub fn new(thresholds: &RiskThresholds) -> Self {
        Self {
            settings: OptimizerSettings::default(),
            risk_free_rate: thresholds.risk_free_rate,
            min_weight: thresholds.min_weight,
            max_weight: thresholds.max_weight,
        }
    }

    pub fn with_settings(mut self, settings: OptimizerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &OptimizerSettings {
        &self.settings
    }

    /// Optimize from equal weights.
    pub fn optimize(
        &self,
        estimate: &CovarianceEstimate,
        risk_tolerance: Option<f64>,
    ) -> PlResult<OptimizationResult> {
        self.optimize_with(estimate, risk_tolerance, None, None)
    }

    /// Optimize from `initial` weights (projected onto the feasible set
    /// first), checking `cancel` once per iteration.
    ///
    /// `estimate` holds per-period statistics; they are annualized with
    /// `periods_per_year` before solving.
    pub fn optimize_with(
        &self,
        estimate: &CovarianceEstimate,
        risk_tolerance: Option<f64>,
        initial: Option<&[f64]>,
        cancel: Option<&CancellationFlag>,
    ) -> PlResult<OptimizationResult> {
        let n = estimate.len();
        if n == 0 {
            return Err(OptimizationError::NoSymbols.into());
        }
        estimate.check_dimensions()?;
        check_feasible(n, self.min_weight, self.max_weight)?;
        if let Some(w) = initial.filter(|w| w.len() != n) {
            return Err(OptimizationError::DimensionMismatch {
                expected: n,
                actual: w.len(),
            }
            .into());
        }

        let annual = estimate.annualized(self.settings.periods_per_year);
        let problem = SharpeProblem {
            estimate: &annual,
            risk_free_rate: self.risk_free_rate,
        };

        if annual.covariance.iter().enumerate().all(|(i, row)| row[i] <= VARIANCE_EPSILON) {
            warn!("All {} variances are zero; returning equal weights", n);
            let weights = self.equal_weights(n);
            return Ok(self.finish(&annual, weights, Termination::Converged, 0, risk_tolerance));
        }

        let mut weights = match initial {
            Some(w) => w.to_vec(),
            None => vec![1.0 / n as f64; n],
        };
        project_onto_bounds(&mut weights, self.min_weight, self.max_weight);

        let mut value = match problem.sharpe(&weights) {
            Some(v) => v,
            None => {
                weights = self.equal_weights(n);
                match problem.sharpe(&weights) {
                    Some(v) => v,
                    None => {
                        warn!("Starting portfolio has zero variance; returning equal weights");
                        return Ok(self.finish(
                            &annual,
                            weights,
                            Termination::Converged,
                            0,
                            risk_tolerance,
                        ));
                    }
                }
            }
        };

        let mut step = self.settings.initial_step;
        let mut iterations = 0;
        let mut termination = Termination::MaxIterations;

        while iterations < self.settings.max_iterations {
            if cancel.is_some_and(|c| c.is_cancelled()) {
                termination = Termination::Cancelled;
                break;
            }

            let gradient = self.gradient(&problem, &weights);
            let direction = feasible_direction(&weights, &gradient, self.min_weight, self.max_weight);
            let norm = direction.iter().map(|d| d * d).sum::<f64>().sqrt();
            if norm < self.settings.tolerance {
                termination = Termination::Converged;
                break;
            }

            match self.line_search(&problem, &weights, value, &gradient, &direction, step) {
                Some((next, next_value, alpha)) => {
                    weights = next;
                    value = next_value;
                    step = (alpha * 2.0).min(MAX_STEP);
                }
                None => {
                    termination = Termination::Converged;
                    break;
                }
            }

            iterations += 1;
            if iterations % 100 == 0 {
                debug!("Iteration {}: sharpe {:.6}, step {:.3e}", iterations, value, step);
            }
        }

        let result = self.finish(&annual, weights, termination, iterations, risk_tolerance);
        info!(
            "Optimization over {} symbols stopped ({:?}) after {} iterations: sharpe {:.4}",
            n, result.termination, result.iterations, result.sharpe_ratio
        );
        Ok(result)
    }

    fn equal_weights(&self, n: usize) -> Vec<f64> {
        let mut weights = vec![1.0 / n as f64; n];
        project_onto_bounds(&mut weights, self.min_weight, self.max_weight);
        weights
    }

    fn gradient(&self, problem: &SharpeProblem<'_>, weights: &[f64]) -> Vec<f64> {
        match self.settings.gradient {
            GradientMethod::Analytic => problem.analytic_gradient(weights),
            GradientMethod::CentralDifference { step } => problem.numeric_gradient(weights, step),
        }
    }

    /// Backtracking along `direction`, projecting every trial point.
    fn line_search(
        &self,
        problem: &SharpeProblem<'_>,
        weights: &[f64],
        value: f64,
        gradient: &[f64],
        direction: &[f64],
        initial_step: f64,
    ) -> Option<(Vec<f64>, f64, f64)> {
        let mut alpha = initial_step;
        for _ in 0..MAX_BACKTRACKS {
            let mut candidate: Vec<f64> = weights
                .iter()
                .zip(direction)
                .map(|(w, d)| w + alpha * d)
                .collect();
            project_onto_bounds(&mut candidate, self.min_weight, self.max_weight);

            if let Some(candidate_value) = problem.sharpe(&candidate) {
                let ascent: f64 = gradient
                    .iter()
                    .zip(candidate.iter().zip(weights))
                    .map(|(g, (c, w))| g * (c - w))
                    .sum();
                if candidate_value > value && candidate_value >= value + ARMIJO_FACTOR * ascent {
                    return Some((candidate, candidate_value, alpha));
                }
            }
            alpha *= 0.5;
        }
        None
    }

    fn finish(
        &self,
        annual: &CovarianceEstimate,
        weights: Vec<f64>,
        termination: Termination,
        iterations: usize,
        risk_tolerance: Option<f64>,
    ) -> OptimizationResult {
        let expected_return = annual.portfolio_return(&weights);
        let risk = annual.portfolio_variance(&weights).sqrt();
        let sharpe = GuardedRatio::new(expected_return - self.risk_free_rate, risk);

        OptimizationResult {
            symbols: annual.symbols.clone(),
            weights,
            expected_return,
            risk,
            sharpe_ratio: sharpe.value,
            sharpe_undefined: sharpe.undefined,
            converged: termination == Termination::Converged,
            termination,
            iterations,
            risk_tolerance,
            exceeds_risk_tolerance: risk_tolerance.is_some_and(|budget| risk > budget),
        }
    }
}

struct SharpeProblem<'a> {
    estimate: &'a CovarianceEstimate,
    risk_free_rate: f64,
}

impl SharpeProblem<'_> {
    fn sharpe(&self, weights: &[f64]) -> Option<f64> {
        let variance = self.estimate.portfolio_variance(weights);
        if variance <= VARIANCE_EPSILON {
            return None;
        }
        let excess = self.estimate.portfolio_return(weights) - self.risk_free_rate;
        let value = excess / variance.sqrt();
        value.is_finite().then_some(value)
    }

    fn analytic_gradient(&self, weights: &[f64]) -> Vec<f64> {
        let sigma_w = self.estimate.covariance_times(weights);
        let variance: f64 = weights.iter().zip(&sigma_w).map(|(w, s)| w * s).sum();
        let sd = variance.max(VARIANCE_EPSILON).sqrt();
        let excess = self.estimate.portfolio_return(weights) - self.risk_free_rate;
        let sd3 = sd * sd * sd;

        self.estimate
            .expected_returns
            .iter()
            .zip(&sigma_w)
            .map(|(mu, s)| mu / sd - excess * s / sd3)
            .collect()
    }

    fn numeric_gradient(&self, weights: &[f64], h: f64) -> Vec<f64> {
        let mut probe = weights.to_vec();
        (0..weights.len())
            .map(|i| {
                probe[i] = weights[i] + h;
                let up = self.sharpe(&probe);
                probe[i] = weights[i] - h;
                let down = self.sharpe(&probe);
                probe[i] = weights[i];
                match (up, down) {
                    (Some(u), Some(d)) => (u - d) / (2.0 * h),
                    _ => 0.0,
                }
            })
            .collect()
    }
}

fn check_feasible(assets: usize, min_weight: f64, max_weight: f64) -> PlResult<()> {
    let n = assets as f64;
    if n * min_weight > 1.0 + BOUND_EPSILON || n * max_weight < 1.0 - BOUND_EPSILON {
        return Err(OptimizationError::InfeasibleBounds {
            assets,
            min_weight,
            max_weight,
        }
        .into());
    }
    Ok(())
}

/// Gradient restricted to the face of the feasible set the weights sit on:
/// the budget direction is removed and coordinates pinned at a bound that
/// the gradient pushes outward are frozen.
fn feasible_direction(weights: &[f64], gradient: &[f64], min_weight: f64, max_weight: f64) -> Vec<f64> {
    let n = weights.len();
    let at_upper: Vec<bool> = weights.iter().map(|w| *w >= max_weight - BOUND_EPSILON).collect();
    let at_lower: Vec<bool> = weights.iter().map(|w| *w <= min_weight + BOUND_EPSILON).collect();

    let mut free = vec![true; n];
    let mut mean = 0.0;
    for _ in 0..=n {
        let count = free.iter().filter(|f| **f).count();
        if count == 0 {
            return vec![0.0; n];
        }
        mean = (0..n).filter(|&i| free[i]).map(|i| gradient[i]).sum::<f64>() / count as f64;

        let next: Vec<bool> = (0..n)
            .map(|i| !((at_upper[i] && gradient[i] > mean) || (at_lower[i] && gradient[i] < mean)))
            .collect();
        if next == free {
            break;
        }
        free = next;
    }

    (0..n)
        .map(|i| if free[i] { gradient[i] - mean } else { 0.0 })
        .collect()
}

/// Map `weights` onto `{w : Σw = 1, min ≤ w_i ≤ max}`.
///
/// Clips each weight then renormalizes the clipped vector to sum to 1,
/// repeating until stable. Whatever residual remains is spread across the
/// weights with slack so both the bounds and the budget hold exactly. A
/// vector that clips to all zeros restarts from equal weights.
pub fn project_onto_bounds(weights: &mut [f64], min_weight: f64, max_weight: f64) {
    let n = weights.len();
    if n == 0 {
        return;
    }
    for w in weights.iter_mut() {
        if !w.is_finite() {
            *w = 0.0;
        }
    }

    for _ in 0..PROJECTION_ROUNDS {
        clip(weights, min_weight, max_weight);
        let sum: f64 = weights.iter().sum();
        if sum <= BOUND_EPSILON {
            weights.fill(1.0 / n as f64);
            continue;
        }
        if (sum - 1.0).abs() <= BOUND_EPSILON {
            return;
        }
        for w in weights.iter_mut() {
            *w /= sum;
        }
    }

    clip(weights, min_weight, max_weight);
    let residual = 1.0 - weights.iter().sum::<f64>();
    if residual.abs() <= BOUND_EPSILON {
        return;
    }

    let slack: Vec<f64> = weights
        .iter()
        .map(|w| if residual > 0.0 { max_weight - w } else { w - min_weight })
        .collect();
    let total_slack: f64 = slack.iter().sum();
    if total_slack <= 0.0 {
        return;
    }
    for (w, s) in weights.iter_mut().zip(&slack) {
        *w += residual * s / total_slack;
    }
    clip(weights, min_weight, max_weight);
}

fn clip(weights: &mut [f64], min_weight: f64, max_weight: f64) {
    for w in weights.iter_mut() {
        *w = w.clamp(min_weight, max_weight);
    }
}
