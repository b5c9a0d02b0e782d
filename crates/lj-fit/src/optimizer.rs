//! Optimization algorithms
//!
//! This module provides wrappers around argmin optimizers with a clean interface.
//! The fitter only sees the [`Minimizer`] trait, so engines are interchangeable.

use argmin::core::{CostFunction, Executor, Gradient, State, TerminationReason, TerminationStatus};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::neldermead::NelderMead;
use argmin::solver::quasinewton::LBFGS;
use lj_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Minimization engine selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MinimizerEngine {
    /// L-BFGS with box constraints via clamping (numerical gradient).
    #[default]
    Lbfgsb,
    /// Gradient-free downhill simplex.
    NelderMead,
}

/// Configuration for the minimizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Engine used for every hypothesis.
    pub engine: MinimizerEngine,
    /// Maximum number of iterations
    pub max_iter: u64,
    /// Convergence tolerance (gradient norm for L-BFGS, simplex cost spread for Nelder-Mead)
    pub tol: f64,
    /// Number of corrections to approximate inverse Hessian
    pub m: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self { engine: MinimizerEngine::Lbfgsb, max_iter: 500, tol: 1e-6, m: 10 }
    }
}

impl OptimizerConfig {
    /// Reject settings the engines cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_iter == 0 {
            return Err(Error::Validation("optimizer.max_iter must be > 0".into()));
        }
        if !(self.tol.is_finite() && self.tol >= 0.0) {
            return Err(Error::Validation(format!(
                "optimizer.tol must be finite and >= 0, got {}",
                self.tol
            )));
        }
        if self.m == 0 {
            return Err(Error::Validation("optimizer.m must be > 0".into()));
        }
        Ok(())
    }

    /// Build the configured engine.
    pub fn build(&self) -> Box<dyn Minimizer> {
        match self.engine {
            MinimizerEngine::Lbfgsb => Box::new(LbfgsbOptimizer::new(self.clone())),
            MinimizerEngine::NelderMead => Box::new(NelderMeadOptimizer::new(self.clone())),
        }
    }
}

/// Result of optimization
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// Best-fit parameters
    pub parameters: Vec<f64>,
    /// Function value at minimum
    pub fval: f64,
    /// Number of iterations
    pub n_iter: u64,
    /// Number of objective (cost) evaluations.
    pub n_fev: usize,
    /// Number of gradient evaluations.
    pub n_gev: usize,
    /// Convergence status
    pub converged: bool,
    /// Termination message
    pub message: String,
}

impl fmt::Display for OptimizationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OptimizationResult(fval={:.6}, n_iter={}, n_fev={}, n_gev={}, converged={})",
            self.fval, self.n_iter, self.n_fev, self.n_gev, self.converged
        )
    }
}

/// Scalar objective over a real parameter vector.
pub trait ObjectiveFunction: Send + Sync {
    /// Objective value at `params`.
    fn eval(&self, params: &[f64]) -> Result<f64>;

    /// Gradient at `params`.
    ///
    /// The default takes central differences with step `1e-8 * max(|x_i|, 1)`.
    fn gradient(&self, params: &[f64]) -> Result<Vec<f64>> {
        let mut x = params.to_vec();
        let mut grad = Vec::with_capacity(x.len());
        for i in 0..x.len() {
            let xi = x[i];
            let h = 1e-8 * xi.abs().max(1.0);
            x[i] = xi + h;
            let up = self.eval(&x)?;
            x[i] = xi - h;
            let down = self.eval(&x)?;
            x[i] = xi;
            grad.push((up - down) / (2.0 * h));
        }
        Ok(grad)
    }
}

/// Minimize a scalar objective over a box-bounded real vector.
///
/// Implementations must not keep state between calls, so one instance can be
/// shared by concurrent hypothesis fits.
pub trait Minimizer: Send + Sync {
    /// Minimize `objective` starting at `init_params` within `bounds`.
    fn minimize(
        &self,
        objective: &dyn ObjectiveFunction,
        init_params: &[f64],
        bounds: &[(f64, f64)],
    ) -> Result<OptimizationResult>;

    /// Engine name for logs.
    fn name(&self) -> &str;
}

#[derive(Default)]
struct EvalCounters {
    cost: AtomicUsize,
    grad: AtomicUsize,
}

/// An [`ObjectiveFunction`] seen by argmin through a bounding box: every
/// evaluation happens at the clamped point.
struct BoxedProblem<'a> {
    objective: &'a dyn ObjectiveFunction,
    bounds: &'a [(f64, f64)],
    counters: &'a EvalCounters,
}

fn to_argmin(e: Error) -> argmin::core::Error {
    argmin::core::Error::msg(e.to_string())
}

impl CostFunction for BoxedProblem<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, params: &Vec<f64>) -> std::result::Result<f64, argmin::core::Error> {
        self.counters.cost.fetch_add(1, Ordering::Relaxed);
        self.objective.eval(&clamp_params(params, self.bounds)).map_err(to_argmin)
    }
}

impl Gradient for BoxedProblem<'_> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, params: &Vec<f64>) -> std::result::Result<Vec<f64>, argmin::core::Error> {
        self.counters.grad.fetch_add(1, Ordering::Relaxed);
        let x = clamp_params(params, self.bounds);
        let mut grad = self.objective.gradient(&x).map_err(to_argmin)?;
        project_gradient(&x, self.bounds, &mut grad);
        Ok(grad)
    }
}

fn clamp_params(params: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    params.iter().zip(bounds).map(|(&x, &(lo, hi))| x.clamp(lo, hi)).collect()
}

/// Zero the components that point out of the box at an active bound.
fn project_gradient(x: &[f64], bounds: &[(f64, f64)], grad: &mut [f64]) {
    const ACTIVE: f64 = 1e-12;
    for ((g, &xi), &(lo, hi)) in grad.iter_mut().zip(x).zip(bounds) {
        if (xi <= lo + ACTIVE && *g > 0.0) || (xi >= hi - ACTIVE && *g < 0.0) {
            *g = 0.0;
        }
    }
}

fn check_lengths(init_params: &[f64], bounds: &[(f64, f64)]) -> Result<()> {
    if init_params.len() != bounds.len() {
        return Err(Error::Validation(format!(
            "Parameter and bounds length mismatch: {} != {}",
            init_params.len(),
            bounds.len()
        )));
    }
    if let Some(&(lo, hi)) = bounds.iter().find(|(lo, hi)| lo.is_nan() || hi.is_nan() || lo > hi) {
        return Err(Error::Validation(format!("Invalid bounds: ({lo}, {hi})")));
    }
    Ok(())
}

fn is_converged(termination: &TerminationStatus) -> bool {
    matches!(
        termination,
        TerminationStatus::Terminated(TerminationReason::SolverConverged)
            | TerminationStatus::Terminated(TerminationReason::TargetCostReached)
    )
}

/// Collect the best point of a finished argmin run.
fn summarize<S>(
    state: &S,
    bounds: &[(f64, f64)],
    counters: &EvalCounters,
) -> Result<OptimizationResult>
where
    S: State<Param = Vec<f64>, Float = f64>,
{
    let best = state
        .get_best_param()
        .ok_or_else(|| Error::Computation("No best parameters found".to_string()))?;
    let termination = state.get_termination_status();
    Ok(OptimizationResult {
        parameters: clamp_params(best, bounds),
        fval: state.get_best_cost(),
        n_iter: state.get_iter(),
        n_fev: counters.cost.load(Ordering::Relaxed),
        n_gev: counters.grad.load(Ordering::Relaxed),
        converged: is_converged(termination),
        message: termination.to_string(),
    })
}

/// L-BFGS on the clamped problem with a projected gradient.
///
/// A run that stops early (the More-Thuente search rejects a direction that
/// is no longer descending once a bound turns active) is accepted if the
/// projected gradient at its best point is within `tol * max(1, |f|)`, and
/// otherwise polished by [`NelderMeadOptimizer`] from that point.
pub struct LbfgsbOptimizer {
    config: OptimizerConfig,
}

impl LbfgsbOptimizer {
    /// Create new L-BFGS-B optimizer with given configuration
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    fn is_stationary(
        &self,
        objective: &dyn ObjectiveFunction,
        bounds: &[(f64, f64)],
        x: &[f64],
        fval: f64,
    ) -> Result<(bool, f64)> {
        let mut pg = objective.gradient(x)?;
        project_gradient(x, bounds, &mut pg);
        let norm = pg.iter().map(|g| g * g).sum::<f64>().sqrt();
        Ok((norm <= self.config.tol * fval.abs().max(1.0), norm))
    }

    fn recover(
        &self,
        objective: &dyn ObjectiveFunction,
        bounds: &[(f64, f64)],
        stopped: OptimizationResult,
    ) -> Result<OptimizationResult> {
        let (stationary, pg_norm) =
            self.is_stationary(objective, bounds, &stopped.parameters, stopped.fval)?;
        if stationary {
            log::debug!(
                "L-BFGS-B stopped ({}) at a stationary point, |pg| = {pg_norm:.3e}",
                stopped.message
            );
            return Ok(OptimizationResult {
                converged: true,
                n_gev: stopped.n_gev + 1,
                message: format!(
                    "{}; projected gradient {pg_norm:.3e} within tolerance",
                    stopped.message
                ),
                ..stopped
            });
        }

        let polish_config = OptimizerConfig {
            engine: MinimizerEngine::NelderMead,
            max_iter: self.config.max_iter.max(200 * bounds.len() as u64),
            ..self.config.clone()
        };
        let polished = NelderMeadOptimizer::new(polish_config)
            .with_step_fraction(0.01)
            .minimize(objective, &stopped.parameters, bounds)?;
        log::debug!(
            "L-BFGS-B stopped ({}), |pg| = {pg_norm:.3e}; Nelder-Mead restart {:.6} -> {:.6}",
            stopped.message,
            stopped.fval,
            polished.fval
        );

        let converged = polished.converged
            || self.is_stationary(objective, bounds, &polished.parameters, polished.fval)?.0;
        Ok(OptimizationResult {
            n_iter: stopped.n_iter + polished.n_iter,
            n_fev: stopped.n_fev + polished.n_fev,
            n_gev: stopped.n_gev + 1,
            converged,
            message: format!("{} -> Nelder-Mead: {}", stopped.message, polished.message),
            ..polished
        })
    }
}

impl Default for LbfgsbOptimizer {
    fn default() -> Self {
        Self::new(OptimizerConfig::default())
    }
}

impl Minimizer for LbfgsbOptimizer {
    fn minimize(
        &self,
        objective: &dyn ObjectiveFunction,
        init_params: &[f64],
        bounds: &[(f64, f64)],
    ) -> Result<OptimizationResult> {
        check_lengths(init_params, bounds)?;

        let counters = EvalCounters::default();
        let problem = BoxedProblem { objective, bounds, counters: &counters };

        // argmin's default cost tolerance (~EPS) is far stricter than chi-square needs.
        let tol_cost =
            if self.config.tol == 0.0 { 0.0 } else { (0.1 * self.config.tol).max(1e-12) };
        let solver = LBFGS::new(MoreThuenteLineSearch::new(), self.config.m)
            .with_tolerance_grad(self.config.tol)
            .and_then(|s| s.with_tolerance_cost(tol_cost))
            .map_err(|e| Error::Validation(format!("Invalid optimizer configuration (tol): {e}")))?;

        let res = Executor::new(problem, solver)
            .configure(|state| {
                state.param(clamp_params(init_params, bounds)).max_iters(self.config.max_iter)
            })
            .run()
            .map_err(|e| Error::Computation(format!("Optimization failed: {e}")))?;

        let result = summarize(res.state(), bounds, &counters)?;
        if result.converged { Ok(result) } else { self.recover(objective, bounds, result) }
    }

    fn name(&self) -> &str {
        "L-BFGS-B"
    }
}

/// Nelder-Mead simplex optimizer; bounds are enforced by clamping.
pub struct NelderMeadOptimizer {
    config: OptimizerConfig,
    step_fraction: f64,
}

impl NelderMeadOptimizer {
    /// Create new Nelder-Mead optimizer with given configuration
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config, step_fraction: 0.1 }
    }

    /// Initial simplex edge as a fraction of each box width (default 0.1).
    pub fn with_step_fraction(mut self, fraction: f64) -> Self {
        self.step_fraction = fraction;
        self
    }

    /// The start point plus one vertex per axis.
    fn initial_simplex(&self, init: &[f64], bounds: &[(f64, f64)]) -> Vec<Vec<f64>> {
        let mut simplex = Vec::with_capacity(init.len() + 1);
        simplex.push(init.to_vec());
        for (i, &(lo, hi)) in bounds.iter().enumerate() {
            let step = (self.step_fraction * (hi - lo)).max(1e-6);
            let mut vertex = init.to_vec();
            // Step inward when the start point sits on the upper bound.
            vertex[i] = if init[i] + step <= hi { init[i] + step } else { init[i] - step };
            simplex.push(vertex);
        }
        simplex
    }
}

impl Default for NelderMeadOptimizer {
    fn default() -> Self {
        Self::new(OptimizerConfig { engine: MinimizerEngine::NelderMead, ..Default::default() })
    }
}

impl Minimizer for NelderMeadOptimizer {
    fn minimize(
        &self,
        objective: &dyn ObjectiveFunction,
        init_params: &[f64],
        bounds: &[(f64, f64)],
    ) -> Result<OptimizationResult> {
        check_lengths(init_params, bounds)?;

        let counters = EvalCounters::default();
        let problem = BoxedProblem { objective, bounds, counters: &counters };
        let simplex = self.initial_simplex(&clamp_params(init_params, bounds), bounds);

        let solver = NelderMead::new(simplex)
            .with_sd_tolerance(self.config.tol)
            .map_err(|e| Error::Validation(format!("Invalid optimizer configuration (tol): {e}")))?;

        let res = Executor::new(problem, solver)
            .configure(|state| state.max_iters(self.config.max_iter))
            .run()
            .map_err(|e| Error::Computation(format!("Optimization failed: {e}")))?;

        summarize(res.state(), bounds, &counters)
    }

    fn name(&self) -> &str {
        "Nelder-Mead"
    }
}
