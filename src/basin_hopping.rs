use crate::symbolic::CompiledExpr;

use argmin::core::{
    CostFunction, Error, Executor, Gradient, State, TerminationReason, TerminationStatus,
};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use log::{debug, trace};
use ndarray::Array1;
use rand::prelude::*;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

const LBFGS_MEMORY: usize = 7;

/// Outcome of one global-search run
///
/// `success` reports whether the local solve that achieved the best
/// objective value terminated by convergence; iteration-cap exhaustion
/// and solver failures count as non-success.
#[derive(Clone, Debug)]
pub struct MinimizeResult {
    pub x: Array1<f64>,
    pub fun: f64,
    pub success: bool,
}

/// Basin-hopping global minimizer
///
/// A local gradient-based minimizer (L-BFGS with a More–Thuente line
/// search) wrapped in random-restart hops: after the initial local solve,
/// each hop perturbs the current position by a uniform step, re-minimizes
/// locally and accepts or rejects the move with a Metropolis criterion at
/// unit temperature. The hop random stream is seeded per run, so a run is
/// a pure function of its inputs.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct BasinHopping {
    pub niter: u32,
    pub step_size: f64,
    pub inner_tol: f64,
    pub inner_max_iters: u64,
    pub seed: u64,
}

impl BasinHopping {
    /// Create a new [BasinHopping].
    ///
    /// # Arguments
    /// - `niter`: number of hops after the initial local solve
    /// - `step_size`: half-width of the uniform hop perturbation
    /// - `inner_tol`: cost-change tolerance of the local solver
    /// - `inner_max_iters`: iteration cap of one local solve
    /// - `seed`: seed of the hop random stream
    pub fn new(niter: u32, step_size: f64, inner_tol: f64, inner_max_iters: u64, seed: u64) -> Self {
        assert!(
            step_size > 0.0 && step_size.is_finite(),
            "step_size must be positive and finite"
        );
        assert!(
            inner_tol > 0.0 && inner_tol.is_finite(),
            "inner_tol must be positive and finite"
        );
        Self {
            niter,
            step_size,
            inner_tol,
            inner_max_iters,
            seed,
        }
    }

    #[inline]
    pub fn default_niter() -> u32 {
        10
    }

    #[inline]
    pub fn default_step_size() -> f64 {
        0.5
    }

    #[inline]
    pub fn default_inner_tol() -> f64 {
        1e-4
    }

    #[inline]
    pub fn default_inner_max_iters() -> u64 {
        1000
    }

    #[inline]
    pub fn default_seed() -> u64 {
        12345678
    }

    /// Run one seeded basin-hopping search from `x0`
    pub fn minimize(&self, objective: &CompiledExpr, x0: Array1<f64>) -> MinimizeResult {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut best = self.local_minimize(objective, x0);
        let mut current = best.clone();
        for hop in 0..self.niter {
            let trial = perturb(&current.x, &mut rng, self.step_size);
            let candidate = self.local_minimize(objective, trial);
            trace!(
                "hop {hop}: candidate {:e} vs current {:e}",
                candidate.fun, current.fun
            );
            if candidate.fun < best.fun {
                best = candidate.clone();
            }
            let accept = candidate.fun <= current.fun
                || rng.random::<f64>() < f64::exp(current.fun - candidate.fun);
            if accept {
                current = candidate;
            }
        }
        best
    }

    fn local_minimize(&self, objective: &CompiledExpr, x0: Array1<f64>) -> MinimizeResult {
        let failure = |x0: Array1<f64>| {
            let fun = objective.value(x0.view());
            MinimizeResult {
                x: x0,
                fun,
                success: false,
            }
        };

        let linesearch = MoreThuenteLineSearch::new();
        let solver = match LBFGS::new(linesearch, LBFGS_MEMORY).with_tolerance_cost(self.inner_tol)
        {
            Ok(solver) => solver,
            // A rejected configuration counts as a failed solve
            Err(error) => {
                debug!("L-BFGS rejected the configuration: {error}");
                return failure(x0);
            }
        };
        let executor = Executor::new(NegLogLike { tape: objective }, solver).configure(|state| {
            state
                .param(x0.clone())
                .max_iters(self.inner_max_iters)
        });
        match executor.run() {
            Ok(result) => {
                let state = result.state();
                let success = matches!(
                    state.get_termination_status(),
                    TerminationStatus::Terminated(
                        TerminationReason::SolverConverged | TerminationReason::TargetCostReached
                    )
                );
                let x = state.get_best_param().cloned().unwrap_or(x0);
                MinimizeResult {
                    fun: state.get_best_cost(),
                    x,
                    success,
                }
            }
            Err(error) => {
                debug!("local solve failed: {error}");
                failure(x0)
            }
        }
    }
}

impl Default for BasinHopping {
    fn default() -> Self {
        Self::new(
            Self::default_niter(),
            Self::default_step_size(),
            Self::default_inner_tol(),
            Self::default_inner_max_iters(),
            Self::default_seed(),
        )
    }
}

fn perturb(x: &Array1<f64>, rng: &mut StdRng, step: f64) -> Array1<f64> {
    Array1::from_shape_fn(x.len(), |i| x[i] + step * (2.0 * rng.random::<f64>() - 1.0))
}

struct NegLogLike<'a> {
    tape: &'a CompiledExpr,
}

impl CostFunction for NegLogLike<'_> {
    type Param = Array1<f64>;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> Result<Self::Output, Error> {
        Ok(self.tape.value(param.view()))
    }
}

impl Gradient for NegLogLike<'_> {
    type Param = Array1<f64>;
    type Gradient = Array1<f64>;

    fn gradient(&self, param: &Self::Param) -> Result<Self::Gradient, Error> {
        Ok(self.tape.value_and_grad(param.view()).1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolic::{Expr, Symbol, compile};

    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn paraboloid() -> (CompiledExpr, Vec<Symbol>) {
        let variables = vec![Symbol::new("x"), Symbol::new("y")];
        let x = Expr::from(&variables[0]);
        let y = Expr::from(&variables[1]);
        let expr = (x - 2.0).powi(2) + (y + 1.0).powi(2) + 3.0;
        (compile(&expr, &variables).unwrap(), variables)
    }

    #[test]
    fn finds_the_paraboloid_minimum() {
        let (objective, _) = paraboloid();
        let result = BasinHopping::default().minimize(&objective, array![0.0, 0.0]);
        assert!(result.success);
        assert_abs_diff_eq!(result.x[0], 2.0, epsilon = 1e-3);
        assert_abs_diff_eq!(result.x[1], -1.0, epsilon = 1e-3);
        assert_abs_diff_eq!(result.fun, 3.0, epsilon = 1e-4);
    }

    #[test]
    fn escapes_a_local_basin() {
        // Double well tilted so the right minimum is global.
        let variables = vec![Symbol::new("x")];
        let x = Expr::from(&variables[0]);
        let expr = (x.clone().powi(2) - 1.0).powi(2) - x * 0.2;
        let objective = compile(&expr, &variables).unwrap();

        // Start inside the left (worse) basin; hops wide enough to cross
        // the barrier near zero.
        let hopper = BasinHopping::new(50, 2.0, 1e-4, 1000, BasinHopping::default_seed());
        let result = hopper.minimize(&objective, array![-1.0]);
        assert!(result.success);
        assert!(result.x[0] > 0.9, "stuck at {}", result.x[0]);
    }

    #[test]
    fn seeded_runs_are_identical() {
        let (objective, _) = paraboloid();
        let hopper = BasinHopping::default();
        let a = hopper.minimize(&objective, array![7.0, -5.0]);
        let b = hopper.minimize(&objective, array![7.0, -5.0]);
        assert_eq!(a.x, b.x);
        assert_eq!(a.fun, b.fun);
        assert_eq!(a.success, b.success);
    }

    #[test]
    fn iteration_cap_zero_reports_non_success() {
        let (objective, _) = paraboloid();
        let hopper = BasinHopping {
            inner_max_iters: 0,
            ..BasinHopping::default()
        };
        let result = hopper.minimize(&objective, array![0.0, 0.0]);
        assert!(!result.success);
    }
}
