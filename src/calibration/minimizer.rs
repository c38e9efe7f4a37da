//! Nelder–Mead runs on `argmin`, started from a randomly oriented simplex.

use std::cell::RefCell;

use argmin::core::{CostFunction, Error, Executor, State};
use argmin::solver::neldermead::NelderMead;
use rand::Rng;
use thiserror::Error;

/// Why a single minimization run stopped without a result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimplexError {
    #[error("objective returned a non-finite value")]
    NonFiniteValue,
    #[error("start point has {start} parameters but {steps} step sizes were given")]
    DimensionMismatch { start: usize, steps: usize },
    #[error("minimizer failed: {0}")]
    Minimizer(String),
}

impl SimplexError {
    fn from_argmin(error: Error) -> Self {
        match error.downcast_ref::<SimplexError>() {
            Some(e) => e.clone(),
            None => SimplexError::Minimizer(error.to_string()),
        }
    }
}

/// Stopping criteria for [`minimize`].
#[derive(Debug, Clone, Copy)]
pub struct StopCriteria {
    /// Hard iteration cap.
    pub max_iterations: u64,
    /// Stop once the standard deviation of the vertex costs drops below this.
    pub sd_tolerance: f64,
    /// Stop once the best value drops below this.
    pub target_value: f64,
}

/// Best vertex of a minimization run.
#[derive(Debug, Clone, PartialEq)]
pub struct Minimum {
    pub point: Vec<f64>,
    pub value: f64,
    pub iterations: u64,
}

/// A run that stopped on an error, with the best vertex it had evaluated.
#[derive(Debug, Clone)]
pub struct RunFailure {
    pub error: SimplexError,
    pub last: Option<Minimum>,
}

/// Wraps a cost function, rejecting non-finite values and remembering the
/// best finite vertex seen so far.
struct TrackedCost<'a, C> {
    inner: &'a C,
    best: &'a RefCell<Option<Minimum>>,
}

impl<C> CostFunction for TrackedCost<'_, C>
where
    C: CostFunction<Param = Vec<f64>, Output = f64>,
{
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> Result<Self::Output, Error> {
        let value = self.inner.cost(param)?;
        if !value.is_finite() {
            return Err(SimplexError::NonFiniteValue.into());
        }

        let mut best = self.best.borrow_mut();
        if best.as_ref().map_or(true, |b| value < b.value) {
            *best = Some(Minimum {
                point: param.clone(),
                value,
                iterations: 0,
            });
        }
        Ok(value)
    }
}

/// Start simplex: `start` plus one vertex along each axis of a random
/// orthonormal basis, scaled per parameter by `steps`.
pub fn start_simplex<R: Rng + ?Sized>(start: &[f64], steps: &[f64], rng: &mut R) -> Vec<Vec<f64>> {
    let mut vertices = Vec::with_capacity(start.len() + 1);
    vertices.push(start.to_vec());
    for direction in random_orthonormal_basis(start.len(), rng) {
        let vertex = start
            .iter()
            .zip(steps)
            .zip(&direction)
            .map(|((x, s), d)| x + s * d)
            .collect();
        vertices.push(vertex);
    }
    vertices
}

/// Minimizes `cost` from `start` with argmin's Nelder–Mead.
///
/// On failure the best finite vertex evaluated before the error is handed
/// back with it.
pub fn minimize<C, R>(
    cost: &C,
    start: &[f64],
    steps: &[f64],
    criteria: &StopCriteria,
    rng: &mut R,
) -> Result<Minimum, RunFailure>
where
    C: CostFunction<Param = Vec<f64>, Output = f64>,
    R: Rng + ?Sized,
{
    if start.is_empty() || start.len() != steps.len() {
        return Err(RunFailure {
            error: SimplexError::DimensionMismatch {
                start: start.len(),
                steps: steps.len(),
            },
            last: None,
        });
    }

    let best = RefCell::new(None);
    let tracked = TrackedCost { inner: cost, best: &best };
    let outcome = NelderMead::new(start_simplex(start, steps, rng))
        .with_sd_tolerance(criteria.sd_tolerance)
        .and_then(|solver| {
            Executor::new(tracked, solver)
                .configure(|state| {
                    state
                        .max_iters(criteria.max_iterations)
                        .target_cost(criteria.target_value)
                })
                .run()
        });

    let failure = |error: SimplexError| RunFailure {
        error,
        last: best.borrow_mut().take(),
    };
    match outcome {
        Ok(result) => {
            let state = result.state();
            match state.get_best_param() {
                Some(point) => Ok(Minimum {
                    point: point.clone(),
                    value: state.get_best_cost(),
                    iterations: state.get_iter(),
                }),
                None => Err(failure(SimplexError::Minimizer("no best vertex".to_string()))),
            }
        }
        Err(error) => Err(failure(SimplexError::from_argmin(error))),
    }
}

/// Gram–Schmidt over random vectors; falls back to the unit axis when a
/// draw is nearly dependent on the previous ones.
fn random_orthonormal_basis<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<Vec<f64>> {
    let mut basis: Vec<Vec<f64>> = Vec::with_capacity(n);
    for axis in 0..n {
        let draw: Vec<f64> = (0..n).map(|_| rng.random_range(-1.0..1.0)).collect();
        let v = orthonormalize(draw, &basis).unwrap_or_else(|| {
            let unit = (0..n).map(|i| if i == axis { 1.0 } else { 0.0 }).collect();
            orthonormalize(unit, &basis).unwrap_or_default()
        });
        basis.push(v);
    }
    basis
}

fn orthonormalize(mut v: Vec<f64>, basis: &[Vec<f64>]) -> Option<Vec<f64>> {
    for b in basis {
        let dot: f64 = v.iter().zip(b).map(|(x, y)| x * y).sum();
        v.iter_mut().zip(b).for_each(|(x, y)| *x -= dot * y);
    }
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm < 1e-6 {
        return None;
    }
    v.iter_mut().for_each(|x| *x /= norm);
    Some(v)
}
