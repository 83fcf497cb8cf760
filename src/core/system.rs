//! User-supplied system callbacks.
//!
//! A nonlinear system is provided to the solver as a type implementing
//! [`System`] (residual evaluation) and, for the analytic-Jacobian entry
//! points, [`AnalyticSystem`]. Both callbacks write into pre-sized output
//! buffers owned by the solver workspace, so a solve performs no allocation
//! inside the iteration.
//!
//! # Cooperative cancellation
//!
//! Every callback returns an [`EvalResult`]. Returning `Err(EvalAborted)`
//! terminates the solve with [`SolveStatus::UserAsked`](crate::SolveStatus)
//! at the next check, which is always immediately after the call; the solver
//! never invokes a callback again after an abort.

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

/// Cancellation signal returned by a system callback.
///
/// Carries no payload: the solver reports the abort through its status, and
/// the iterate at the time of the abort stays in the caller's `x`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("evaluation aborted by the system callback")]
pub struct EvalAborted;

/// Result type returned by system callbacks.
pub type EvalResult = Result<(), EvalAborted>;

/// A dense square system of nonlinear equations `F(x) = 0`.
///
/// `eval` must be defined for every `x` the solver passes; the solver probes
/// trial points that may lie outside any region the caller considers
/// interesting. The callback may use internal parallelism; the solver treats
/// each call as opaque and synchronous.
pub trait System {
    /// Evaluate `F(x)` into `fvec`. Both vectors have length n.
    fn eval(&self, x: &DVector<f64>, fvec: &mut DVector<f64>) -> EvalResult;
}

/// A [`System`] that can also evaluate its Jacobian analytically.
///
/// `jacobian` fills the dense n×n matrix `jac` with `∂Fᵢ/∂xⱼ` at `x`.
/// Entries that are structurally zero must still be written (the solver
/// reuses the buffer across iterations).
pub trait AnalyticSystem: System {
    /// Evaluate `J(x) = ∂F/∂x` into `jac`.
    fn jacobian(&self, x: &DVector<f64>, jac: &mut DMatrix<f64>) -> EvalResult;
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::dvector;

    struct Linear;

    impl System for Linear {
        fn eval(&self, x: &DVector<f64>, fvec: &mut DVector<f64>) -> EvalResult {
            fvec[0] = x[0] + x[1] - 3.0;
            fvec[1] = 2.0 * x[0] - x[1];
            Ok(())
        }
    }

    #[test]
    fn test_eval_writes_residual() {
        let system = Linear;
        let x = dvector![1.0, 2.0];
        let mut fvec = DVector::zeros(2);
        assert!(system.eval(&x, &mut fvec).is_ok());
        assert_eq!(fvec, dvector![0.0, 0.0]);
    }

    #[test]
    fn test_eval_aborted_display() {
        let err = EvalAborted;
        assert!(err.to_string().contains("aborted"));
    }
}
