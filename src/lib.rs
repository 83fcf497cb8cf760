//! # hybrd-solver
//!
//! A Rust library for solving dense systems of nonlinear equations `F(x) = 0`
//! with `F : ℝⁿ → ℝⁿ`, using the Powell hybrid method: a trust-region dogleg
//! scheme with Broyden rank-one updates of the QR factorization between full
//! Jacobian evaluations.
//!
//! ## Features
//!
//! - **Two Jacobian sources**: a caller-supplied analytic Jacobian, or a
//!   forward-difference approximation with optional bandwidth
//! - **Trust-region globalization**: dogleg steps mixing the Gauss-Newton and
//!   scaled steepest-descent directions, with adaptive radius control
//! - **Cheap inner iterations**: rank-one QR updates keep each step at O(n²)
//!   between Jacobian refreshes
//! - **Cooperative cancellation**: the user callback can abort the solve at
//!   any evaluation
//! - **Detailed diagnostics**: per-iteration statistics at debug log level
//!
//! ## Quick start
//!
//! ```no_run
//! use hybrd_solver::{AnalyticSystem, EvalResult, HybridSolver, System};
//! use nalgebra::{DMatrix, DVector, dvector};
//!
//! struct Rosenbrock;
//!
//! impl System for Rosenbrock {
//!     fn eval(&self, x: &DVector<f64>, fvec: &mut DVector<f64>) -> EvalResult {
//!         fvec[0] = 10.0 * (x[1] - x[0] * x[0]);
//!         fvec[1] = 1.0 - x[0];
//!         Ok(())
//!     }
//! }
//!
//! impl AnalyticSystem for Rosenbrock {
//!     fn jacobian(&self, x: &DVector<f64>, jac: &mut DMatrix<f64>) -> EvalResult {
//!         jac[(0, 0)] = -20.0 * x[0];
//!         jac[(0, 1)] = 10.0;
//!         jac[(1, 0)] = -1.0;
//!         jac[(1, 1)] = 0.0;
//!         Ok(())
//!     }
//! }
//!
//! let system = Rosenbrock;
//! let mut solver = HybridSolver::new(&system);
//! let mut x = dvector![-1.2, 1.0];
//! let status = solver.solve(&mut x);
//! assert!(status.converged());
//! ```

pub mod core;
pub mod linalg;
#[cfg(feature = "logging")]
pub mod logger;
pub mod numdiff;
pub mod solver;

pub use crate::core::system::{AnalyticSystem, EvalAborted, EvalResult, System};
pub use crate::core::workspace::HybridWorkspace;

#[cfg(feature = "logging")]
pub use crate::logger::{init_logger, init_logger_with_level};
pub use crate::solver::{HybridConfig, Scaling, SolveStatus, hybrid::HybridSolver};
