//! Powell hybrid trust-region driver.
//!
//! Solves `F(x) = 0` for dense square systems by combining Gauss-Newton and
//! scaled steepest-descent directions in a dogleg step, with a trust radius
//! adapted from the gain ratio of achieved to predicted residual reduction.
//!
//! # Algorithm Overview
//!
//! The driver alternates two nested loops.
//!
//! **Outer loop** (one pass per Jacobian evaluation):
//! 1. Compute the Jacobian, analytically or by forward differences
//! 2. Factor it as `Q·R` with Householder reflections
//! 3. On the very first pass, seed the scaling diagonal D from the column
//!    norms and set the trust radius to `factor·‖D·x₀‖`
//! 4. Form `Qᵀ·F`, pack R, expand Q, and grow D monotonically
//!
//! **Inner loop** (one pass per trial step, reusing the factorization):
//! 1. Take the dogleg step p for the current radius δ
//! 2. Evaluate `F(x + p)` and compare the achieved reduction of `‖F‖²`
//!    against the reduction predicted by the linear model
//! 3. Shrink δ after poor steps, widen it after good ones; accept the
//!    trial point when the gain ratio clears a small threshold
//! 4. Run the convergence and stagnation tests
//! 5. After two consecutive poor steps, return to the outer loop for a
//!    fresh Jacobian; otherwise absorb the step into the factorization
//!    with a Broyden rank-one update and iterate again
//!
//! The rank-one update keeps inner iterations at O(n²): the QR factors, and
//! `Qᵀ·F` with them, are rotated in place instead of being recomputed.
//!
//! # Termination
//!
//! A solve always ends with one of the [`SolveStatus`] values: convergence
//! on the scaled step (`RelativeErrorTooSmall`, the single success),
//! evaluation budget exhaustion, a tolerance below working precision,
//! stagnation over five Jacobians or ten iterations, or a callback abort.
//!
//! # Examples
//!
//! ```no_run
//! use hybrd_solver::{EvalResult, HybridConfig, HybridSolver, System};
//! use nalgebra::{DVector, dvector};
//!
//! struct Powell;
//!
//! impl System for Powell {
//!     fn eval(&self, x: &DVector<f64>, fvec: &mut DVector<f64>) -> EvalResult {
//!         fvec[0] = x[0] + 10.0 * x[1];
//!         fvec[1] = 5.0_f64.sqrt() * (x[2] - x[3]);
//!         fvec[2] = (x[1] - 2.0 * x[2]).powi(2);
//!         fvec[3] = 10.0_f64.sqrt() * (x[0] - x[3]).powi(2);
//!         Ok(())
//!     }
//! }
//!
//! let system = Powell;
//! let config = HybridConfig::new().with_xtol(1e-10);
//! let mut solver = HybridSolver::with_config(&system, config);
//! let mut x = dvector![3.0, -1.0, 0.0, 1.0];
//! let status = solver.solve_numerical(&mut x);
//! println!("{status}: |F| = {:.3e}", solver.workspace.fvec.norm());
//! ```

use nalgebra::DVector;
use tracing::{Level, debug};

use crate::core::system::{AnalyticSystem, EvalResult, System};
use crate::core::workspace::HybridWorkspace;
use crate::linalg::{dogleg, qr, rank_one};
use crate::numdiff;
use crate::solver::{HybridConfig, IterationStats, Scaling, SolveStatus};

/// `‖D·x‖` without forming the product vector.
fn scaled_norm(diag: &DVector<f64>, x: &DVector<f64>) -> f64 {
    let mut sum = 0.0;
    for j in 0..x.len() {
        sum += (diag[j] * x[j]) * (diag[j] * x[j]);
    }
    sum.sqrt()
}

/// Factorization invariants checked at the top of every inner iteration in
/// debug builds.
#[cfg(debug_assertions)]
fn check_inner_invariants(ws: &HybridWorkspace, fnorm: f64, delta: f64) {
    let n = ws.fvec.len();
    debug_assert!(delta > 0.0, "trust radius must stay positive");
    let mut max_dev = 0.0_f64;
    for i in 0..n {
        for j in 0..n {
            let mut sum = 0.0;
            for k in 0..n {
                sum += ws.fjac[(k, i)] * ws.fjac[(k, j)];
            }
            let target = if i == j { 1.0 } else { 0.0 };
            max_dev = max_dev.max((sum - target).abs());
        }
    }
    debug_assert!(
        max_dev <= 1e-11 * n as f64,
        "orthogonal factor drifted: max deviation {max_dev:.3e}"
    );
    if ws.jeval {
        // right after a refresh, qtf must reproduce Qᵀ·F
        for j in 0..n {
            let mut sum = 0.0;
            for i in 0..n {
                sum += ws.fjac[(i, j)] * ws.fvec[i];
            }
            debug_assert!(
                (sum - ws.qtf[j]).abs() <= 1e-12 * n as f64 * (1.0 + fnorm),
                "qtf inconsistent with the fresh factorization"
            );
        }
    }
}

/// Monotone growth of the scaling diagonal under automatic scaling,
/// checked around each rescale in debug builds.
#[cfg(debug_assertions)]
fn check_diag_monotone(before: &DVector<f64>, after: &DVector<f64>) {
    for j in 0..after.len() {
        debug_assert!(
            after[j] >= before[j],
            "scaling diagonal shrank at component {j}: {} -> {}",
            before[j],
            after[j]
        );
    }
}

/// Powell hybrid solver for dense systems of nonlinear equations.
///
/// The solver borrows the system for its lifetime and owns a
/// [`HybridWorkspace`] that is resized per solve and exposes the residual,
/// the QR factors, the scaling diagonal, and the evaluation counters after
/// every solve. See the [module docs](self) for the algorithm.
///
/// Entry points come in two families: [`solve`](HybridSolver::solve) /
/// [`solve_with_tol`](HybridSolver::solve_with_tol) consume the analytic
/// Jacobian of an [`AnalyticSystem`], while
/// [`solve_numerical`](HybridSolver::solve_numerical) /
/// [`solve_numerical_with_tol`](HybridSolver::solve_numerical_with_tol)
/// approximate the Jacobian by forward differences and only need a
/// [`System`].
pub struct HybridSolver<'a, S> {
    system: &'a S,
    config: HybridConfig,
    /// Working storage; populated on return from any entry point.
    pub workspace: HybridWorkspace,
}

impl<'a, S> HybridSolver<'a, S> {
    /// Create a solver with the default configuration.
    pub fn new(system: &'a S) -> Self {
        Self::with_config(system, HybridConfig::default())
    }

    /// Create a solver with the given configuration.
    pub fn with_config(system: &'a S, config: HybridConfig) -> Self {
        Self {
            system,
            config,
            workspace: HybridWorkspace::new(),
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &HybridConfig {
        &self.config
    }
}

impl<'a, S: System> HybridSolver<'a, S> {
    /// Validate the inputs and size the workspace.
    fn prepare(&mut self, x: &DVector<f64>) -> Result<(), SolveStatus> {
        let n = x.len();
        let c = &self.config;
        if n == 0 || c.xtol < 0.0 || c.factor <= 0.0 || c.maxfev == Some(0) {
            return Err(SolveStatus::ImproperInputParameters);
        }
        if let Scaling::Fixed(d) = &c.scaling {
            if d.len() != n || d.iter().any(|&v| v <= 0.0) {
                return Err(SolveStatus::ImproperInputParameters);
            }
        }
        self.workspace.reset(n);
        if let Scaling::Fixed(d) = &self.config.scaling {
            self.workspace.diag.copy_from(d);
        }
        Ok(())
    }

    /// Solve with a forward-difference Jacobian and the active
    /// configuration.
    ///
    /// Each Jacobian costs `min(nb_sub + nb_super + 1, n)` residual
    /// evaluations, charged to `nfev`; `njev` stays zero.
    pub fn solve_numerical(&mut self, x: &mut DVector<f64>) -> SolveStatus {
        if let Err(status) = self.prepare(x) {
            return status;
        }
        let n = x.len();
        let maxfev = self.config.maxfev.unwrap_or(200 * (n + 1));
        let (nb_sub, nb_super) = self.config.bandwidth.unwrap_or((n - 1, n - 1));
        let msum = (nb_sub + nb_super + 1).min(n);
        let epsfcn = self.config.epsfcn;
        self.drive(x, maxfev, "forward differences", move |system, x, ws| {
            let res = numdiff::forward_jacobian(
                system,
                x,
                &ws.fvec,
                &mut ws.fjac,
                nb_sub,
                nb_super,
                epsfcn,
                &mut ws.wa1,
                &mut ws.wa2,
            );
            ws.nfev += msum;
            res
        })
    }

    /// Convenience forward-difference solve: `tol` as the step tolerance,
    /// unit fixed scaling, and default budget.
    pub fn solve_numerical_with_tol(&mut self, x: &mut DVector<f64>, tol: f64) -> SolveStatus {
        if x.is_empty() || tol < 0.0 {
            return SolveStatus::ImproperInputParameters;
        }
        let saved = std::mem::replace(
            &mut self.config,
            HybridConfig {
                xtol: tol,
                scaling: Scaling::Fixed(DVector::from_element(x.len(), 1.0)),
                ..HybridConfig::default()
            },
        );
        let status = self.solve_numerical(x);
        self.config = saved;
        status
    }

    /// The trust-region loop shared by both Jacobian sources.
    fn drive<J>(
        &mut self,
        x: &mut DVector<f64>,
        maxfev: usize,
        variant: &str,
        mut jacobian: J,
    ) -> SolveStatus
    where
        J: FnMut(&S, &mut DVector<f64>, &mut HybridWorkspace) -> EvalResult,
    {
        let system = self.system;
        let n = x.len();
        let xtol = self.config.xtol;
        let factor = self.config.factor;
        let adaptive_scaling = matches!(self.config.scaling, Scaling::ColumnNorms);

        if tracing::enabled!(Level::DEBUG) {
            self.config.print_configuration(variant, maxfev);
            IterationStats::print_header();
        }

        let ws = &mut self.workspace;

        // residual at the starting point
        ws.nfev = 1;
        if system.eval(x, &mut ws.fvec).is_err() {
            return SolveStatus::UserAsked;
        }
        let mut fnorm = ws.fvec.norm();

        let mut delta = 0.0_f64;
        let mut xnorm = 0.0_f64;

        'outer: loop {
            ws.jeval = true;

            if jacobian(system, x, &mut *ws).is_err() {
                return SolveStatus::UserAsked;
            }

            // QR of the Jacobian: rdiag into wa1, column norms into wa2
            qr::factorize(&mut ws.fjac, &mut ws.wa1, &mut ws.wa2);

            // first pass: seed the scaling diagonal and the step bound
            if ws.iter == 1 {
                if adaptive_scaling {
                    for j in 0..n {
                        ws.diag[j] = if ws.wa2[j] == 0.0 { 1.0 } else { ws.wa2[j] };
                    }
                }
                xnorm = scaled_norm(&ws.diag, x);
                delta = factor * xnorm;
                if delta == 0.0 {
                    delta = factor;
                }
            }

            // form Qᵀ·F from the stored reflectors
            ws.qtf.copy_from(&ws.fvec);
            qr::apply_q_transpose(&ws.fjac, &mut ws.qtf);

            // pack the triangular factor; a zero diagonal is recorded but
            // never drives the control flow
            let mut sing = false;
            for j in 0..n {
                let mut l = j;
                for i in 0..j {
                    ws.r[l] = ws.fjac[(i, j)];
                    l += n - i - 1;
                }
                ws.r[l] = ws.wa1[j];
                if ws.wa1[j] == 0.0 {
                    sing = true;
                }
            }
            if sing {
                debug!("triangular factor is singular after the refresh");
            }

            // expand the explicit orthogonal factor
            qr::accumulate_q(&mut ws.fjac, &mut ws.wa1);

            if adaptive_scaling {
                #[cfg(debug_assertions)]
                let diag_before = ws.diag.clone();
                for j in 0..n {
                    ws.diag[j] = ws.diag[j].max(ws.wa2[j]);
                }
                #[cfg(debug_assertions)]
                check_diag_monotone(&diag_before, &ws.diag);
            }

            // inner loop: dogleg steps on the current factorization
            loop {
                #[cfg(debug_assertions)]
                check_inner_invariants(ws, fnorm, delta);

                // dogleg direction, negated into a descent step p
                dogleg::dogleg(
                    n,
                    &ws.r,
                    &ws.diag,
                    &ws.qtf,
                    delta,
                    &mut ws.wa1,
                    &mut ws.wa2,
                    &mut ws.wa3,
                );
                for j in 0..n {
                    ws.wa1[j] = -ws.wa1[j];
                    ws.wa2[j] = x[j] + ws.wa1[j];
                    ws.wa3[j] = ws.diag[j] * ws.wa1[j];
                }
                let pnorm = ws.wa3.norm();
                debug_assert!(
                    pnorm <= delta * (1.0 + 1e-10),
                    "dogleg step escaped the trust region"
                );

                // the first step must not overshoot the dogleg itself
                if ws.iter == 1 {
                    delta = delta.min(pnorm);
                }

                // residual at the trial point
                ws.nfev += 1;
                if system.eval(&ws.wa2, &mut ws.wa4).is_err() {
                    return SolveStatus::UserAsked;
                }
                let fnorm1 = ws.wa4.norm();

                // scaled actual reduction of ‖F‖²
                let mut actred = -1.0;
                if fnorm1 < fnorm {
                    actred = 1.0 - (fnorm1 / fnorm).powi(2);
                }

                // scaled predicted reduction: the linear model residual is
                // Qᵀ·F + R·p
                let mut l = 0;
                for i in 0..n {
                    let mut sum = 0.0;
                    for j in i..n {
                        sum += ws.r[l] * ws.wa1[j];
                        l += 1;
                    }
                    ws.wa3[i] = ws.qtf[i] + sum;
                }
                let temp = ws.wa3.norm();
                let mut prered = 0.0;
                if temp < fnorm {
                    prered = 1.0 - (temp / fnorm).powi(2);
                }

                let ratio = if prered > 0.0 { actred / prered } else { 0.0 };

                // trust radius update
                if ratio < 0.1 {
                    ws.ncsuc = 0;
                    ws.ncfail += 1;
                    delta *= 0.5;
                } else {
                    ws.ncfail = 0;
                    ws.ncsuc += 1;
                    if ratio >= 0.5 || ws.ncsuc > 1 {
                        delta = delta.max(2.0 * pnorm);
                    }
                    if (ratio - 1.0).abs() <= 0.1 {
                        delta = 2.0 * pnorm;
                    }
                }

                // accept the trial point when the gain clears the threshold
                let accepted = ratio >= 1e-4;
                if accepted {
                    x.copy_from(&ws.wa2);
                    for j in 0..n {
                        ws.wa2[j] = ws.diag[j] * x[j];
                    }
                    ws.fvec.copy_from(&ws.wa4);
                    xnorm = ws.wa2.norm();
                    fnorm = fnorm1;
                    ws.iter += 1;
                }

                // progress monitors
                ws.nslow1 += 1;
                if actred >= 1e-3 {
                    ws.nslow1 = 0;
                }
                if ws.jeval {
                    ws.nslow2 += 1;
                }
                if actred >= 0.1 {
                    ws.nslow2 = 0;
                }

                if tracing::enabled!(Level::DEBUG) {
                    IterationStats {
                        iter: ws.iter,
                        fnorm,
                        delta,
                        pnorm,
                        ratio,
                        nfev: ws.nfev,
                        accepted,
                    }
                    .print_line();
                }

                // convergence
                if delta <= xtol * xnorm || fnorm == 0.0 {
                    return SolveStatus::RelativeErrorTooSmall;
                }

                // termination under stringent tolerances
                if ws.nfev >= maxfev {
                    return SolveStatus::TooManyFunctionEvaluations;
                }
                if 0.1 * (0.1 * delta).max(pnorm) <= f64::EPSILON * xnorm {
                    return SolveStatus::TolTooSmall;
                }
                if ws.nslow2 == 5 {
                    return SolveStatus::NotMakingProgressJacobian;
                }
                if ws.nslow1 == 10 {
                    return SolveStatus::NotMakingProgressIterations;
                }

                // two consecutive poor steps: refresh the Jacobian
                if ws.ncfail == 2 {
                    continue 'outer;
                }

                // Broyden rank-one correction, applied through the QR
                // factors: u carries the scaled step, v the secant
                // discrepancy in the Q basis
                for j in 0..n {
                    let mut sum = 0.0;
                    for i in 0..n {
                        sum += ws.wa4[i] * ws.fjac[(i, j)];
                    }
                    ws.wa2[j] = (sum - ws.wa3[j]) / pnorm;
                    ws.wa1[j] = ws.diag[j] * (ws.diag[j] * ws.wa1[j] / pnorm);
                    if accepted {
                        ws.qtf[j] = sum;
                    }
                }

                let sing = rank_one::update(n, &mut ws.r, &ws.wa1, &mut ws.wa2, &mut ws.wa3);
                rank_one::apply_rotations(&mut ws.fjac, &ws.wa2, &ws.wa3);
                rank_one::apply_rotations_row(&mut ws.qtf, &ws.wa2, &ws.wa3);
                if sing {
                    debug!("triangular factor is singular after the rank-one update");
                }

                ws.jeval = false;
            }
        }
    }
}

impl<'a, S: AnalyticSystem> HybridSolver<'a, S> {
    /// Solve with the analytic Jacobian and the active configuration.
    pub fn solve(&mut self, x: &mut DVector<f64>) -> SolveStatus {
        if let Err(status) = self.prepare(x) {
            return status;
        }
        let maxfev = self.config.maxfev.unwrap_or(100 * (x.len() + 1));
        self.drive(x, maxfev, "analytic Jacobian", |system, x, ws| {
            let res = system.jacobian(x, &mut ws.fjac);
            ws.njev += 1;
            res
        })
    }

    /// Convenience analytic solve: `tol` as the step tolerance, unit fixed
    /// scaling, and default budget.
    pub fn solve_with_tol(&mut self, x: &mut DVector<f64>, tol: f64) -> SolveStatus {
        if x.is_empty() || tol < 0.0 {
            return SolveStatus::ImproperInputParameters;
        }
        let saved = std::mem::replace(
            &mut self.config,
            HybridConfig {
                xtol: tol,
                scaling: Scaling::Fixed(DVector::from_element(x.len(), 1.0)),
                ..HybridConfig::default()
            },
        );
        let status = self.solve(x);
        self.config = saved;
        status
    }
}
