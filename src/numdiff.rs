//! Forward-difference Jacobian approximation with optional bandwidth.
//!
//! When the system is known to be banded, columns separated by more than
//! `nb_sub + nb_super` rows cannot interact, so they can be perturbed
//! together: the full Jacobian then costs `nb_sub + nb_super + 1` extra
//! residual evaluations instead of n. With the default full bandwidth the
//! routine reduces to one perturbed evaluation per column.

use nalgebra::{DMatrix, DVector};

use crate::core::system::{EvalResult, System};

/// Approximate `J(x) = ∂F/∂x` into `jac` by forward differences.
///
/// `fvec` must already hold `F(x)`. The per-component step is
/// `eps·|x_j|` (or `eps` when `x_j = 0`) with `eps = √max(epsfcn, ε)`, so
/// `epsfcn` should estimate the relative error in the residual evaluation;
/// zero means full working precision. `x` is perturbed in place and
/// restored, except when the system aborts mid-sweep. `wa1` and `wa2` are
/// length-n scratch.
pub fn forward_jacobian<S: System>(
    system: &S,
    x: &mut DVector<f64>,
    fvec: &DVector<f64>,
    jac: &mut DMatrix<f64>,
    nb_sub: usize,
    nb_super: usize,
    epsfcn: f64,
    wa1: &mut DVector<f64>,
    wa2: &mut DVector<f64>,
) -> EvalResult {
    let n = x.len();
    let eps = epsfcn.max(f64::EPSILON).sqrt();
    let msum = (nb_sub + nb_super + 1).min(n);

    if msum >= n {
        // dense: one perturbed evaluation per column
        for j in 0..n {
            let temp = x[j];
            let mut h = eps * temp.abs();
            if h == 0.0 {
                h = eps;
            }
            x[j] = temp + h;
            system.eval(x, wa1)?;
            x[j] = temp;
            for i in 0..n {
                jac[(i, j)] = (wa1[i] - fvec[i]) / h;
            }
        }
    } else {
        // banded: perturb every msum-th column simultaneously
        for k in 0..msum {
            let mut j = k;
            while j < n {
                wa2[j] = x[j];
                let mut h = eps * wa2[j].abs();
                if h == 0.0 {
                    h = eps;
                }
                x[j] = wa2[j] + h;
                j += msum;
            }
            system.eval(x, wa1)?;
            let mut j = k;
            while j < n {
                x[j] = wa2[j];
                let mut h = eps * wa2[j].abs();
                if h == 0.0 {
                    h = eps;
                }
                for i in 0..n {
                    jac[(i, j)] = 0.0;
                    if i + nb_super >= j && i <= j + nb_sub {
                        jac[(i, j)] = (wa1[i] - fvec[i]) / h;
                    }
                }
                j += msum;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::system::EvalAborted;
    use nalgebra::dvector;
    use std::cell::Cell;

    struct Quadratic;

    impl System for Quadratic {
        fn eval(&self, x: &DVector<f64>, fvec: &mut DVector<f64>) -> EvalResult {
            fvec[0] = x[0] * x[0] + x[1];
            fvec[1] = x[0] - 3.0 * x[1] * x[1];
            Ok(())
        }
    }

    #[test]
    fn test_dense_jacobian_accuracy() {
        let system = Quadratic;
        let mut x = dvector![1.5, -0.5];
        let mut fvec = DVector::zeros(2);
        system.eval(&x, &mut fvec).unwrap();
        let mut jac = DMatrix::zeros(2, 2);
        let mut wa1 = DVector::zeros(2);
        let mut wa2 = DVector::zeros(2);
        forward_jacobian(&system, &mut x, &fvec, &mut jac, 1, 1, 0.0, &mut wa1, &mut wa2)
            .unwrap();
        let exact = DMatrix::from_row_slice(2, 2, &[3.0, 1.0, 1.0, 3.0]);
        assert!((&jac - &exact).norm() < 1e-6);
        // x restored
        assert_eq!(x, dvector![1.5, -0.5]);
    }

    /// Tridiagonal system: component i touches x[i-1], x[i], x[i+1].
    struct Tridiagonal {
        evals: Cell<usize>,
    }

    impl System for Tridiagonal {
        fn eval(&self, x: &DVector<f64>, fvec: &mut DVector<f64>) -> EvalResult {
            self.evals.set(self.evals.get() + 1);
            let n = x.len();
            for i in 0..n {
                let prev = if i > 0 { x[i - 1] } else { 0.0 };
                let next = if i + 1 < n { x[i + 1] } else { 0.0 };
                fvec[i] = (3.0 - 2.0 * x[i]) * x[i] - prev - 2.0 * next + 1.0;
            }
            Ok(())
        }
    }

    #[test]
    fn test_banded_matches_dense_with_fewer_evaluations() {
        let n = 9;
        let system = Tridiagonal { evals: Cell::new(0) };
        let mut x = DVector::from_fn(n, |i, _| -1.0 + 0.1 * i as f64);
        let mut fvec = DVector::zeros(n);
        system.eval(&x, &mut fvec).unwrap();

        let mut wa1 = DVector::zeros(n);
        let mut wa2 = DVector::zeros(n);

        let mut dense = DMatrix::zeros(n, n);
        forward_jacobian(
            &system, &mut x, &fvec, &mut dense, n - 1, n - 1, 0.0, &mut wa1, &mut wa2,
        )
        .unwrap();

        system.evals.set(0);
        let mut banded = DMatrix::zeros(n, n);
        forward_jacobian(
            &system, &mut x, &fvec, &mut banded, 1, 1, 0.0, &mut wa1, &mut wa2,
        )
        .unwrap();
        assert_eq!(system.evals.get(), 3);
        assert!((&dense - &banded).norm() < 1e-6);
    }

    struct AbortOnThird {
        evals: Cell<usize>,
    }

    impl System for AbortOnThird {
        fn eval(&self, x: &DVector<f64>, fvec: &mut DVector<f64>) -> EvalResult {
            self.evals.set(self.evals.get() + 1);
            if self.evals.get() >= 3 {
                return Err(EvalAborted);
            }
            fvec.copy_from(x);
            Ok(())
        }
    }

    #[test]
    fn test_abort_propagates() {
        let n = 4;
        let system = AbortOnThird { evals: Cell::new(0) };
        let mut x = DVector::from_element(n, 1.0);
        let fvec = x.clone();
        let mut jac = DMatrix::zeros(n, n);
        let mut wa1 = DVector::zeros(n);
        let mut wa2 = DVector::zeros(n);
        let res = forward_jacobian(
            &system, &mut x, &fvec, &mut jac, n - 1, n - 1, 0.0, &mut wa1, &mut wa2,
        );
        assert_eq!(res, Err(EvalAborted));
        assert_eq!(system.evals.get(), 3);
    }
}
