//! Powell dogleg step on a scaled trust region.
//!
//! Given the packed upper-triangular factor R of `J = Q·R`, the scaling
//! diagonal D, `qtb = Qᵀ·b`, and a radius δ, the dogleg step is the convex
//! combination of the Gauss-Newton and scaled steepest-descent directions
//! that minimizes the linear model `‖J·x − b‖` subject to `‖D·x‖ ≤ δ`:
//!
//! - the full Gauss-Newton point when it fits inside the region,
//! - the steepest-descent minimizer clipped to the boundary when even the
//!   Cauchy point falls outside,
//! - otherwise the boundary point on the segment joining the two.
//!
//! A zero diagonal in R is handled by substituting a scale taken from the
//! largest entry of the offending column, so the step stays finite for
//! rank-deficient Jacobians.

use nalgebra::DVector;

/// Compute the dogleg step into `x`. `wa1` and `wa2` are length-n scratch.
///
/// The result solves the *minimization* orientation of the model; the
/// trust-region driver negates it to obtain a descent step on the residual.
pub fn dogleg(
    n: usize,
    r: &DVector<f64>,
    diag: &DVector<f64>,
    qtb: &DVector<f64>,
    delta: f64,
    x: &mut DVector<f64>,
    wa1: &mut DVector<f64>,
    wa2: &mut DVector<f64>,
) {
    let epsmch = f64::EPSILON;

    // gauss-newton direction by back-substitution on the packed factor
    let mut jj = n * (n + 1) / 2;
    for k in 0..n {
        let j = n - 1 - k;
        jj -= k + 1;
        let mut l = jj + 1;
        let mut sum = 0.0;
        for i in (j + 1)..n {
            sum += r[l] * x[i];
            l += 1;
        }
        let mut temp = r[jj];
        if temp == 0.0 {
            // substitute a scale drawn from the column above the zero pivot
            let mut l = j;
            for i in 0..=j {
                temp = temp.max(r[l].abs());
                l += n - i - 1;
            }
            temp *= epsmch;
            if temp == 0.0 {
                temp = epsmch;
            }
        }
        x[j] = (qtb[j] - sum) / temp;
    }

    // accept the gauss-newton direction if it fits in the trust region
    for j in 0..n {
        wa1[j] = 0.0;
        wa2[j] = diag[j] * x[j];
    }
    let qnorm = wa2.norm();
    if qnorm <= delta {
        return;
    }

    // scaled gradient direction: D⁻¹·Rᵀ·qtb
    let mut l = 0;
    for j in 0..n {
        let temp = qtb[j];
        for i in j..n {
            wa1[i] += r[l] * temp;
            l += 1;
        }
        wa1[j] /= diag[j];
    }

    let gnorm = wa1.norm();
    let mut sgnorm = 0.0;
    let mut alpha = delta / qnorm;
    if gnorm != 0.0 {
        // minimizer of the model along the scaled gradient
        for j in 0..n {
            wa1[j] = (wa1[j] / gnorm) / diag[j];
        }
        let mut l = 0;
        for j in 0..n {
            let mut sum = 0.0;
            for i in j..n {
                sum += r[l] * wa1[i];
                l += 1;
            }
            wa2[j] = sum;
        }
        let temp = wa2.norm();
        sgnorm = (gnorm / temp) / temp;

        alpha = 0.0;
        if sgnorm < delta {
            // boundary point of the segment from the cauchy point to the
            // gauss-newton point
            let bnorm = qtb.norm();
            let mut temp = (bnorm / gnorm) * (bnorm / qnorm) * (sgnorm / delta);
            temp = temp - (delta / qnorm) * (sgnorm / delta).powi(2)
                + ((temp - delta / qnorm).powi(2)
                    + (1.0 - (delta / qnorm).powi(2)) * (1.0 - (sgnorm / delta).powi(2)))
                .sqrt();
            alpha = (delta / qnorm) * (1.0 - (sgnorm / delta).powi(2)) / temp;
        }
    }

    // convex combination of the two directions
    let temp = (1.0 - alpha) * sgnorm.min(delta);
    for j in 0..n {
        x[j] = temp * wa1[j] + alpha * x[j];
    }
}
