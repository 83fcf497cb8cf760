//! Householder QR factorization of a square dense matrix, without pivoting.
//!
//! The factorization is stored compactly: the strict lower triangle plus the
//! diagonal of the input hold the scaled Householder vectors, the strict
//! upper triangle holds the off-diagonal part of R, and the diagonal of R is
//! returned separately. This is the encoding the trust-region driver feeds
//! to [`apply_q_transpose`] and later expands with [`accumulate_q`].

use nalgebra::{DMatrix, DVector};

/// 2-norm of `a[from.., j]`.
fn tail_norm(a: &DMatrix<f64>, j: usize, from: usize) -> f64 {
    let n = a.nrows();
    let mut sum = 0.0;
    for i in from..n {
        sum += a[(i, j)] * a[(i, j)];
    }
    sum.sqrt()
}

/// Factor `a = Q·R` in place with Householder reflections.
///
/// On exit `a` holds the factored form described in the module docs,
/// `rdiag` the diagonal of R, and `colnorms` the 2-norms of the columns of
/// the *original* matrix (the driver grows its scaling diagonal from them).
pub fn factorize(a: &mut DMatrix<f64>, rdiag: &mut DVector<f64>, colnorms: &mut DVector<f64>) {
    let n = a.nrows();
    for j in 0..n {
        colnorms[j] = tail_norm(a, j, 0);
    }
    for j in 0..n {
        let mut ajnorm = tail_norm(a, j, j);
        if ajnorm != 0.0 {
            if a[(j, j)] < 0.0 {
                ajnorm = -ajnorm;
            }
            for i in j..n {
                a[(i, j)] /= ajnorm;
            }
            a[(j, j)] += 1.0;
            // apply the reflector to the remaining columns
            for k in (j + 1)..n {
                let mut sum = 0.0;
                for i in j..n {
                    sum += a[(i, j)] * a[(i, k)];
                }
                let temp = sum / a[(j, j)];
                for i in j..n {
                    a[(i, k)] -= temp * a[(i, j)];
                }
            }
        }
        rdiag[j] = -ajnorm;
    }
}

/// Overwrite `v` with `Qᵀ·v`, reading the reflectors stored by
/// [`factorize`] out of `a`.
pub fn apply_q_transpose(a: &DMatrix<f64>, v: &mut DVector<f64>) {
    let n = a.nrows();
    for j in 0..n {
        if a[(j, j)] != 0.0 {
            let mut sum = 0.0;
            for i in j..n {
                sum += a[(i, j)] * v[i];
            }
            let temp = -sum / a[(j, j)];
            for i in j..n {
                v[i] += a[(i, j)] * temp;
            }
        }
    }
}

/// Expand the reflectors stored in `a` into the explicit orthogonal factor
/// Q, in place. `wa` is length-n scratch.
pub fn accumulate_q(a: &mut DMatrix<f64>, wa: &mut DVector<f64>) {
    let n = a.nrows();
    // the R part above the diagonal has already been copied out; clear it
    for j in 1..n {
        for i in 0..j {
            a[(i, j)] = 0.0;
        }
    }
    for l in 0..n {
        let k = n - 1 - l;
        for i in k..n {
            wa[i] = a[(i, k)];
            a[(i, k)] = 0.0;
        }
        a[(k, k)] = 1.0;
        if wa[k] != 0.0 {
            for j in k..n {
                let mut sum = 0.0;
                for i in k..n {
                    sum += a[(i, j)] * wa[i];
                }
                let temp = sum / wa[k];
                for i in k..n {
                    a[(i, j)] -= temp * wa[i];
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn random_matrix(n: usize, seed: u64) -> DMatrix<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        DMatrix::from_fn(n, n, |_, _| rng.random_range(-1.0..1.0))
    }

    /// Rebuild the full R from the factored form.
    fn unpack_r(a: &DMatrix<f64>, rdiag: &DVector<f64>) -> DMatrix<f64> {
        let n = a.nrows();
        DMatrix::from_fn(n, n, |i, j| {
            if i < j {
                a[(i, j)]
            } else if i == j {
                rdiag[i]
            } else {
                0.0
            }
        })
    }

    #[test]
    fn test_factorize_reconstructs_matrix() {
        let n = 6;
        let orig = random_matrix(n, 7);
        let mut a = orig.clone();
        let mut rdiag = DVector::zeros(n);
        let mut colnorms = DVector::zeros(n);
        factorize(&mut a, &mut rdiag, &mut colnorms);

        let r = unpack_r(&a, &rdiag);
        let mut q = a.clone();
        let mut wa = DVector::zeros(n);
        accumulate_q(&mut q, &mut wa);

        let qr = &q * &r;
        assert!((&qr - &orig).norm() < 1e-12 * orig.norm());
    }

    #[test]
    fn test_accumulated_q_is_orthogonal() {
        let n = 8;
        let mut a = random_matrix(n, 21);
        let mut rdiag = DVector::zeros(n);
        let mut colnorms = DVector::zeros(n);
        factorize(&mut a, &mut rdiag, &mut colnorms);
        let mut wa = DVector::zeros(n);
        accumulate_q(&mut a, &mut wa);

        let qtq = a.transpose() * &a;
        let eye = DMatrix::identity(n, n);
        assert!((&qtq - &eye).norm() < 1e-13 * n as f64);
    }

    #[test]
    fn test_apply_q_transpose_matches_explicit_q() {
        let n = 5;
        let mut a = random_matrix(n, 3);
        let mut rdiag = DVector::zeros(n);
        let mut colnorms = DVector::zeros(n);
        factorize(&mut a, &mut rdiag, &mut colnorms);

        let mut rng = StdRng::seed_from_u64(99);
        let v = DVector::from_fn(n, |_, _| rng.random_range(-1.0..1.0));
        let mut qtv = v.clone();
        apply_q_transpose(&a, &mut qtv);

        let mut q = a.clone();
        let mut wa = DVector::zeros(n);
        accumulate_q(&mut q, &mut wa);
        let expected = q.transpose() * &v;
        assert!((&qtv - &expected).norm() < 1e-13);
    }

    #[test]
    fn test_column_norms_of_original() {
        let n = 4;
        let orig = random_matrix(n, 11);
        let mut a = orig.clone();
        let mut rdiag = DVector::zeros(n);
        let mut colnorms = DVector::zeros(n);
        factorize(&mut a, &mut rdiag, &mut colnorms);
        for j in 0..n {
            assert!((colnorms[j] - orig.column(j).norm()).abs() < 1e-14);
        }
    }

    #[test]
    fn test_rank_deficient_column_flagged_by_zero_rdiag() {
        let n = 3;
        // second column is a multiple of the first
        let a0 =
            DMatrix::from_row_slice(n, n, &[1.0, 2.0, 0.5, 2.0, 4.0, -1.0, -1.0, -2.0, 3.0]);
        let mut a = a0.clone();
        let mut rdiag = DVector::zeros(n);
        let mut colnorms = DVector::zeros(n);
        factorize(&mut a, &mut rdiag, &mut colnorms);
        assert!(rdiag[1].abs() < 1e-14);
    }
}
