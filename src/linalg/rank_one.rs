//! Rank-one update of a packed triangular factor via Givens rotations.
//!
//! Given the packed factor R of a QR factorization `J = Q·R`, a Broyden
//! secant correction `J⁺ = J + Q·v·uᵀ` is absorbed by computing an
//! orthogonal Ω such that `Ωᵀ·(R + v·uᵀ)` is again upper triangular. The
//! rotation sequence is encoded into the `v` and `w` arguments so the same
//! Ω can be replayed from the right on Q (and on Qᵀ·f treated as a row
//! vector) with [`apply_rotations`] / [`apply_rotations_row`], keeping the
//! whole factorization consistent at O(n²) cost.
//!
//! The rotation encoding matches the replay convention: a stored value s
//! with |s| > 1 means cos = 1/s, otherwise sin = s.

use nalgebra::{DMatrix, DVector};

/// Givens parameters plus the storable recovery value.
fn plane_rotation(big: f64, small: f64) -> (f64, f64, f64) {
    // `small` is the entry being eliminated against `big`
    if big.abs() < small.abs() {
        let cot = big / small;
        let sin = 0.5 / (0.25 + 0.25 * cot * cot).sqrt();
        let cos = sin * cot;
        let tau = if cos.abs() * f64::MAX > 1.0 { 1.0 / cos } else { 1.0 };
        (cos, sin, tau)
    } else {
        let tan = small / big;
        let cos = 0.5 / (0.25 + 0.25 * tan * tan).sqrt();
        let sin = cos * tan;
        (cos, sin, sin)
    }
}

/// Decode a rotation stored by [`update`] into (sin, cos).
fn decode(stored: f64) -> (f64, f64) {
    if stored.abs() > 1.0 {
        let cos = 1.0 / stored;
        let sin = (1.0 - cos * cos).sqrt();
        (sin, cos)
    } else {
        let sin = stored;
        (sin, (1.0 - sin * sin).sqrt())
    }
}

/// Apply the rank-one correction `v·uᵀ` to the packed upper-triangular
/// factor `r` (row-major packing, length n(n+1)/2) and re-triangularize
/// with plane rotations.
///
/// On exit `v` and `w` encode the two rotation sweeps for
/// [`apply_rotations`], and the return value flags a zero diagonal in the
/// updated factor. The flag is diagnostic only; the driver logs it and
/// carries on.
pub fn update(
    n: usize,
    r: &mut DVector<f64>,
    u: &DVector<f64>,
    v: &mut DVector<f64>,
    w: &mut DVector<f64>,
) -> bool {
    // offset of the diagonal entry of the last row
    let mut jj = n * (n + 1) / 2 - 1;
    w[n - 1] = r[jj];

    // rotate v into a multiple of the last unit vector, spiking w
    for j in (0..n - 1).rev() {
        jj -= n - j;
        w[j] = 0.0;
        if v[j] != 0.0 {
            let (cos, sin, tau) = plane_rotation(v[n - 1], v[j]);
            v[n - 1] = sin * v[j] + cos * v[n - 1];
            v[j] = tau;
            let mut l = jj;
            for i in j..n {
                let temp = cos * r[l] - sin * w[i];
                w[i] = sin * r[l] + cos * w[i];
                r[l] = temp;
                l += 1;
            }
        }
    }

    // add in the rank-one spike
    for i in 0..n {
        w[i] += v[n - 1] * u[i];
    }

    // eliminate the spike
    let mut sing = false;
    for j in 0..n - 1 {
        if w[j] != 0.0 {
            let (cos, sin, tau) = plane_rotation(r[jj], w[j]);
            let mut l = jj;
            for i in j..n {
                let temp = cos * r[l] + sin * w[i];
                w[i] = -sin * r[l] + cos * w[i];
                r[l] = temp;
                l += 1;
            }
            w[j] = tau;
        }
        if r[jj] == 0.0 {
            sing = true;
        }
        jj += n - j;
    }

    // the spiked last row becomes the last row of the output
    r[jj] = w[n - 1];
    if r[jj] == 0.0 {
        sing = true;
    }
    sing
}

/// Replay the rotation sweeps recorded by [`update`] on the columns of a
/// dense matrix, i.e. form `a·Ω`.
pub fn apply_rotations(a: &mut DMatrix<f64>, v: &DVector<f64>, w: &DVector<f64>) {
    let (m, n) = a.shape();
    if n < 2 {
        return;
    }
    for j in (0..n - 1).rev() {
        let (sin, cos) = decode(v[j]);
        for i in 0..m {
            let temp = cos * a[(i, j)] - sin * a[(i, n - 1)];
            a[(i, n - 1)] = sin * a[(i, j)] + cos * a[(i, n - 1)];
            a[(i, j)] = temp;
        }
    }
    for j in 0..n - 1 {
        let (sin, cos) = decode(w[j]);
        for i in 0..m {
            let temp = cos * a[(i, j)] + sin * a[(i, n - 1)];
            a[(i, n - 1)] = -sin * a[(i, j)] + cos * a[(i, n - 1)];
            a[(i, j)] = temp;
        }
    }
}

/// [`apply_rotations`] for a single row vector (used on Qᵀ·f).
pub fn apply_rotations_row(q: &mut DVector<f64>, v: &DVector<f64>, w: &DVector<f64>) {
    let n = q.len();
    if n < 2 {
        return;
    }
    for j in (0..n - 1).rev() {
        let (sin, cos) = decode(v[j]);
        let temp = cos * q[j] - sin * q[n - 1];
        q[n - 1] = sin * q[j] + cos * q[n - 1];
        q[j] = temp;
    }
    for j in 0..n - 1 {
        let (sin, cos) = decode(w[j]);
        let temp = cos * q[j] + sin * q[n - 1];
        q[n - 1] = -sin * q[j] + cos * q[n - 1];
        q[j] = temp;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn pack(r: &DMatrix<f64>) -> DVector<f64> {
        let n = r.nrows();
        let mut packed = DVector::zeros(n * (n + 1) / 2);
        let mut l = 0;
        for i in 0..n {
            for j in i..n {
                packed[l] = r[(i, j)];
                l += 1;
            }
        }
        packed
    }

    fn unpack(packed: &DVector<f64>, n: usize) -> DMatrix<f64> {
        let mut r = DMatrix::zeros(n, n);
        let mut l = 0;
        for i in 0..n {
            for j in i..n {
                r[(i, j)] = packed[l];
                l += 1;
            }
        }
        r
    }

    fn random_vec(n: usize, rng: &mut StdRng) -> DVector<f64> {
        DVector::from_fn(n, |_, _| rng.random_range(-1.0..1.0))
    }

    #[test]
    fn test_update_keeps_factor_triangular_and_consistent() {
        let n = 6;
        let mut rng = StdRng::seed_from_u64(42);
        let mut r_full = DMatrix::zeros(n, n);
        for i in 0..n {
            for j in i..n {
                r_full[(i, j)] = rng.random_range(-1.0..1.0);
            }
            r_full[(i, i)] += 2.0;
        }
        let u = random_vec(n, &mut rng);
        let v0 = random_vec(n, &mut rng);

        let mut packed = pack(&r_full);
        let mut v = v0.clone();
        let mut w = DVector::zeros(n);
        update(n, &mut packed, &u, &mut v, &mut w);
        let r_new = unpack(&packed, n);

        // replay the rotations on the identity to get Ω explicitly
        let mut omega = DMatrix::identity(n, n);
        apply_rotations(&mut omega, &v, &w);

        // Ω must be orthogonal and Ω·R' must equal R + v₀·uᵀ
        let eye = DMatrix::identity(n, n);
        assert!((omega.transpose() * &omega - &eye).norm() < 1e-13 * n as f64);
        let target = &r_full + &v0 * u.transpose();
        assert!((&omega * &r_new - &target).norm() < 1e-12 * target.norm());
    }

    #[test]
    fn test_row_replay_matches_matrix_replay() {
        let n = 5;
        let mut rng = StdRng::seed_from_u64(17);
        let mut r_full = DMatrix::zeros(n, n);
        for i in 0..n {
            for j in i..n {
                r_full[(i, j)] = rng.random_range(-1.0..1.0);
            }
            r_full[(i, i)] += 1.5;
        }
        let u = random_vec(n, &mut rng);
        let mut v = random_vec(n, &mut rng);
        let mut w = DVector::zeros(n);
        let mut packed = pack(&r_full);
        update(n, &mut packed, &u, &mut v, &mut w);

        let row0 = random_vec(n, &mut rng);
        let mut as_row = row0.clone();
        apply_rotations_row(&mut as_row, &v, &w);

        let mut as_matrix = DMatrix::zeros(1, n);
        for j in 0..n {
            as_matrix[(0, j)] = row0[j];
        }
        apply_rotations(&mut as_matrix, &v, &w);
        for j in 0..n {
            assert!((as_row[j] - as_matrix[(0, j)]).abs() < 1e-14);
        }
    }

    #[test]
    fn test_zero_diagonal_reported() {
        let n = 3;
        let mut rng = StdRng::seed_from_u64(5);
        // factor with a zero diagonal entry and a vanishing update
        let mut r_full = DMatrix::zeros(n, n);
        for i in 0..n {
            for j in i..n {
                r_full[(i, j)] = rng.random_range(-1.0..1.0);
            }
        }
        r_full[(0, 0)] = 0.0;
        let mut packed = pack(&r_full);
        let u = DVector::zeros(n);
        let mut v = DVector::zeros(n);
        let mut w = DVector::zeros(n);
        assert!(update(n, &mut packed, &u, &mut v, &mut w));
    }

    #[test]
    fn test_single_equation_update() {
        let mut packed = DVector::from_element(1, 3.0);
        let u = DVector::from_element(1, 2.0);
        let mut v = DVector::from_element(1, 0.5);
        let mut w = DVector::zeros(1);
        let sing = update(1, &mut packed, &u, &mut v, &mut w);
        assert!(!sing);
        assert!((packed[0] - 4.0).abs() < 1e-15);
    }
}
