//! Working storage carried across solver iterations.

use nalgebra::{DMatrix, DVector};

/// Vectors, matrices, and counters owned by one solve invocation.
///
/// The workspace is resized once at the start of a solve and reused for
/// every iteration; the driver allocates nothing afterwards. After a solve
/// returns, the factorization fields describe the last Jacobian seen (true
/// or Broyden-updated), and `fvec` holds `F(x)` at the final iterate.
///
/// Concurrent solves require disjoint workspaces; nothing is shared between
/// invocations.
#[derive(Debug, Clone)]
pub struct HybridWorkspace {
    /// `F(x)` at the current iterate.
    pub fvec: DVector<f64>,
    /// During factorization, the Householder-encoded QR of the Jacobian;
    /// on entry to the inner loop, the explicit orthogonal factor Q.
    pub fjac: DMatrix<f64>,
    /// Packed upper-triangular factor of the current Jacobian, length
    /// n(n+1)/2, in the row-major packing consumed by the rank-one updater
    /// (see [`crate::linalg`]).
    pub r: DVector<f64>,
    /// `Qᵀ · fvec` at the current iterate.
    pub qtf: DVector<f64>,
    /// Positive scaling diagonal D. Under automatic scaling this grows
    /// monotonically with the column norms of every Jacobian seen so far.
    pub diag: DVector<f64>,

    /// Successful-step count. Starts at 1.
    pub iter: usize,
    /// Function evaluation count.
    pub nfev: usize,
    /// Jacobian evaluation count. Stays 0 for the forward-difference
    /// variant, which charges its evaluations to `nfev` instead.
    pub njev: usize,

    /// Consecutive steps with gain ratio ≥ 0.1.
    pub ncsuc: usize,
    /// Consecutive steps with gain ratio < 0.1; two in a row trigger a
    /// Jacobian refresh.
    pub ncfail: usize,
    /// Consecutive steps with actual reduction below 1e-3.
    pub nslow1: usize,
    /// Consecutive low-gain steps since the last Jacobian refresh.
    pub nslow2: usize,
    /// True while the current factorization comes from a freshly computed
    /// Jacobian rather than a Broyden update.
    pub jeval: bool,

    // Scratch vectors, reused across iterations in the order the driver
    // needs them: dogleg direction, trial point, linearized residual,
    // trial residual.
    pub(crate) wa1: DVector<f64>,
    pub(crate) wa2: DVector<f64>,
    pub(crate) wa3: DVector<f64>,
    pub(crate) wa4: DVector<f64>,
}

impl Default for HybridWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

impl HybridWorkspace {
    /// Create an empty workspace. Storage is acquired on first use.
    pub fn new() -> Self {
        Self {
            fvec: DVector::zeros(0),
            fjac: DMatrix::zeros(0, 0),
            r: DVector::zeros(0),
            qtf: DVector::zeros(0),
            diag: DVector::zeros(0),
            iter: 1,
            nfev: 0,
            njev: 0,
            ncsuc: 0,
            ncfail: 0,
            nslow1: 0,
            nslow2: 0,
            jeval: false,
            wa1: DVector::zeros(0),
            wa2: DVector::zeros(0),
            wa3: DVector::zeros(0),
            wa4: DVector::zeros(0),
        }
    }

    /// Size every field for an n-dimensional system and reset the counters.
    pub(crate) fn reset(&mut self, n: usize) {
        self.fvec = DVector::zeros(n);
        self.fjac = DMatrix::zeros(n, n);
        self.r = DVector::zeros(n * (n + 1) / 2);
        self.qtf = DVector::zeros(n);
        self.diag = DVector::zeros(n);
        self.wa1 = DVector::zeros(n);
        self.wa2 = DVector::zeros(n);
        self.wa3 = DVector::zeros(n);
        self.wa4 = DVector::zeros(n);
        self.iter = 1;
        self.nfev = 0;
        self.njev = 0;
        self.ncsuc = 0;
        self.ncfail = 0;
        self.nslow1 = 0;
        self.nslow2 = 0;
        self.jeval = false;
    }
}
