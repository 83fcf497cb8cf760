//! Trust-region driver: status reporting, configuration, and diagnostics.

use nalgebra::DVector;
use std::fmt;
use std::fmt::{Display, Formatter};
use tracing::debug;

pub mod hybrid;

pub use hybrid::HybridSolver;

/// Terminal outcome of a solve.
///
/// The discriminants preserve the historical integer mapping of the hybrid
/// method (0 through 6), so callers migrating from flag-based interfaces
/// can compare by value. Invalid input reports
/// [`ImproperInputParameters`](SolveStatus::ImproperInputParameters) from
/// every entry point; the historical conflation of bad input with the
/// success flag is not reproduced.
///
/// Whatever the status, the caller's `x` holds the last accepted iterate
/// and the workspace `fvec` holds `F(x)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SolveStatus {
    /// The input dimensions, tolerances, or scaling were rejected before
    /// iterating.
    ImproperInputParameters = 0,
    /// Converged: the scaled step fell within `xtol`, or the residual
    /// vanished.
    RelativeErrorTooSmall = 1,
    /// The `maxfev` budget on residual evaluations is exhausted.
    TooManyFunctionEvaluations = 2,
    /// `xtol` is too small: no further reduction is possible at working
    /// precision.
    TolTooSmall = 3,
    /// Five consecutive low-gain steps since the last Jacobian refresh.
    NotMakingProgressJacobian = 4,
    /// Ten consecutive low-gain steps overall.
    NotMakingProgressIterations = 5,
    /// A system callback requested termination.
    UserAsked = 6,
}

impl SolveStatus {
    /// True for the single success status.
    pub fn converged(&self) -> bool {
        matches!(self, SolveStatus::RelativeErrorTooSmall)
    }
}

impl Display for SolveStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SolveStatus::ImproperInputParameters => write!(f, "Improper input parameters"),
            SolveStatus::RelativeErrorTooSmall => {
                write!(f, "Relative error between iterates is within tolerance")
            }
            SolveStatus::TooManyFunctionEvaluations => {
                write!(f, "Maximum number of function evaluations reached")
            }
            SolveStatus::TolTooSmall => {
                write!(f, "Tolerance too small: no further improvement possible")
            }
            SolveStatus::NotMakingProgressJacobian => {
                write!(f, "Not making progress: five Jacobians without improvement")
            }
            SolveStatus::NotMakingProgressIterations => {
                write!(f, "Not making progress: ten iterations without improvement")
            }
            SolveStatus::UserAsked => write!(f, "Terminated at the callback's request"),
        }
    }
}

/// How the scaling diagonal D is obtained.
#[derive(Debug, Clone, Default)]
pub enum Scaling {
    /// Build D from the column norms of the Jacobian and grow it
    /// monotonically as new Jacobians are seen.
    #[default]
    ColumnNorms,
    /// Use a caller-supplied fixed diagonal; every entry must be positive
    /// and the length must match the system dimension.
    Fixed(DVector<f64>),
}

/// Configuration parameters for [`HybridSolver`].
///
/// All options can be set with the builder pattern:
///
/// ```
/// use hybrd_solver::HybridConfig;
///
/// let config = HybridConfig::new()
///     .with_xtol(1e-10)
///     .with_maxfev(2000)
///     .with_factor(10.0);
/// ```
#[derive(Debug, Clone)]
pub struct HybridConfig {
    /// Convergence threshold on the scaled step. Default: √ε.
    pub xtol: f64,
    /// Budget on residual evaluations. `None` selects 100·(n+1) for the
    /// analytic entry points and 200·(n+1) for forward differences.
    pub maxfev: Option<usize>,
    /// Initial trust radius as a multiple of `‖D·x₀‖` (or taken verbatim
    /// when `x₀ = 0`). Default: 100.
    pub factor: f64,
    /// Scaling diagonal policy.
    pub scaling: Scaling,
    /// `(nb_sub, nb_super)` Jacobian bandwidth for the forward-difference
    /// entry points. `None` means full bandwidth `(n−1, n−1)`.
    pub bandwidth: Option<(usize, usize)>,
    /// Assumed relative error in residual evaluations, used to pick the
    /// forward-difference step. Zero means full working precision.
    pub epsfcn: f64,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            xtol: f64::EPSILON.sqrt(),
            maxfev: None,
            factor: 100.0,
            scaling: Scaling::default(),
            bandwidth: None,
            epsfcn: 0.0,
        }
    }
}

impl HybridConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the convergence threshold on the scaled step.
    pub fn with_xtol(mut self, xtol: f64) -> Self {
        self.xtol = xtol;
        self
    }

    /// Set the budget on residual evaluations.
    pub fn with_maxfev(mut self, maxfev: usize) -> Self {
        self.maxfev = Some(maxfev);
        self
    }

    /// Set the initial trust-radius factor.
    pub fn with_factor(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }

    /// Set the scaling policy.
    pub fn with_scaling(mut self, scaling: Scaling) -> Self {
        self.scaling = scaling;
        self
    }

    /// Set the Jacobian bandwidth for forward differencing.
    pub fn with_bandwidth(mut self, nb_sub: usize, nb_super: usize) -> Self {
        self.bandwidth = Some((nb_sub, nb_super));
        self
    }

    /// Set the assumed relative error of residual evaluations.
    pub fn with_epsfcn(mut self, epsfcn: f64) -> Self {
        self.epsfcn = epsfcn;
        self
    }

    /// Dump the configuration at debug level.
    pub(crate) fn print_configuration(&self, variant: &str, maxfev: usize) {
        debug!(
            "Configuration:\n  Solver:    Powell hybrid ({variant})\n  xtol:      {:.2e}\n  maxfev:    {maxfev}\n  factor:    {:.2e}\n  scaling:   {}\n  bandwidth: {}\n  epsfcn:    {:.2e}",
            self.xtol,
            self.factor,
            match &self.scaling {
                Scaling::ColumnNorms => "column norms (adaptive)".to_string(),
                Scaling::Fixed(_) => "fixed (caller-supplied)".to_string(),
            },
            match self.bandwidth {
                Some((ml, mu)) => format!("({ml}, {mu})"),
                None => "full".to_string(),
            },
            self.epsfcn,
        );
    }
}

/// Per-iteration statistics for detailed debug logging.
#[derive(Debug, Clone)]
pub(crate) struct IterationStats {
    /// Successful-step count at the time of the step.
    pub iter: usize,
    /// Residual norm ‖F(x)‖ after the step decision.
    pub fnorm: f64,
    /// Trust radius after the update.
    pub delta: f64,
    /// Scaled step norm ‖D·p‖.
    pub pnorm: f64,
    /// Gain ratio of actual to predicted reduction.
    pub ratio: f64,
    /// Residual evaluations so far.
    pub nfev: usize,
    /// Whether the step was accepted.
    pub accepted: bool,
}

impl IterationStats {
    /// Print the table header.
    pub fn print_header() {
        debug!(
            "{:>5}  {:>13}  {:>11}  {:>11}  {:>11}  {:>6}  {:>6}",
            "iter", "|F|", "tr_radius", "|step|", "ratio", "nfev", "status"
        );
    }

    /// Print one table line.
    pub fn print_line(&self) {
        let status = if self.accepted { "✓" } else { "✗" };
        debug!(
            "{:>5}  {:>13.6e}  {:>11.2e}  {:>11.2e}  {:>11.2e}  {:>6}  {:>6}",
            self.iter, self.fnorm, self.delta, self.pnorm, self.ratio, self.nfev, status
        );
    }
}
