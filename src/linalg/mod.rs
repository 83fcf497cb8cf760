//! Dense linear-algebra kernels for the trust-region driver.
//!
//! All routines operate on the same packed representation of the
//! upper-triangular factor R: length n(n+1)/2, packed by rows, with row i
//! starting at offset `i·n − i·(i−1)/2` and holding `R[i][i..n]`. The
//! packing is a private contract between the driver, the dogleg, and the
//! rank-one updater; it is not part of the crate's public data model.

pub mod dogleg;
pub mod qr;
pub mod rank_one;
