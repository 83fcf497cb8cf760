//! System callbacks and solver working storage.

pub mod system;
pub mod workspace;

pub use system::{AnalyticSystem, EvalAborted, EvalResult, System};
pub use workspace::HybridWorkspace;
