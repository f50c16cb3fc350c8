//! Metrics instrumentation
//!
//! Thin wrappers over the `metrics` facade so call sites stay one line long.
//! No recorder is installed by this crate; without one every call is a no-op.

pub mod counters;
pub mod histograms;
pub mod labels;
