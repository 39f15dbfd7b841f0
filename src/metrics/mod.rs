//! Prometheus metrics for the Kubegres Restore Operator
//!
//! This module exposes metrics for monitoring operator health and restore progress.

mod prometheus;

pub use prometheus::*;
