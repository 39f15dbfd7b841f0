//! Kubegres Restore Kubernetes Operator
//!
//! This operator restores Kubegres PostgreSQL clusters from snapshot files
//! stored in PersistentVolumeClaims, driven by `KubegresRestore` resources.

pub mod adapters;
pub mod checker;
pub mod config;
pub mod controllers;
pub mod crd;
pub mod enforcers;
pub mod error;
pub mod metrics;
pub mod reconcilers;
pub mod states;
pub mod status;
pub mod templates;

pub use error::{Error, Result};
