//! Kubernetes controller for the KubegresRestore CRD
//!
//! This module contains the controller that watches KubegresRestore resources,
//! and the Jobs and Pods they own, and triggers reconciliation.

mod restore_controller;

pub use restore_controller::run as run_restore_controller;

use kube::Client;

use crate::config::OperatorConfig;

/// Shared context of the controller
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Operator configuration
    pub config: OperatorConfig,
}

impl Context {
    /// Create a new context
    pub fn new(client: Client, config: OperatorConfig) -> Self {
        Self { client, config }
    }
}
