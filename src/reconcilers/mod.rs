//! Reconcilers for the Kubegres Restore CRD
//!
//! This module contains the business logic of a reconciliation:
//! - Observing the resources a restore depends on
//! - Validating the restore spec against them
//! - Running the enforcers and updating the restore status

pub mod restore;
