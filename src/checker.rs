//! Semantic validation of a KubegresRestore against the observed state
//!
//! A fatal violation means the restore cannot progress until the request is
//! edited. It is not a system error: enforcement is skipped and the message is
//! persisted in status.

use std::fmt;

use crate::crd::KubegresRestore;
use crate::states::{JobPhase, ObservedState};

/// A fatal problem with a restore request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpecViolation {
    /// A required field is empty
    Undefined(&'static str),
    /// The snapshot PVC does not exist
    PvcNotDeployed,
    /// The target cluster name is taken by a cluster this restore does not manage
    TargetClusterNotManaged,
    /// Both the source cluster name and an inline spec are set
    ClusterNameAndSpecBothSet,
    /// The source cluster does not exist
    SourceClusterNotDeployed,
    /// The custom ConfigMap does not exist
    CustomConfigNotDeployed,
}

impl fmt::Display for SpecViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecViolation::Undefined(field) => write!(
                f,
                "In the Resources Spec the value of '{}' is undefined. Please set a value \
                 otherwise this operator cannot work correctly.",
                field
            ),
            SpecViolation::PvcNotDeployed => f.write_str(
                "In the Resources Spec the value of 'spec.dataSource.file.pvcName' has a \
                 PersistentVolumeClaim name which is not deployed. Please deploy this \
                 PersistentVolumeClaim, otherwise this operator cannot work correctly.",
            ),
            SpecViolation::TargetClusterNotManaged => f.write_str(
                "In the Resources Spec the value of 'spec.clusterName' must not refer to an \
                 existing Kubegres resource. Please change this value, otherwise the restore \
                 process cannot proceed.",
            ),
            SpecViolation::ClusterNameAndSpecBothSet => f.write_str(
                "In the Resources Spec the fields 'spec.dataSource.cluster.clusterName' and \
                 'spec.dataSource.cluster.clusterSpec' cannot be used at the same time. \
                 Please unset one of them.",
            ),
            SpecViolation::SourceClusterNotDeployed => f.write_str(
                "In the Resources Spec the value of 'spec.dataSource.cluster.clusterName' refers \
                 to a Kubegres resource which is not deployed. Please deploy this Kubegres \
                 resource, otherwise this operator cannot work correctly.",
            ),
            SpecViolation::CustomConfigNotDeployed => f.write_str(
                "In the Resources Spec the value of 'spec.customConfig' refers to a ConfigMap \
                 which is not deployed. Please deploy this ConfigMap, otherwise this operator \
                 cannot work correctly.",
            ),
        }
    }
}

/// Verdict of a spec check
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpecCheckResult {
    pub violations: Vec<SpecViolation>,
}

impl SpecCheckResult {
    /// Whether any violation was found
    pub fn has_fatal_error(&self) -> bool {
        !self.violations.is_empty()
    }

    /// Message of the first violation
    pub fn message(&self) -> Option<String> {
        self.violations.first().map(ToString::to_string)
    }

    /// Whether a given violation was found
    pub fn contains(&self, violation: &SpecViolation) -> bool {
        self.violations.contains(violation)
    }
}

/// Check a restore request against the observed state
///
/// Every check runs; the first violation is the one displayed.
pub fn check(restore: &KubegresRestore, observed: &ObservedState) -> SpecCheckResult {
    let spec = &restore.spec;
    let file = &spec.data_source.file;
    let source = &spec.data_source.cluster;
    let mut violations = Vec::new();

    if spec.cluster_name.is_empty() {
        violations.push(SpecViolation::Undefined("spec.clusterName"));
    }

    if !observed.job.is_pvc_deployed {
        violations.push(SpecViolation::PvcNotDeployed);
    }

    if file.mount_path.is_empty() {
        violations.push(SpecViolation::Undefined("spec.dataSource.file.mountPath"));
    }

    if file.snapshot.is_empty() {
        violations.push(SpecViolation::Undefined("spec.dataSource.file.snapshot"));
    }

    // A cluster released by this restore no longer carries the marker
    let released_by_this_restore = observed.job.phase == JobPhase::Succeeded;
    if observed.cluster.is_deployed
        && !observed.cluster.is_managed_by_this_restore
        && !released_by_this_restore
    {
        violations.push(SpecViolation::TargetClusterNotManaged);
    }

    match (!source.cluster_name.is_empty(), source.cluster_spec.is_some()) {
        (true, true) => violations.push(SpecViolation::ClusterNameAndSpecBothSet),
        (false, false) => violations.push(SpecViolation::Undefined("spec.dataSource.cluster")),
        _ => {}
    }

    if restore.restores_from_existing_cluster() && !observed.source_cluster.is_deployed {
        violations.push(SpecViolation::SourceClusterNotDeployed);
    }

    if restore.custom_config_name().is_some() && !observed.custom_config.is_deployed {
        violations.push(SpecViolation::CustomConfigNotDeployed);
    }

    if spec.database_name.is_empty() {
        violations.push(SpecViolation::Undefined("spec.databaseName"));
    }

    SpecCheckResult { violations }
}
