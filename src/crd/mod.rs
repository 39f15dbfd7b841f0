//! Custom Resource Definitions used by the Kubegres Restore Operator

mod kubegres;
mod kubegres_restore;

pub use kubegres::*;
pub use kubegres_restore::*;

use kube::CustomResourceExt;

/// Generate the YAML manifests of the CRDs owned by this operator
///
/// The `Kubegres` CRD belongs to the Kubegres operator and is not generated here.
pub fn generate_crds() -> Result<Vec<String>, serde_yaml::Error> {
    Ok(vec![serde_yaml::to_string(&KubegresRestore::crd())?])
}
