//! State of the debug pods attached to a restore

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::info;

use crate::adapters::ResourceStore;
use crate::crd::KubegresRestore;
use crate::error::Result;

/// A deployed debug pod
#[derive(Clone, Debug)]
pub struct DebugPodState {
    pub name: String,
    pub is_ready: bool,
    pub is_stuck: bool,
}

/// Debug pods of a restore, oldest first
#[derive(Clone, Debug, Default)]
pub struct DebugPodsState {
    pub pods: Vec<DebugPodState>,
}

impl DebugPodsState {
    /// Number of debug pods currently deployed
    pub fn deployed_count(&self) -> i32 {
        i32::try_from(self.pods.len()).unwrap_or(i32::MAX)
    }
}

fn is_stuck(pod: &Pod) -> bool {
    let reason = pod
        .status
        .as_ref()
        .and_then(|s| s.container_statuses.as_ref())
        .and_then(|statuses| statuses.first())
        .and_then(|status| status.state.as_ref())
        .and_then(|state| state.waiting.as_ref())
        .and_then(|waiting| waiting.reason.as_deref());

    match reason {
        Some(reason @ ("CrashLoopBackOff" | "Error")) => {
            info!(pod = %pod.name_any(), reason, "Debug pod is waiting");
            true
        }
        _ => false,
    }
}

fn is_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.container_statuses.as_ref())
        .and_then(|statuses| statuses.first())
        .map(|status| status.ready)
        .unwrap_or(false)
}

/// Load the debug pods of a restore, skipping pods already being deleted
pub async fn load_debug_pods_state(
    store: &dyn ResourceStore,
    restore: &KubegresRestore,
) -> Result<DebugPodsState> {
    let mut pods: Vec<Pod> = store
        .list_pods(&restore.debug_pod_selector())
        .await?
        .into_iter()
        .filter(|pod| pod.metadata.deletion_timestamp.is_none())
        .collect();

    pods.sort_by(|a, b| {
        a.metadata
            .creation_timestamp
            .as_ref()
            .map(|t| t.0)
            .cmp(&b.metadata.creation_timestamp.as_ref().map(|t| t.0))
            .then_with(|| a.name_any().cmp(&b.name_any()))
    });

    let pods = pods
        .iter()
        .map(|pod| {
            let stuck = is_stuck(pod);
            DebugPodState {
                name: pod.name_any(),
                is_ready: is_ready(pod) && !stuck,
                is_stuck: stuck,
            }
        })
        .collect();

    Ok(DebugPodsState { pods })
}
