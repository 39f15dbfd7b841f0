//! Kubernetes Event publishing for KubegresRestore resources

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::{info, warn};

use super::{EventKind, EventSink};

/// Controller name reported on events
pub const REPORTING_CONTROLLER: &str = "kubegres-restore-operator";

/// [`EventSink`] wrapping `kube::runtime::events::Recorder`
///
/// One sink is built per reconciliation, bound to the restore being reconciled.
pub struct KubeEventSink {
    recorder: Recorder,
}

impl KubeEventSink {
    /// Create a sink publishing events about `reference`
    pub fn new(client: Client, reference: ObjectReference) -> Self {
        let reporter = Reporter {
            controller: REPORTING_CONTROLLER.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter, reference),
        }
    }
}

#[async_trait]
impl EventSink for KubeEventSink {
    async fn publish(&self, kind: EventKind, reason: &str, note: String) {
        match kind {
            EventKind::Normal => info!(reason, note = %note, "Publishing event"),
            EventKind::Warning => warn!(reason, note = %note, "Publishing warning event"),
        }

        let event = Event {
            type_: match kind {
                EventKind::Normal => EventType::Normal,
                EventKind::Warning => EventType::Warning,
            },
            reason: reason.to_string(),
            note: Some(note),
            action: "Reconcile".to_string(),
            secondary: None,
        };

        if let Err(e) = self.recorder.publish(event).await {
            warn!(reason, error = %e, "Failed to publish Kubernetes event");
        }
    }
}

/// Well-known event reasons
pub mod reasons {
    pub const FILE_CHECKER_DEPLOYED: &str = "FileCheckerDeployment";
    pub const FILE_CHECKER_DEPLOYMENT_ERR: &str = "FileCheckerDeploymentErr";
    pub const FILE_CHECKER_DELETED: &str = "FileCheckerDeletion";
    pub const FILE_CHECKER_DELETION_ERR: &str = "FileCheckerDeletionErr";
    pub const SNAPSHOT_FILE_NOT_FOUND: &str = "SnapshotFileNotFoundErr";
    pub const CLUSTER_DEPLOYED: &str = "KubegresDeployed";
    pub const CLUSTER_DEPLOYMENT_ERR: &str = "KubegresDeploymentErr";
    pub const CLUSTER_RELEASED: &str = "ReleasedKubegresResource";
    pub const CLUSTER_FINALIZATION_ERR: &str = "KubegresFinalizationErr";
    pub const JOB_DEPLOYED: &str = "JobDeployment";
    pub const JOB_DEPLOYMENT_ERR: &str = "JobDeploymentErr";
    pub const JOB_FAILED: &str = "RestoreJobFailed";
    pub const DEBUG_POD_DEPLOYED: &str = "DebugPodDeployment";
    pub const DEBUG_POD_DEPLOYMENT_ERR: &str = "DebugPodDeploymentErr";
    pub const DEBUG_POD_DELETED: &str = "DebugPodDeletion";
    pub const DEBUG_POD_DELETION_ERR: &str = "DebugPodDeletionErr";
    pub const SPEC_CHECK_ERR: &str = "SpecCheckErr";
}
