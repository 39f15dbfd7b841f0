//! Observed state of every resource relevant to one restore
//!
//! [`ResourceObserver`] rebuilds an [`ObservedState`] snapshot on every
//! reconciliation. It only reads: absent resources become `is_deployed = false`
//! and only unexpected API failures are returned as errors.

mod cluster;
mod debug_pods;
mod file_checker;
mod job;

pub use cluster::*;
pub use debug_pods::*;
pub use file_checker::*;
pub use job::*;

use tracing::debug;

use crate::adapters::ResourceStore;
use crate::crd::{KubegresRestore, KubegresSpec};
use crate::error::Result;

/// Observed state of the referenced custom ConfigMap
#[derive(Clone, Debug, Default)]
pub struct CustomConfigState {
    pub is_deployed: bool,
}

/// Snapshot of the real state of a restore's resources
#[derive(Clone, Debug)]
pub struct ObservedState {
    pub file_checker: FileCheckerState,
    pub cluster: ClusterState,
    pub job: JobState,
    pub source_cluster: SourceClusterState,
    pub custom_config: CustomConfigState,
    pub debug_pods: DebugPodsState,
    /// Template spec of the target cluster, when it can be resolved
    pub resolved_spec: Option<KubegresSpec>,
}

impl ObservedState {
    /// Whether the snapshot file was confirmed to exist
    pub fn is_snapshot_file_found(&self) -> bool {
        self.file_checker.exit_status == ExitStatus::Ok
    }
}

/// Reads the current state of a restore's resources
pub struct ResourceObserver<'a> {
    store: &'a dyn ResourceStore,
    debug_pods_enabled: bool,
}

impl<'a> ResourceObserver<'a> {
    /// Create an observer reading through `store`
    pub fn new(store: &'a dyn ResourceStore, debug_pods_enabled: bool) -> Self {
        Self {
            store,
            debug_pods_enabled,
        }
    }

    /// Build the observed state of `restore`
    pub async fn observe(&self, restore: &KubegresRestore) -> Result<ObservedState> {
        let cluster = load_cluster_state(self.store, restore).await?;

        let job = self
            .store
            .get_job(&restore.restore_job_name())
            .await?
            .into_option();
        let pvc_name = &restore.spec.data_source.file.pvc_name;
        let is_pvc_deployed =
            !pvc_name.is_empty() && self.store.get_pvc(pvc_name).await?.is_found();
        let job = JobState::new(job.as_ref(), is_pvc_deployed);

        let file_checker = match self
            .store
            .get_pod(&restore.file_checker_pod_name())
            .await?
            .into_option()
        {
            Some(pod) => FileCheckerState::for_request(pod, restore),
            None => FileCheckerState::absent(),
        };

        let source_cluster = load_source_cluster_state(self.store, restore).await?;

        let custom_config = match restore.custom_config_name() {
            Some(name) => CustomConfigState {
                is_deployed: self.store.get_config_map(name).await?.is_found(),
            },
            None => CustomConfigState::default(),
        };

        let debug_pods = if self.debug_pods_enabled {
            load_debug_pods_state(self.store, restore).await?
        } else {
            DebugPodsState::default()
        };

        let resolved_spec = if restore.restores_from_existing_cluster() {
            source_cluster.cluster.as_ref().map(|c| c.spec.clone())
        } else {
            restore.spec.data_source.cluster.cluster_spec.clone()
        };

        debug!(
            cluster_deployed = cluster.is_deployed,
            cluster_ready = cluster.is_ready,
            cluster_managed = cluster.is_managed_by_this_restore,
            job_deployed = job.is_deployed,
            job_phase = ?job.phase,
            pvc_deployed = job.is_pvc_deployed,
            file_checker_deployed = file_checker.is_deployed,
            exit_status = ?file_checker.exit_status,
            file_checker_outdated = file_checker.is_outdated,
            "Observed restore resources"
        );

        Ok(ObservedState {
            file_checker,
            cluster,
            job,
            source_cluster,
            custom_config,
            debug_pods,
            resolved_spec,
        })
    }
}
