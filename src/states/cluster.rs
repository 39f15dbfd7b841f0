//! State of the target Kubegres cluster

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;

use crate::adapters::{Lookup, ResourceStore};
use crate::crd::{Kubegres, KubegresRestore, MANAGED_BY_RESTORE_LABEL};
use crate::error::Result;

/// Observed state of the target cluster
#[derive(Clone, Debug, Default)]
pub struct ClusterState {
    pub is_deployed: bool,
    /// Primary StatefulSet has a ready replica and the primary Service exists
    pub is_ready: bool,
    /// The cluster carries this restore's ownership marker
    pub is_managed_by_this_restore: bool,
    pub cluster: Option<Kubegres>,
}

impl ClusterState {
    /// State when the target cluster does not exist
    pub fn absent() -> Self {
        Self::default()
    }
}

/// Observed state of the cluster used as template
#[derive(Clone, Debug, Default)]
pub struct SourceClusterState {
    pub is_deployed: bool,
    pub cluster: Option<Kubegres>,
}

/// Label selector of a Kubegres cluster's primary StatefulSet and Service
pub fn primary_selector(cluster_name: &str) -> String {
    format!("app={},replicationRole=primary", cluster_name)
}

/// Whether the cluster's marker label names this restore
pub fn is_managed_by(cluster: &Kubegres, restore: &KubegresRestore) -> bool {
    cluster
        .labels()
        .get(MANAGED_BY_RESTORE_LABEL)
        .map(|value| *value == restore.name_any())
        .unwrap_or(false)
}

fn is_owned_by(meta: &ObjectMeta, owner_uid: &str) -> bool {
    meta.owner_references
        .as_ref()
        .map(|refs| refs.iter().any(|r| r.uid == owner_uid))
        .unwrap_or(false)
}

/// Load the state of the restore's target cluster
pub async fn load_cluster_state(
    store: &dyn ResourceStore,
    restore: &KubegresRestore,
) -> Result<ClusterState> {
    let name = &restore.spec.cluster_name;
    if name.is_empty() {
        return Ok(ClusterState::absent());
    }

    let cluster = match store.get_cluster(name).await? {
        Lookup::Found(cluster) => cluster,
        Lookup::Absent => return Ok(ClusterState::absent()),
    };

    let is_ready = match cluster.uid() {
        Some(uid) => {
            let selector = primary_selector(name);
            let primary_ready = store
                .list_stateful_sets(&selector)
                .await?
                .iter()
                .filter(|set| is_owned_by(&set.metadata, &uid))
                .any(|set| {
                    set.status
                        .as_ref()
                        .and_then(|s| s.ready_replicas)
                        .unwrap_or(0)
                        >= 1
                });
            let primary_service = store
                .list_services(&selector)
                .await?
                .iter()
                .any(|svc| is_owned_by(&svc.metadata, &uid));
            primary_ready && primary_service
        }
        None => false,
    };

    Ok(ClusterState {
        is_deployed: true,
        is_ready,
        is_managed_by_this_restore: is_managed_by(&cluster, restore),
        cluster: Some(cluster),
    })
}

/// Load the source cluster when the target spec is copied from one
pub async fn load_source_cluster_state(
    store: &dyn ResourceStore,
    restore: &KubegresRestore,
) -> Result<SourceClusterState> {
    if !restore.restores_from_existing_cluster() {
        return Ok(SourceClusterState::default());
    }

    let cluster = store
        .get_cluster(&restore.spec.data_source.cluster.cluster_name)
        .await?
        .into_option();
    Ok(SourceClusterState {
        is_deployed: cluster.is_some(),
        cluster,
    })
}
