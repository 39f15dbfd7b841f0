//! Target Kubegres cluster: creation and release

use async_trait::async_trait;
use kube::ResourceExt;
use tracing::{debug, info};

use super::{record_mutation, EnforcementTarget, Enforcer, EnforcerContext};
use crate::adapters::{reasons, EventKind};
use crate::crd::{
    has_resources, Kubegres, KubegresRestore, KubegresSpec, RestoreStage, MANAGED_BY_RESTORE_LABEL,
};
use crate::error::{Error, Result};
use crate::states::JobPhase;
use crate::status::StatusDiff;
use crate::templates;

const NAME: &str = "cluster";

/// Creates the single-instance target cluster and releases it once the
/// restore job succeeded
pub struct ClusterEnforcer<'a> {
    ctx: EnforcerContext<'a>,
}

/// Changes applied to the target cluster when releasing it
#[derive(Debug, Default, PartialEq)]
pub struct Release {
    pub replicas: Option<i32>,
    pub resources_reverted: bool,
}

impl<'a> ClusterEnforcer<'a> {
    pub fn new(ctx: EnforcerContext<'a>) -> Self {
        Self { ctx }
    }

    async fn deploy(&self, target: &EnforcementTarget<'_>) -> Result<StatusDiff> {
        let restore = target.restore;
        let name = &restore.spec.cluster_name;

        let Some(template) = target.observed.resolved_spec.as_ref() else {
            let err = Error::validation(format!(
                "No Kubegres spec available to create the cluster '{}'",
                name
            ));
            return Err(self
                .ctx
                .failure(
                    target,
                    NAME,
                    reasons::CLUSTER_DEPLOYMENT_ERR,
                    format!("Unable to deploy the Kubegres cluster '{}'", name),
                    err,
                )
                .await);
        };

        let cluster = templates::target_cluster(restore, template);
        if let Err(e) = self.ctx.store.create_cluster(&cluster).await {
            return Err(self
                .ctx
                .failure(
                    target,
                    NAME,
                    reasons::CLUSTER_DEPLOYMENT_ERR,
                    format!("Unable to deploy the Kubegres cluster '{}'", name),
                    e,
                )
                .await);
        }

        record_mutation(NAME, "create");
        self.ctx
            .events
            .publish(
                EventKind::Normal,
                reasons::CLUSTER_DEPLOYED,
                format!(
                    "Deployed Kubegres cluster '{}' with 1 replica to restore '{}' into",
                    name,
                    restore.snapshot_path()
                ),
            )
            .await;
        Ok(StatusDiff::default())
    }

    async fn release(&self, target: &EnforcementTarget<'_>, cluster: &Kubegres) -> Result<StatusDiff> {
        let restore = target.restore;
        let mut released = cluster.clone();
        let release = prepare_release(
            &mut released,
            restore,
            target.observed.resolved_spec.as_ref(),
        );

        if let Err(e) = self.ctx.store.replace_cluster(&released).await {
            return Err(self
                .ctx
                .failure(
                    target,
                    NAME,
                    reasons::CLUSTER_FINALIZATION_ERR,
                    format!("Unable to release the Kubegres cluster '{}'", cluster.name_any()),
                    e,
                )
                .await);
        }

        record_mutation(NAME, "update");
        info!(cluster = %cluster.name_any(), ?release, "Released restored cluster");

        let mut note = format!(
            "Restore into Kubegres cluster '{}' completed. The cluster is no longer managed by this restore",
            cluster.name_any()
        );
        if let Some(replicas) = release.replicas {
            note.push_str(&format!(", replicas set to {}", replicas));
        }
        if release.resources_reverted {
            note.push_str(", resources reverted to the cluster template");
        }
        note.push('.');

        self.ctx
            .events
            .publish(EventKind::Normal, reasons::CLUSTER_RELEASED, note)
            .await;
        Ok(StatusDiff::stage(RestoreStage::RestoreJobCompleted))
    }
}

#[async_trait]
impl Enforcer for ClusterEnforcer<'_> {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn enforce(&self, target: &EnforcementTarget<'_>) -> Result<StatusDiff> {
        let observed = target.observed;
        if !observed.is_snapshot_file_found() {
            debug!("Snapshot file not confirmed, cluster left untouched");
            return Ok(StatusDiff::default());
        }

        let state = &observed.cluster;
        let cluster = match state.cluster.as_ref() {
            Some(cluster) if state.is_deployed => cluster,
            _ => return self.deploy(target).await,
        };

        if observed.job.phase == JobPhase::Succeeded && state.is_managed_by_this_restore {
            return self.release(target, cluster).await;
        }

        Ok(StatusDiff::default())
    }
}

/// Apply the release changes to `cluster`
///
/// Restores the template replica count, reverts resources overridden for the
/// restore and removes the ownership marker.
pub fn prepare_release(
    cluster: &mut Kubegres,
    restore: &KubegresRestore,
    template: Option<&KubegresSpec>,
) -> Release {
    let mut release = Release::default();

    if let Some(template) = template {
        if let Some(replicas) = template.replicas {
            if cluster.spec.replicas != Some(replicas) {
                cluster.spec.replicas = Some(replicas);
                release.replicas = Some(replicas);
            }
        }

        let overridden = restore
            .spec
            .resources
            .as_ref()
            .map(has_resources)
            .unwrap_or(false);
        if overridden && cluster.spec.resources != template.resources {
            cluster.spec.resources = template.resources.clone();
            release.resources_reverted = true;
        }
    }

    cluster.labels_mut().remove(MANAGED_BY_RESTORE_LABEL);
    release
}
