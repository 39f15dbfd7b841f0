//! Debug pods mounting the snapshot PVC

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{record_mutation, EnforcementTarget, Enforcer, EnforcerContext};
use crate::adapters::{reasons, EventKind};
use crate::error::Result;
use crate::status::StatusDiff;
use crate::templates;

const NAME: &str = "debug_pods";

/// Scales the restore's debug pods to the requested count, removing the
/// oldest first
pub struct DebugPodEnforcer<'a> {
    ctx: EnforcerContext<'a>,
}

impl<'a> DebugPodEnforcer<'a> {
    pub fn new(ctx: EnforcerContext<'a>) -> Self {
        Self { ctx }
    }

    async fn scale_up(&self, target: &EnforcementTarget<'_>, count: i32) -> Result<()> {
        let restore = target.restore;
        for _ in 0..count {
            let created = match templates::debug_pod(restore, self.ctx.config) {
                Ok(pod) => self.ctx.store.create_pod(&pod).await,
                Err(e) => Err(e),
            };
            let pod = match created {
                Ok(pod) => pod,
                Err(e) => {
                    return Err(self
                        .ctx
                        .failure(
                            target,
                            NAME,
                            reasons::DEBUG_POD_DEPLOYMENT_ERR,
                            format!(
                                "Unable to deploy a debug pod with prefix '{}'",
                                restore.debug_pod_name_prefix()
                            ),
                            e,
                        )
                        .await)
                }
            };

            record_mutation(NAME, "create");
            self.ctx
                .events
                .publish(
                    EventKind::Normal,
                    reasons::DEBUG_POD_DEPLOYED,
                    format!(
                        "Deployed debug pod '{}' mounting the PersistentVolumeClaim '{}'",
                        pod.metadata.name.unwrap_or_default(),
                        restore.spec.data_source.file.pvc_name
                    ),
                )
                .await;
        }
        Ok(())
    }

    async fn scale_down(&self, target: &EnforcementTarget<'_>, count: usize) -> Result<()> {
        for pod in target.observed.debug_pods.pods.iter().take(count) {
            if let Err(e) = self.ctx.store.delete_pod(&pod.name).await {
                return Err(self
                    .ctx
                    .failure(
                        target,
                        NAME,
                        reasons::DEBUG_POD_DELETION_ERR,
                        format!("Unable to delete the debug pod '{}'", pod.name),
                        e,
                    )
                    .await);
            }

            record_mutation(NAME, "delete");
            self.ctx
                .events
                .publish(
                    EventKind::Normal,
                    reasons::DEBUG_POD_DELETED,
                    format!("Deleted debug pod '{}'", pod.name),
                )
                .await;
        }
        Ok(())
    }
}

#[async_trait]
impl Enforcer for DebugPodEnforcer<'_> {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn enforce(&self, target: &EnforcementTarget<'_>) -> Result<StatusDiff> {
        let state = &target.observed.debug_pods;
        let desired = target.restore.spec.debug_pods.unwrap_or(0).max(0);
        let deployed = state.deployed_count();

        for pod in state.pods.iter().filter(|pod| pod.is_stuck) {
            warn!(pod = %pod.name, "Debug pod is not starting");
        }
        debug!(
            deployed,
            ready = state.pods.iter().filter(|pod| pod.is_ready).count(),
            desired,
            "Debug pods observed"
        );

        if deployed < desired {
            info!(deployed, desired, "Scaling debug pods up");
            self.scale_up(target, desired - deployed).await?;
        } else if deployed > desired {
            info!(deployed, desired, "Scaling debug pods down");
            let excess = usize::try_from(deployed - desired).unwrap_or_default();
            self.scale_down(target, excess).await?;
        }

        Ok(StatusDiff::default())
    }
}
