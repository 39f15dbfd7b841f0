//! One-shot restore job

use async_trait::async_trait;
use tracing::debug;

use super::{record_mutation, EnforcementTarget, Enforcer, EnforcerContext};
use crate::adapters::{reasons, EventKind};
use crate::error::Result;
use crate::states::JobPhase;
use crate::status::{job_failed_message, StatusDiff};
use crate::templates;

const NAME: &str = "restore_job";

/// Creates the restore job once the target cluster is ready and reports its
/// failure
pub struct RestoreJobEnforcer<'a> {
    ctx: EnforcerContext<'a>,
}

impl<'a> RestoreJobEnforcer<'a> {
    pub fn new(ctx: EnforcerContext<'a>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Enforcer for RestoreJobEnforcer<'_> {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn enforce(&self, target: &EnforcementTarget<'_>) -> Result<StatusDiff> {
        let restore = target.restore;
        let observed = target.observed;
        let job = &observed.job;

        if job.is_deployed {
            if job.phase == JobPhase::Failed {
                let message = job_failed_message(restore);
                self.ctx
                    .warn_once(target, reasons::JOB_FAILED, &message)
                    .await;
                return Ok(StatusDiff::message(message));
            }
            return Ok(StatusDiff::default());
        }

        if !observed.is_snapshot_file_found() || job.phase == JobPhase::Succeeded {
            return Ok(StatusDiff::default());
        }

        let cluster = match observed.cluster.cluster.as_ref() {
            Some(cluster) if observed.cluster.is_ready => cluster,
            _ => {
                debug!(
                    cluster = %restore.spec.cluster_name,
                    "Waiting for the target cluster to be ready"
                );
                return Ok(StatusDiff::default());
            }
        };

        let name = restore.restore_job_name();
        let created = match templates::restore_job(restore, &cluster.spec, self.ctx.config) {
            Ok(job) => self.ctx.store.create_job(&job).await,
            Err(e) => Err(e),
        };
        if let Err(e) = created {
            return Err(self
                .ctx
                .failure(
                    target,
                    NAME,
                    reasons::JOB_DEPLOYMENT_ERR,
                    format!("Unable to deploy the restore job '{}'", name),
                    e,
                )
                .await);
        }

        record_mutation(NAME, "create");
        self.ctx
            .events
            .publish(
                EventKind::Normal,
                reasons::JOB_DEPLOYED,
                format!(
                    "Deployed job '{}' restoring '{}' into database '{}' of cluster '{}'",
                    name,
                    restore.snapshot_path(),
                    restore.spec.database_name,
                    restore.spec.cluster_name
                ),
            )
            .await;
        Ok(StatusDiff::default())
    }
}
