//! Snapshot file checker pod

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::info;

use super::{record_mutation, EnforcementTarget, Enforcer, EnforcerContext};
use crate::adapters::{reasons, EventKind};
use crate::crd::KubegresRestore;
use crate::error::Result;
use crate::states::ExitStatus;
use crate::status::StatusDiff;
use crate::templates;

const NAME: &str = "file_checker";

/// Deploys the pod checking that the snapshot file exists and reports a
/// missing file
pub struct FileCheckerEnforcer<'a> {
    ctx: EnforcerContext<'a>,
}

impl<'a> FileCheckerEnforcer<'a> {
    pub fn new(ctx: EnforcerContext<'a>) -> Self {
        Self { ctx }
    }

    async fn deploy(&self, target: &EnforcementTarget<'_>) -> Result<()> {
        let restore = target.restore;
        let name = restore.file_checker_pod_name();

        let created = match templates::file_checker_pod(restore, self.ctx.config) {
            Ok(pod) => self.ctx.store.create_pod(&pod).await,
            Err(e) => Err(e),
        };
        if let Err(e) = created {
            return Err(self
                .ctx
                .failure(
                    target,
                    NAME,
                    reasons::FILE_CHECKER_DEPLOYMENT_ERR,
                    format!("Unable to deploy the snapshot file checker pod '{}'", name),
                    e,
                )
                .await);
        }

        record_mutation(NAME, "create");
        self.ctx
            .events
            .publish(
                EventKind::Normal,
                reasons::FILE_CHECKER_DEPLOYED,
                format!(
                    "Deployed pod '{}' checking snapshot file '{}'",
                    name,
                    restore.snapshot_path()
                ),
            )
            .await;
        Ok(())
    }

    async fn delete(&self, target: &EnforcementTarget<'_>, pod: &Pod) -> Result<()> {
        let name = pod.name_any();
        if let Err(e) = self.ctx.store.delete_pod(&name).await {
            return Err(self
                .ctx
                .failure(
                    target,
                    NAME,
                    reasons::FILE_CHECKER_DELETION_ERR,
                    format!("Unable to delete the outdated snapshot file checker pod '{}'", name),
                    e,
                )
                .await);
        }

        record_mutation(NAME, "delete");
        self.ctx
            .events
            .publish(
                EventKind::Normal,
                reasons::FILE_CHECKER_DELETED,
                format!(
                    "Deleted pod '{}' as the snapshot file location changed, it will be redeployed",
                    name
                ),
            )
            .await;
        Ok(())
    }
}

#[async_trait]
impl Enforcer for FileCheckerEnforcer<'_> {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn enforce(&self, target: &EnforcementTarget<'_>) -> Result<StatusDiff> {
        let state = &target.observed.file_checker;

        let pod = match state.pod.as_ref() {
            Some(pod) if state.is_deployed => pod,
            _ => {
                self.deploy(target).await?;
                return Ok(StatusDiff::default());
            }
        };

        if state.is_outdated {
            info!(pod = %pod.name_any(), "Snapshot file location changed");
            self.delete(target, pod).await?;
            return Ok(StatusDiff::default());
        }

        if state.exit_status == ExitStatus::FileNotFound {
            let message = snapshot_not_found_message(target.restore, &state.candidate_snapshot_names);
            self.ctx
                .warn_once(target, reasons::SNAPSHOT_FILE_NOT_FOUND, &message)
                .await;
            return Ok(StatusDiff::message(message));
        }

        Ok(StatusDiff::default())
    }
}

/// Warning reported when the snapshot file is missing, listing the most
/// recent files found instead
pub fn snapshot_not_found_message(restore: &KubegresRestore, candidates: &[String]) -> String {
    let file = &restore.spec.data_source.file;
    let mut message = format!(
        "In the Resources Spec the value of 'spec.dataSource.file.snapshot' is set to '{}' but \
         this file does not exist in the PersistentVolumeClaim '{}' mounted at '{}'.",
        file.snapshot, file.pvc_name, file.mount_path
    );
    if candidates.is_empty() {
        message.push_str(" No other file was found at that location.");
    } else {
        let names: Vec<String> = candidates.iter().map(|name| format!("'{}'", name)).collect();
        message.push_str(&format!(
            " The most recent files available are: {}.",
            names.join(", ")
        ));
    }
    message
}
