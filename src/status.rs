//! Projection of observed state onto the persisted KubegresRestore status
//!
//! Status changes travel as an explicit [`StatusDiff`]. The reconciler merges
//! the projected diff with the diffs returned by enforcers, reduces it against
//! the persisted status and writes only when something actually changed.

use chrono::Utc;
use kube::ResourceExt;
use tracing::info;

use crate::adapters::ResourceStore;
use crate::checker::SpecCheckResult;
use crate::crd::{KubegresRestore, KubegresRestoreStatus, RestoreStage};
use crate::error::Result;
use crate::states::{ExitStatus, JobPhase, ObservedState};

/// Pending changes to a restore status; `None` leaves a field untouched
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatusDiff {
    pub is_completed: Option<bool>,
    pub stage: Option<RestoreStage>,
    /// `Some(None)` clears the message
    pub message: Option<Option<String>>,
}

impl StatusDiff {
    /// Diff moving the restore to `stage`, completed iff the stage is the final one
    pub fn stage(stage: RestoreStage) -> Self {
        Self {
            is_completed: Some(stage == RestoreStage::RestoreJobCompleted),
            stage: Some(stage),
            message: None,
        }
    }

    /// Diff setting the message
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(Some(message.into())),
            ..Default::default()
        }
    }

    /// Whether the diff changes nothing
    pub fn is_empty(&self) -> bool {
        self.is_completed.is_none() && self.stage.is_none() && self.message.is_none()
    }

    /// Overlay `other`; its fields win where set
    pub fn merge(mut self, other: StatusDiff) -> Self {
        if other.is_completed.is_some() {
            self.is_completed = other.is_completed;
        }
        if other.stage.is_some() {
            self.stage = other.stage;
        }
        if other.message.is_some() {
            self.message = other.message;
        }
        self
    }

    /// Keep only the fields that differ from `current`
    pub fn changes_from(&self, current: &KubegresRestoreStatus) -> StatusDiff {
        StatusDiff {
            is_completed: self.is_completed.filter(|v| *v != current.is_completed),
            stage: self.stage.filter(|v| Some(*v) != current.stage),
            message: self
                .message
                .clone()
                .filter(|v| *v != current.message),
        }
    }

    /// Apply onto a status, stamping the transition time when the stage changes
    pub fn apply_to(&self, status: &mut KubegresRestoreStatus) {
        if let Some(is_completed) = self.is_completed {
            status.is_completed = is_completed;
        }
        if let Some(stage) = self.stage {
            if status.stage != Some(stage) {
                status.stage_transition_time = Some(Utc::now());
            }
            status.stage = Some(stage);
        }
        if let Some(message) = &self.message {
            status.message = message.clone();
        }
    }
}

/// Message reported when the restore job failed
pub fn job_failed_message(restore: &KubegresRestore) -> String {
    format!(
        "Unable to complete restore job '{}'. Check the logs of its pod, then delete and \
         recreate this KubegresRestore to retry.",
        restore.restore_job_name()
    )
}

/// Stage implied by the observed state
///
/// Completion is only projected once the cluster has been released; the
/// finalizing pass itself reports completion through the cluster enforcer.
pub fn project_stage(observed: &ObservedState) -> RestoreStage {
    let job = &observed.job;
    let cluster = &observed.cluster;

    if job.is_deployed {
        return match job.phase {
            JobPhase::Succeeded if cluster.is_deployed && !cluster.is_managed_by_this_restore => {
                RestoreStage::RestoreJobCompleted
            }
            JobPhase::Succeeded | JobPhase::Running => RestoreStage::RestoreJobRunning,
            JobPhase::Failed => RestoreStage::RestoreJobFailed,
            JobPhase::Pending => RestoreStage::RestoreJobDeploying,
        };
    }

    if cluster.is_deployed {
        return if cluster.is_ready {
            RestoreStage::RestoreJobDeploying
        } else {
            RestoreStage::WaitingForCluster
        };
    }

    match observed.file_checker.exit_status {
        ExitStatus::Ok => RestoreStage::DeployingCluster,
        ExitStatus::FileNotFound | ExitStatus::Undefined => RestoreStage::CheckingSnapshotFile,
    }
}

/// Maps observed state onto status and persists deltas
pub struct StatusProjector<'a> {
    store: &'a dyn ResourceStore,
}

impl<'a> StatusProjector<'a> {
    /// Create a projector writing through `store`
    pub fn new(store: &'a dyn ResourceStore) -> Self {
        Self { store }
    }

    /// Status implied by the observed state and the spec check
    pub fn project(
        restore: &KubegresRestore,
        observed: &ObservedState,
        check: &SpecCheckResult,
    ) -> StatusDiff {
        let stage = project_stage(observed);
        let message = match check.message() {
            Some(message) => Some(message),
            None if stage == RestoreStage::RestoreJobFailed => Some(job_failed_message(restore)),
            None => None,
        };

        StatusDiff {
            message: Some(message),
            ..StatusDiff::stage(stage)
        }
    }

    /// Write `diff` if it changes the persisted status
    ///
    /// Returns the minimal diff that was written, empty when nothing changed.
    pub async fn persist(&self, restore: &KubegresRestore, diff: &StatusDiff) -> Result<StatusDiff> {
        let current = restore.current_status();
        let changes = diff.changes_from(&current);
        if changes.is_empty() {
            return Ok(changes);
        }

        let mut status = current;
        changes.apply_to(&mut status);

        info!(
            name = %restore.name_any(),
            stage = ?status.stage,
            is_completed = status.is_completed,
            message = status.message.as_deref().unwrap_or(""),
            "Updating KubegresRestore status"
        );

        let mut updated = restore.clone();
        updated.status = Some(status);
        self.store.replace_restore_status(&updated).await?;
        Ok(changes)
    }
}
