//! State of the one-shot restore job

use k8s_openapi::api::batch::v1::{Job, JobStatus};

/// Phase of the restore job
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobPhase {
    /// Derive the phase from job status counters
    pub fn from_status(status: Option<&JobStatus>) -> Self {
        let Some(status) = status else {
            return JobPhase::Pending;
        };
        if status.active.unwrap_or(0) > 0 {
            JobPhase::Running
        } else if status.succeeded.unwrap_or(0) > 0 {
            JobPhase::Succeeded
        } else if status.failed.unwrap_or(0) > 0 {
            JobPhase::Failed
        } else {
            JobPhase::Pending
        }
    }
}

/// Observed state of the restore job and its PVC
#[derive(Clone, Debug)]
pub struct JobState {
    pub is_deployed: bool,
    pub phase: JobPhase,
    pub is_pvc_deployed: bool,
}

impl JobState {
    /// Build the state from an optional job and whether the snapshot PVC exists
    pub fn new(job: Option<&Job>, is_pvc_deployed: bool) -> Self {
        match job {
            Some(job) => Self {
                is_deployed: true,
                phase: JobPhase::from_status(job.status.as_ref()),
                is_pvc_deployed,
            },
            None => Self {
                is_deployed: false,
                phase: JobPhase::Pending,
                is_pvc_deployed,
            },
        }
    }
}
