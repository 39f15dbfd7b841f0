//! Enforcers converging the resources of a restore
//!
//! Each enforcer owns one resource type. Given the same observed state it
//! issues the same mutations, and none once the resource has converged. The
//! [`EnforcementPipeline`] runs them in a fixed order and stops at the first
//! error.

mod cluster;
mod debug_pods;
mod file_checker;
mod restore_job;

pub use cluster::ClusterEnforcer;
pub use debug_pods::DebugPodEnforcer;
pub use file_checker::FileCheckerEnforcer;
pub use restore_job::RestoreJobEnforcer;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::adapters::{EventKind, EventSink, ResourceStore};
use crate::config::OperatorConfig;
use crate::crd::{KubegresRestore, KubegresRestoreStatus};
use crate::error::{Error, Result};
use crate::metrics;
use crate::states::ObservedState;
use crate::status::StatusDiff;

/// What an enforcer converges: the request, its observed state and its
/// persisted status
#[derive(Clone, Copy)]
pub struct EnforcementTarget<'a> {
    pub restore: &'a KubegresRestore,
    pub observed: &'a ObservedState,
    pub status: &'a KubegresRestoreStatus,
}

impl EnforcementTarget<'_> {
    /// Whether `message` is already the persisted status message
    pub fn is_reported(&self, message: &str) -> bool {
        self.status.message.as_deref() == Some(message)
    }
}

/// Collaborators shared by all enforcers of one reconciliation
#[derive(Clone, Copy)]
pub struct EnforcerContext<'a> {
    pub store: &'a dyn ResourceStore,
    pub events: &'a dyn EventSink,
    pub config: &'a OperatorConfig,
}

impl EnforcerContext<'_> {
    /// Publish a warning unless the same message was already reported
    pub async fn warn_once(&self, target: &EnforcementTarget<'_>, reason: &str, message: &str) {
        if !target.is_reported(message) {
            self.events
                .publish(EventKind::Warning, reason, message.to_string())
                .await;
        }
    }

    /// Report a failed mutation and wrap it with its user facing message
    pub async fn failure(
        &self,
        target: &EnforcementTarget<'_>,
        enforcer: &'static str,
        reason: &str,
        message: String,
        source: Error,
    ) -> Error {
        metrics::ENFORCER_ERRORS.with_label_values(&[enforcer]).inc();
        let message = format!("{}: {}", message, source);
        self.warn_once(target, reason, &message).await;
        Error::enforcement(message, source)
    }
}

fn record_mutation(enforcer: &'static str, action: &'static str) {
    metrics::ENFORCER_MUTATIONS
        .with_label_values(&[enforcer, action])
        .inc();
}

/// Converges one resource type toward the state a restore requires
#[async_trait]
pub trait Enforcer: Send + Sync {
    /// Short name used in logs and metrics
    fn name(&self) -> &'static str;

    /// Issue the mutations needed for this resource, returning status changes
    async fn enforce(&self, target: &EnforcementTarget<'_>) -> Result<StatusDiff>;
}

/// Result of running the pipeline
///
/// The diff holds the changes of every enforcer that ran, including the
/// failure message when one of them failed.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub diff: StatusDiff,
    pub error: Option<Error>,
}

/// Enforcers in their fixed execution order
pub struct EnforcementPipeline<'a> {
    enforcers: Vec<Box<dyn Enforcer + 'a>>,
}

impl<'a> EnforcementPipeline<'a> {
    /// Build the pipeline: file checker, cluster, restore job, then debug pods
    /// when enabled
    pub fn new(ctx: EnforcerContext<'a>) -> Self {
        let mut enforcers: Vec<Box<dyn Enforcer + 'a>> = vec![
            Box::new(FileCheckerEnforcer::new(ctx)),
            Box::new(ClusterEnforcer::new(ctx)),
            Box::new(RestoreJobEnforcer::new(ctx)),
        ];
        if ctx.config.debug_pods_enabled {
            enforcers.push(Box::new(DebugPodEnforcer::new(ctx)));
        }
        Self { enforcers }
    }

    /// Names of the enforcers in execution order
    pub fn names(&self) -> Vec<&'static str> {
        self.enforcers.iter().map(|e| e.name()).collect()
    }

    /// Run every enforcer in order, stopping at the first error
    pub async fn run(&self, target: &EnforcementTarget<'_>) -> PipelineOutcome {
        let mut diff = StatusDiff::default();

        for enforcer in &self.enforcers {
            match enforcer.enforce(target).await {
                Ok(changes) => {
                    debug!(enforcer = enforcer.name(), ?changes, "Enforcer finished");
                    diff = diff.merge(changes);
                }
                Err(error) => {
                    warn!(enforcer = enforcer.name(), error = %error, "Enforcer failed");
                    if let Error::Enforcement { message, .. } = &error {
                        diff = diff.merge(StatusDiff::message(message.clone()));
                    }
                    return PipelineOutcome {
                        diff,
                        error: Some(error),
                    };
                }
            }
        }

        PipelineOutcome { diff, error: None }
    }
}
