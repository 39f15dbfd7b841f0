//! KubegresRestore reconciler
//!
//! One reconciliation observes the restore's resources, checks the request
//! against them and, when the request is valid, runs the enforcement
//! pipeline. The status is persisted in both cases, including when an
//! enforcer failed, and only when it actually changed.

use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{info, warn};

use crate::adapters::{reasons, EventKind};
use crate::checker;
use crate::config::OperatorConfig;
use crate::crd::{KubegresRestore, KubegresRestoreStatus, RestoreStage};
use crate::enforcers::{EnforcementPipeline, EnforcementTarget, EnforcerContext};
use crate::error::Result;
use crate::metrics;
use crate::states::{ExitStatus, ObservedState, ResourceObserver};
use crate::status::{StatusDiff, StatusProjector};

/// Reconcile a KubegresRestore
pub async fn reconcile(restore: &KubegresRestore, ctx: EnforcerContext<'_>) -> Result<Action> {
    let name = restore.name_any();
    let namespace = restore.namespace().unwrap_or_default();
    let current = restore.current_status();

    if current.is_completed {
        info!(name = %name, "Restore already completed, nothing to do");
        return Ok(Action::await_change());
    }

    let observed = ResourceObserver::new(ctx.store, ctx.config.debug_pods_enabled)
        .observe(restore)
        .await?;
    let check = checker::check(restore, &observed);
    let projected = StatusProjector::project(restore, &observed, &check);
    let projector = StatusProjector::new(ctx.store);

    if let Some(message) = check.message() {
        warn!(name = %name, message = %message, "KubegresRestore spec is invalid");
        metrics::SPEC_CHECK_FAILURES
            .with_label_values(&[&namespace])
            .inc();
        if current.message.as_deref() != Some(message.as_str()) {
            ctx.events
                .publish(EventKind::Warning, reasons::SPEC_CHECK_ERR, message)
                .await;
        }
        let written = projector.persist(restore, &projected).await?;
        record_transitions(&written, &namespace);
        return Ok(Action::await_change());
    }

    let target = EnforcementTarget {
        restore,
        observed: &observed,
        status: &current,
    };
    let outcome = EnforcementPipeline::new(ctx).run(&target).await;
    let diff = projected.merge(outcome.diff);

    let written = projector.persist(restore, &diff).await;
    if let Some(error) = outcome.error {
        if let Err(e) = written {
            warn!(name = %name, error = %e, "Failed to persist status after enforcement error");
        }
        return Err(error);
    }
    let written = written?;
    record_transitions(&written, &namespace);

    let mut status = current;
    diff.apply_to(&mut status);
    Ok(next_action(&status, &observed, ctx.config))
}

fn record_transitions(written: &StatusDiff, namespace: &str) {
    let Some(stage) = written.stage else {
        return;
    };
    metrics::STAGE_TRANSITIONS
        .with_label_values(&[stage.as_str()])
        .inc();
    match stage {
        RestoreStage::RestoreJobCompleted => metrics::RESTORES_TOTAL
            .with_label_values(&["completed", namespace])
            .inc(),
        RestoreStage::RestoreJobFailed => metrics::RESTORES_TOTAL
            .with_label_values(&["failed", namespace])
            .inc(),
        _ => {}
    }
}

/// When to look at the restore again
///
/// Terminal stages and a missing snapshot file wait for a change of the
/// request or of an owned resource; any other stage polls.
pub fn next_action(
    status: &KubegresRestoreStatus,
    observed: &ObservedState,
    config: &OperatorConfig,
) -> Action {
    let terminal = status.is_completed || status.stage == Some(RestoreStage::RestoreJobFailed);
    if terminal || observed.file_checker.exit_status == ExitStatus::FileNotFound {
        Action::await_change()
    } else {
        Action::requeue(config.requeue_interval)
    }
}
