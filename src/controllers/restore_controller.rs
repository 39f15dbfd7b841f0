//! KubegresRestore controller
//!
//! Watches KubegresRestore resources and the Jobs and Pods they own, and
//! triggers reconciliation.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Pod;
use kube::{
    api::ListParams,
    runtime::{
        controller::{Action, Controller},
        watcher::Config as WatcherConfig,
    },
    Api, Client, Resource, ResourceExt,
};
use tracing::{error, info, instrument};

use crate::adapters::{KubeEventSink, KubeStore};
use crate::controllers::Context;
use crate::crd::KubegresRestore;
use crate::enforcers::EnforcerContext;
use crate::error::{Error, Result};
use crate::metrics;
use crate::reconcilers::restore as restore_reconciler;

const KIND: &str = "KubegresRestore";

/// Run the KubegresRestore controller
pub async fn run(client: Client, context: Arc<Context>) {
    let api: Api<KubegresRestore> = Api::all(client.clone());

    if let Err(e) = api.list(&ListParams::default().limit(1)).await {
        error!("KubegresRestore CRD not installed: {}", e);
        return;
    }

    info!("Starting KubegresRestore controller");

    Controller::new(api, WatcherConfig::default())
        .owns(Api::<Job>::all(client.clone()), WatcherConfig::default())
        .owns(Api::<Pod>::all(client), WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((obj, action)) => {
                    info!(
                        name = %obj.name,
                        namespace = obj.namespace.as_deref().unwrap_or("default"),
                        ?action,
                        "Reconciled KubegresRestore"
                    );
                }
                Err(e) => {
                    error!(error = %e, "Reconciliation error");
                    metrics::RECONCILIATION_ERRORS.with_label_values(&[KIND]).inc();
                }
            }
        })
        .await;
}

/// Main reconciliation function
#[instrument(skip(obj, ctx), fields(name = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile(obj: Arc<KubegresRestore>, ctx: Arc<Context>) -> Result<Action> {
    let _timer = metrics::RECONCILE_DURATION
        .with_label_values(&[KIND])
        .start_timer();
    metrics::RECONCILIATIONS.with_label_values(&[KIND]).inc();

    let namespace = obj
        .namespace()
        .ok_or_else(|| Error::validation("KubegresRestore resources must be namespaced"))?;

    let store = KubeStore::new(ctx.client.clone(), namespace);
    let events = KubeEventSink::new(ctx.client.clone(), obj.object_ref(&()));
    let enforcer_ctx = EnforcerContext {
        store: &store,
        events: &events,
        config: &ctx.config,
    };

    restore_reconciler::reconcile(&obj, enforcer_ctx).await
}

/// Error policy for the controller
fn error_policy(obj: Arc<KubegresRestore>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        name = %obj.name_any(),
        error = %error,
        "Reconciliation failed, scheduling retry"
    );
    Action::requeue(retry_delay(error))
}

/// Delay before retrying a failed reconciliation
pub fn retry_delay(error: &Error) -> Duration {
    match error.root() {
        Error::Conflict(_) => Duration::from_secs(1),
        Error::Config(_) | Error::Validation(_) => Duration::from_secs(300),
        _ => Duration::from_secs(30),
    }
}
