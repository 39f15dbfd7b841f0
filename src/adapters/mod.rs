//! Adapters between the restore reconciler and the Kubernetes API
//!
//! The reconciler core only talks to the narrow [`ResourceStore`] and
//! [`EventSink`] traits. [`KubeStore`] and [`KubeEventSink`] implement them on
//! top of a `kube::Client`; tests provide in-memory implementations.

mod events;
mod kube_store;

pub use events::*;
pub use kube_store::*;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Pod, Service};

use crate::crd::{Kubegres, KubegresRestore};
use crate::error::Result;

/// Outcome of reading a single named resource
///
/// Absence is a normal answer, distinct from API failures which travel in the
/// surrounding `Result`.
#[derive(Clone, Debug, PartialEq)]
pub enum Lookup<T> {
    Found(T),
    Absent,
}

impl<T> Lookup<T> {
    /// Convert into an `Option`
    pub fn into_option(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::Absent => None,
        }
    }

    /// Whether the resource exists
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }
}

impl<T> From<Option<T>> for Lookup<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Lookup::Found(value),
            None => Lookup::Absent,
        }
    }
}

/// Read/write access to the resources of one namespace
///
/// Updates carry the object's `resourceVersion`; a concurrent modification
/// surfaces as [`crate::Error::Conflict`].
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Get a pod by name
    async fn get_pod(&self, name: &str) -> Result<Lookup<Pod>>;

    /// List pods matching a label selector
    async fn list_pods(&self, selector: &str) -> Result<Vec<Pod>>;

    /// Create a pod
    async fn create_pod(&self, pod: &Pod) -> Result<Pod>;

    /// Delete a pod; deleting an absent pod succeeds
    async fn delete_pod(&self, name: &str) -> Result<()>;

    /// Get a job by name
    async fn get_job(&self, name: &str) -> Result<Lookup<Job>>;

    /// Create a job
    async fn create_job(&self, job: &Job) -> Result<Job>;

    /// Get a persistent volume claim by name
    async fn get_pvc(&self, name: &str) -> Result<Lookup<PersistentVolumeClaim>>;

    /// Get a config map by name
    async fn get_config_map(&self, name: &str) -> Result<Lookup<ConfigMap>>;

    /// Get a Kubegres cluster by name
    async fn get_cluster(&self, name: &str) -> Result<Lookup<Kubegres>>;

    /// Create a Kubegres cluster
    async fn create_cluster(&self, cluster: &Kubegres) -> Result<Kubegres>;

    /// Replace a Kubegres cluster (version checked)
    async fn replace_cluster(&self, cluster: &Kubegres) -> Result<Kubegres>;

    /// List stateful sets matching a label selector
    async fn list_stateful_sets(&self, selector: &str) -> Result<Vec<StatefulSet>>;

    /// List services matching a label selector
    async fn list_services(&self, selector: &str) -> Result<Vec<Service>>;

    /// Replace the status subresource of a restore (version checked)
    async fn replace_restore_status(&self, restore: &KubegresRestore) -> Result<KubegresRestore>;
}

/// Kubernetes event type
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Normal,
    Warning,
}

/// Publishes events about the restore being reconciled
///
/// Publishing is fire-and-forget: failures are logged, never returned.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Publish an event with a machine readable reason and a human readable note
    async fn publish(&self, kind: EventKind, reason: &str, note: String);
}
