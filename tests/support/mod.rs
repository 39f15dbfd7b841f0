//! Shared fixtures for the integration tests
//!
//! `FakeStore` is an in-memory `ResourceStore` recording every mutation, and
//! `RecordingEvents` an `EventSink` keeping published events.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetStatus};
use k8s_openapi::api::batch::v1::{Job, JobStatus};
use k8s_openapi::api::core::v1::{
    ConfigMap, ContainerState, ContainerStateTerminated, ContainerStatus, EnvVar,
    PersistentVolumeClaim, Pod, PodStatus, Service,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference, Time};
use kube::runtime::controller::Action;
use kube::ResourceExt;
use serde_json::json;

use kubegres_restore_operator::adapters::{EventKind, EventSink, Lookup, ResourceStore};
use kubegres_restore_operator::config::OperatorConfig;
use kubegres_restore_operator::crd::{
    ClusterSource, DataSource, FileSource, Kubegres, KubegresRestore, KubegresRestoreSpec,
    KubegresSpec,
};
use kubegres_restore_operator::enforcers::EnforcerContext;
use kubegres_restore_operator::reconcilers::restore;
use kubegres_restore_operator::{Error, Result};

pub const NAMESPACE: &str = "default";
pub const RESTORE_NAME: &str = "restore1";
pub const RESTORE_UID: &str = "restore-uid";
pub const TARGET_CLUSTER: &str = "db1";
pub const SOURCE_CLUSTER: &str = "source-db";
pub const PVC: &str = "pvc1";

// ============================================================================
// Fake resource store
// ============================================================================

/// A mutation issued against the fake store
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mutation {
    CreatePod(String),
    DeletePod(String),
    CreateJob(String),
    CreateCluster(String),
    ReplaceCluster(String),
    ReplaceRestoreStatus(String),
}

impl Mutation {
    /// Whether the mutation changes a dependent resource rather than status
    pub fn is_resource_change(&self) -> bool {
        !matches!(self, Mutation::ReplaceRestoreStatus(_))
    }
}

#[derive(Default)]
struct State {
    pods: BTreeMap<String, Pod>,
    jobs: BTreeMap<String, Job>,
    pvcs: BTreeMap<String, PersistentVolumeClaim>,
    config_maps: BTreeMap<String, ConfigMap>,
    clusters: BTreeMap<String, Kubegres>,
    stateful_sets: Vec<StatefulSet>,
    services: Vec<Service>,
    restores: BTreeMap<String, KubegresRestore>,
    mutations: Vec<Mutation>,
    failing: Vec<&'static str>,
    next_id: u32,
}

impl State {
    fn check_failure(&mut self, op: &'static str, name: &str) -> Result<()> {
        if let Some(pos) = self.failing.iter().position(|f| *f == op) {
            self.failing.remove(pos);
            return Err(Error::Conflict(format!("{} {}", op, name)));
        }
        Ok(())
    }

    /// Assign server side metadata to a created object
    fn admit(&mut self, meta: &mut ObjectMeta) {
        self.next_id += 1;
        if meta.name.is_none() {
            let prefix = meta.generate_name.clone().unwrap_or_default();
            meta.name = Some(format!("{}{:05}", prefix, self.next_id));
        }
        meta.uid = Some(format!("uid-{}", self.next_id));
        meta.resource_version = Some("1".to_string());
        meta.creation_timestamp = Some(Time(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
                + chrono::Duration::seconds(i64::from(self.next_id)),
        ));
    }
}

fn bump_version(meta: &mut ObjectMeta) {
    let version: u64 = meta
        .resource_version
        .as_deref()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    meta.resource_version = Some((version + 1).to_string());
}

fn matches_selector(meta: &ObjectMeta, selector: &str) -> bool {
    let labels = meta.labels.clone().unwrap_or_default();
    selector.split(',').filter(|s| !s.is_empty()).all(|pair| {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        labels.get(key).map(String::as_str) == Some(value)
    })
}

/// In-memory resource store of one namespace
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<State>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Mutations issued so far
    pub fn mutations(&self) -> Vec<Mutation> {
        self.state().mutations.clone()
    }

    /// Mutations of dependent resources, ignoring status writes
    pub fn resource_mutations(&self) -> Vec<Mutation> {
        self.mutations()
            .into_iter()
            .filter(Mutation::is_resource_change)
            .collect()
    }

    pub fn clear_mutations(&self) {
        self.state().mutations.clear();
    }

    /// Make the next call of `op` fail with a conflict
    pub fn fail_next(&self, op: &'static str) {
        self.state().failing.push(op);
    }

    pub fn add_pvc(&self, name: &str) {
        let pvc = PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(NAMESPACE.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        self.state().pvcs.insert(name.to_string(), pvc);
    }

    pub fn add_config_map(&self, name: &str) {
        let config_map = ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(NAMESPACE.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        self.state().config_maps.insert(name.to_string(), config_map);
    }

    /// Add a cluster without recording a mutation
    pub fn add_cluster(&self, mut cluster: Kubegres) {
        let mut state = self.state();
        state.admit(&mut cluster.metadata);
        state.clusters.insert(cluster.name_any(), cluster);
    }

    /// Store a restore request, returning the stored copy with its version
    pub fn add_restore(&self, mut restore: KubegresRestore) -> KubegresRestore {
        restore.metadata.resource_version = Some("1".to_string());
        self.state()
            .restores
            .insert(restore.name_any(), restore.clone());
        restore
    }

    /// Change the spec of a stored restore, as a user edit would
    pub fn edit_restore(
        &self,
        name: &str,
        edit: impl FnOnce(&mut KubegresRestoreSpec),
    ) -> KubegresRestore {
        let mut state = self.state();
        let restore = state.restores.get_mut(name).expect("restore exists");
        edit(&mut restore.spec);
        bump_version(&mut restore.metadata);
        restore.clone()
    }

    pub fn pod(&self, name: &str) -> Option<Pod> {
        self.state().pods.get(name).cloned()
    }

    pub fn pods(&self) -> Vec<Pod> {
        self.state().pods.values().cloned().collect()
    }

    pub fn job(&self, name: &str) -> Option<Job> {
        self.state().jobs.get(name).cloned()
    }

    pub fn cluster(&self, name: &str) -> Option<Kubegres> {
        self.state().clusters.get(name).cloned()
    }

    pub fn restore(&self, name: &str) -> Option<KubegresRestore> {
        self.state().restores.get(name).cloned()
    }

    /// Terminate the first container of a pod with an exit code and message
    pub fn terminate_pod(&self, name: &str, exit_code: i32, message: Option<&str>) {
        let mut state = self.state();
        let pod = state.pods.get_mut(name).expect("pod exists");
        pod.status = Some(PodStatus {
            container_statuses: Some(vec![ContainerStatus {
                name: "file-checker".to_string(),
                state: Some(ContainerState {
                    terminated: Some(ContainerStateTerminated {
                        exit_code,
                        message: message.map(str::to_string),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            ..Default::default()
        });
    }

    /// Flag a pod as terminating
    pub fn mark_pod_deleting(&self, name: &str) {
        let mut state = self.state();
        let pod = state.pods.get_mut(name).expect("pod exists");
        pod.metadata.deletion_timestamp = Some(Time(Utc::now()));
    }

    /// Set the counters of a job
    pub fn set_job_status(&self, name: &str, active: i32, succeeded: i32, failed: i32) {
        let mut state = self.state();
        let job = state.jobs.get_mut(name).expect("job exists");
        job.status = Some(JobStatus {
            active: Some(active),
            succeeded: Some(succeeded),
            failed: Some(failed),
            ..Default::default()
        });
    }

    /// Add the primary StatefulSet and Service Kubegres creates for a cluster
    pub fn make_cluster_ready(&self, cluster_name: &str) {
        let mut state = self.state();
        let uid = state
            .clusters
            .get(cluster_name)
            .and_then(|c| c.uid())
            .expect("cluster exists");
        let meta = ObjectMeta {
            name: Some(format!("{}-1", cluster_name)),
            namespace: Some(NAMESPACE.to_string()),
            labels: Some(BTreeMap::from([
                ("app".to_string(), cluster_name.to_string()),
                ("replicationRole".to_string(), "primary".to_string()),
            ])),
            owner_references: Some(vec![OwnerReference {
                api_version: "kubegres.reactive-tech.io/v1".to_string(),
                kind: "Kubegres".to_string(),
                name: cluster_name.to_string(),
                uid,
                ..Default::default()
            }]),
            ..Default::default()
        };
        state.stateful_sets.push(StatefulSet {
            metadata: meta.clone(),
            status: Some(StatefulSetStatus {
                ready_replicas: Some(1),
                replicas: 1,
                ..Default::default()
            }),
            ..Default::default()
        });
        state.services.push(Service {
            metadata: meta,
            ..Default::default()
        });
    }
}

#[async_trait]
impl ResourceStore for FakeStore {
    async fn get_pod(&self, name: &str) -> Result<Lookup<Pod>> {
        Ok(self.state().pods.get(name).cloned().into())
    }

    async fn list_pods(&self, selector: &str) -> Result<Vec<Pod>> {
        Ok(self
            .state()
            .pods
            .values()
            .filter(|pod| matches_selector(&pod.metadata, selector))
            .cloned()
            .collect())
    }

    async fn create_pod(&self, pod: &Pod) -> Result<Pod> {
        let mut state = self.state();
        state.check_failure("create_pod", &pod.name_any())?;
        let mut pod = pod.clone();
        state.admit(&mut pod.metadata);
        let name = pod.name_any();
        if state.pods.contains_key(&name) {
            return Err(Error::Conflict(format!("pod {} already exists", name)));
        }
        state.mutations.push(Mutation::CreatePod(name.clone()));
        state.pods.insert(name, pod.clone());
        Ok(pod)
    }

    async fn delete_pod(&self, name: &str) -> Result<()> {
        let mut state = self.state();
        state.check_failure("delete_pod", name)?;
        state.mutations.push(Mutation::DeletePod(name.to_string()));
        state.pods.remove(name);
        Ok(())
    }

    async fn get_job(&self, name: &str) -> Result<Lookup<Job>> {
        Ok(self.state().jobs.get(name).cloned().into())
    }

    async fn create_job(&self, job: &Job) -> Result<Job> {
        let mut state = self.state();
        state.check_failure("create_job", &job.name_any())?;
        let mut job = job.clone();
        state.admit(&mut job.metadata);
        let name = job.name_any();
        state.mutations.push(Mutation::CreateJob(name.clone()));
        state.jobs.insert(name, job.clone());
        Ok(job)
    }

    async fn get_pvc(&self, name: &str) -> Result<Lookup<PersistentVolumeClaim>> {
        Ok(self.state().pvcs.get(name).cloned().into())
    }

    async fn get_config_map(&self, name: &str) -> Result<Lookup<ConfigMap>> {
        Ok(self.state().config_maps.get(name).cloned().into())
    }

    async fn get_cluster(&self, name: &str) -> Result<Lookup<Kubegres>> {
        Ok(self.state().clusters.get(name).cloned().into())
    }

    async fn create_cluster(&self, cluster: &Kubegres) -> Result<Kubegres> {
        let mut state = self.state();
        state.check_failure("create_cluster", &cluster.name_any())?;
        let mut cluster = cluster.clone();
        state.admit(&mut cluster.metadata);
        let name = cluster.name_any();
        state.mutations.push(Mutation::CreateCluster(name.clone()));
        state.clusters.insert(name, cluster.clone());
        Ok(cluster)
    }

    async fn replace_cluster(&self, cluster: &Kubegres) -> Result<Kubegres> {
        let mut state = self.state();
        let name = cluster.name_any();
        state.check_failure("replace_cluster", &name)?;
        let stored_version = state
            .clusters
            .get(&name)
            .and_then(|c| c.resource_version());
        if stored_version != cluster.resource_version() {
            return Err(Error::Conflict(format!("Kubegres {}", name)));
        }
        let mut cluster = cluster.clone();
        bump_version(&mut cluster.metadata);
        state.mutations.push(Mutation::ReplaceCluster(name.clone()));
        state.clusters.insert(name, cluster.clone());
        Ok(cluster)
    }

    async fn list_stateful_sets(&self, selector: &str) -> Result<Vec<StatefulSet>> {
        Ok(self
            .state()
            .stateful_sets
            .iter()
            .filter(|set| matches_selector(&set.metadata, selector))
            .cloned()
            .collect())
    }

    async fn list_services(&self, selector: &str) -> Result<Vec<Service>> {
        Ok(self
            .state()
            .services
            .iter()
            .filter(|svc| matches_selector(&svc.metadata, selector))
            .cloned()
            .collect())
    }

    async fn replace_restore_status(&self, restore: &KubegresRestore) -> Result<KubegresRestore> {
        let mut state = self.state();
        let name = restore.name_any();
        state.check_failure("replace_restore_status", &name)?;
        if let Some(stored) = state.restores.get(&name) {
            if stored.resource_version() != restore.resource_version() {
                return Err(Error::Conflict(format!("KubegresRestore {}", name)));
            }
        }
        let mut restore = restore.clone();
        bump_version(&mut restore.metadata);
        state
            .mutations
            .push(Mutation::ReplaceRestoreStatus(name.clone()));
        state.restores.insert(name, restore.clone());
        Ok(restore)
    }
}

// ============================================================================
// Recording event sink
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedEvent {
    pub kind: EventKind,
    pub reason: String,
    pub note: String,
}

#[derive(Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn with_reason(&self, reason: &str) -> Vec<RecordedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.reason == reason)
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

#[async_trait]
impl EventSink for RecordingEvents {
    async fn publish(&self, kind: EventKind, reason: &str, note: String) {
        self.events.lock().unwrap().push(RecordedEvent {
            kind,
            reason: reason.to_string(),
            note,
        });
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn password_env() -> EnvVar {
    serde_json::from_value(json!({
        "name": "POSTGRES_PASSWORD",
        "valueFrom": {
            "secretKeyRef": { "name": "db-secret", "key": "superUserPassword" }
        }
    }))
    .unwrap()
}

pub fn cluster_spec(replicas: i32) -> KubegresSpec {
    KubegresSpec {
        replicas: Some(replicas),
        image: "postgres:16.1".to_string(),
        port: Some(5432),
        env: vec![password_env()],
        ..Default::default()
    }
}

/// A source cluster running with `replicas` instances
pub fn source_cluster(replicas: i32) -> Kubegres {
    let mut cluster = Kubegres::new(SOURCE_CLUSTER, cluster_spec(replicas));
    cluster.metadata.namespace = Some(NAMESPACE.to_string());
    cluster
}

/// A restore of `/backup/dump.sql` from `pvc1` into database `app` of cluster
/// `db1`, copying the spec of `source-db`
pub fn restore_request() -> KubegresRestore {
    let mut restore = KubegresRestore::new(
        RESTORE_NAME,
        KubegresRestoreSpec {
            data_source: DataSource {
                file: FileSource {
                    pvc_name: PVC.to_string(),
                    mount_path: "/backup".to_string(),
                    snapshot: "dump.sql".to_string(),
                },
                cluster: ClusterSource {
                    cluster_name: SOURCE_CLUSTER.to_string(),
                    cluster_spec: None,
                },
            },
            cluster_name: TARGET_CLUSTER.to_string(),
            database_name: "app".to_string(),
            ..Default::default()
        },
    );
    restore.metadata.namespace = Some(NAMESPACE.to_string());
    restore.metadata.uid = Some(RESTORE_UID.to_string());
    restore
}

/// A store holding the snapshot PVC and a source cluster of three instances
pub fn populated_store() -> FakeStore {
    let store = FakeStore::new();
    store.add_pvc(PVC);
    store.add_cluster(source_cluster(3));
    store
}

/// Test harness running reconciliations the way the controller does
pub struct Harness {
    pub store: FakeStore,
    pub events: RecordingEvents,
    pub config: OperatorConfig,
    pub restore: KubegresRestore,
}

impl Harness {
    pub fn new(restore: KubegresRestore) -> Self {
        Self::with_store(populated_store(), restore)
    }

    pub fn with_store(store: FakeStore, restore: KubegresRestore) -> Self {
        let restore = store.add_restore(restore);
        Self {
            store,
            events: RecordingEvents::new(),
            config: OperatorConfig::default(),
            restore,
        }
    }

    pub fn ctx(&self) -> EnforcerContext<'_> {
        EnforcerContext {
            store: &self.store,
            events: &self.events,
            config: &self.config,
        }
    }

    /// Reconcile once and pick up the status written by the reconciliation
    pub async fn reconcile(&mut self) -> Result<Action> {
        let result = restore::reconcile(&self.restore, self.ctx()).await;
        if let Some(updated) = self.store.restore(&self.restore.name_any()) {
            self.restore = updated;
        }
        result
    }

    /// Edit the request and pick up the edited copy
    pub fn edit_request(&mut self, edit: impl FnOnce(&mut KubegresRestoreSpec)) {
        self.restore = self.store.edit_restore(&self.restore.name_any(), edit);
    }

    pub fn file_checker_name(&self) -> String {
        self.restore.file_checker_pod_name()
    }

    pub fn job_name(&self) -> String {
        self.restore.restore_job_name()
    }

    /// Drive the restore until the restore job is deployed
    pub async fn run_until_job_deployed(&mut self) {
        self.reconcile().await.unwrap();
        self.store
            .terminate_pod(&self.file_checker_name(), 0, None);
        self.reconcile().await.unwrap();
        self.store.make_cluster_ready(TARGET_CLUSTER);
        self.reconcile().await.unwrap();
        assert!(self.store.job(&self.job_name()).is_some());
    }
}
