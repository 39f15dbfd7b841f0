//! KubegresRestore Custom Resource Definition

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::ResourceRequirements;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::KubegresSpec;

/// Label placed on a target cluster while a restore manages it
pub const MANAGED_BY_RESTORE_LABEL: &str = "managed-by-kubegres-restore";

/// ConfigMap mounted into the restore job when no custom config is given
pub const BASE_CONFIG_MAP_NAME: &str = "base-kubegres-config";

/// Name of the cluster environment variable holding the superuser password
pub const SUPERUSER_PASSWORD_ENV: &str = "POSTGRES_PASSWORD";

/// Database role the restore job connects as
pub const RESTORE_DATABASE_ROLE: &str = "postgres";

const RESTORE_JOB_SUFFIX: &str = "-job";
const FILE_CHECKER_POD_SUFFIX: &str = "-file-checker";
const DEBUG_POD_SUFFIX: &str = "-debug-";

/// KubegresRestore resource specification
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "kubegres.reactive-tech.io",
    version = "v1",
    kind = "KubegresRestore",
    plural = "kubegresrestores",
    singular = "kubegresrestore",
    shortname = "kgr",
    namespaced,
    status = "KubegresRestoreStatus",
    printcolumn = r#"{"name": "Stage", "type": "string", "jsonPath": ".status.stage"}"#,
    printcolumn = r#"{"name": "Completed", "type": "boolean", "jsonPath": ".status.isCompleted"}"#,
    printcolumn = r#"{"name": "Cluster", "type": "string", "jsonPath": ".spec.clusterName"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KubegresRestoreSpec {
    /// Where the snapshot lives and which cluster to use as template
    #[serde(default)]
    pub data_source: DataSource,

    /// ConfigMap mounted into the restore job (defaults to the base Kubegres config)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_config: Option<String>,

    /// Resources of the target cluster while the restore runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    /// Name of the Kubegres cluster to create and restore into
    #[serde(default)]
    pub cluster_name: String,

    /// Database the snapshot is restored into
    #[serde(default)]
    pub database_name: String,

    /// Number of debug pods mounting the snapshot PVC
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_pods: Option<i32>,
}

/// Data source of a restore
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DataSource {
    /// Snapshot file stored in a PVC
    #[serde(default)]
    pub file: FileSource,

    /// Template for the target cluster
    #[serde(default)]
    pub cluster: ClusterSource,
}

/// Snapshot file location
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileSource {
    /// PVC holding the snapshot
    #[serde(default)]
    pub pvc_name: String,

    /// Where the PVC is mounted in the file checker and restore job
    #[serde(default)]
    pub mount_path: String,

    /// Snapshot file name relative to the mount path
    #[serde(default)]
    pub snapshot: String,
}

/// Template for the target cluster: an existing cluster or an inline spec
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSource {
    /// Existing Kubegres cluster whose spec is copied
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster_name: String,

    /// Inline Kubegres spec
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_spec: Option<KubegresSpec>,
}

/// Restore progress stage
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum RestoreStage {
    CheckingSnapshotFile,
    DeployingCluster,
    WaitingForCluster,
    RestoreJobDeploying,
    RestoreJobRunning,
    RestoreJobCompleted,
    RestoreJobFailed,
}

impl RestoreStage {
    /// Stage label as persisted in status
    pub fn as_str(&self) -> &'static str {
        match self {
            RestoreStage::CheckingSnapshotFile => "CheckingSnapshotFile",
            RestoreStage::DeployingCluster => "DeployingCluster",
            RestoreStage::WaitingForCluster => "WaitingForCluster",
            RestoreStage::RestoreJobDeploying => "RestoreJobDeploying",
            RestoreStage::RestoreJobRunning => "RestoreJobRunning",
            RestoreStage::RestoreJobCompleted => "RestoreJobCompleted",
            RestoreStage::RestoreJobFailed => "RestoreJobFailed",
        }
    }
}

impl std::fmt::Display for RestoreStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// KubegresRestore status
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KubegresRestoreStatus {
    /// Whether the restore finished and the cluster was released
    #[serde(default)]
    pub is_completed: bool,

    /// Current stage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<RestoreStage>,

    /// Last reported problem, cleared once resolved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// When the stage last changed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage_transition_time: Option<DateTime<Utc>>,
}

impl KubegresRestore {
    /// Name of the one-shot restore job
    pub fn restore_job_name(&self) -> String {
        format!("{}{}", self.name_any(), RESTORE_JOB_SUFFIX)
    }

    /// Name of the snapshot file checker pod
    pub fn file_checker_pod_name(&self) -> String {
        format!("{}{}", self.name_any(), FILE_CHECKER_POD_SUFFIX)
    }

    /// Name prefix of generated debug pods
    pub fn debug_pod_name_prefix(&self) -> String {
        format!("{}{}", self.name_any(), DEBUG_POD_SUFFIX)
    }

    /// Label selector matching this restore's debug pods
    pub fn debug_pod_selector(&self) -> String {
        format!("app={},role=debug", self.name_any())
    }

    /// Full path of the snapshot inside the mounted PVC
    pub fn snapshot_path(&self) -> String {
        let file = &self.spec.data_source.file;
        join_path(&file.mount_path, &file.snapshot)
    }

    /// Custom config name, if one is set
    pub fn custom_config_name(&self) -> Option<&str> {
        self.spec
            .custom_config
            .as_deref()
            .filter(|name| !name.is_empty())
    }

    /// Whether the target cluster spec is copied from an existing cluster
    pub fn restores_from_existing_cluster(&self) -> bool {
        !self.spec.data_source.cluster.cluster_name.is_empty()
    }

    /// Current status, or the default empty one
    pub fn current_status(&self) -> KubegresRestoreStatus {
        self.status.clone().unwrap_or_default()
    }
}

/// Join a mount path and a file name with a single separator
pub fn join_path(base: &str, file: &str) -> String {
    if base.is_empty() {
        return file.to_string();
    }
    let base = base.trim_end_matches('/');
    let file = file.trim_start_matches('/');
    if file.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_path_handles_trailing_and_leading_slashes() {
        assert_eq!(join_path("/backup", "dump.sql"), "/backup/dump.sql");
        assert_eq!(join_path("/backup/", "dump.sql"), "/backup/dump.sql");
        assert_eq!(join_path("/backup", "/dump.sql"), "/backup/dump.sql");
        assert_eq!(join_path("/backup", ""), "/backup");
    }

    #[test]
    fn stage_serializes_as_its_label() {
        let json = serde_json::to_string(&RestoreStage::WaitingForCluster).unwrap();
        assert_eq!(json, "\"WaitingForCluster\"");
    }
}
