//! Kubegres Custom Resource Definition (subset used by the restore operator)
//!
//! The Kubegres CRD is owned by the Kubegres operator. Only the fields a restore
//! needs to copy from a source cluster or to adjust during finalization are
//! modelled here.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{EnvVar, LocalObjectReference, ResourceRequirements};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Kubegres cluster specification
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "kubegres.reactive-tech.io",
    version = "v1",
    kind = "Kubegres",
    plural = "kubegres",
    singular = "kubegres",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct KubegresSpec {
    /// Number of PostgreSQL instances (primary + replicas)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// PostgreSQL container image
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,

    /// PostgreSQL port
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,

    /// Image pull secrets
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_pull_secrets: Vec<LocalObjectReference>,

    /// Name of a ConfigMap overriding the base Kubegres configuration
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub custom_config: String,

    /// Database storage
    #[serde(default)]
    pub database: KubegresDatabase,

    /// Scheduled backup configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<KubegresBackup>,

    /// Failover configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failover: Option<KubegresFailover>,

    /// Container resources
    #[serde(default)]
    pub resources: ResourceRequirements,

    /// Environment variables (the superuser password lives here)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
}

/// Kubegres database storage
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KubegresDatabase {
    /// Size of each instance volume, e.g. "8Gi"
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub size: String,

    /// Storage class of each instance volume
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,

    /// Where the data volume is mounted in the PostgreSQL container
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub volume_mount: String,
}

/// Kubegres scheduled backup
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KubegresBackup {
    /// Cron schedule
    #[serde(default)]
    pub schedule: String,

    /// Mount path of the backup volume
    #[serde(default)]
    pub volume_mount: String,

    /// PVC receiving backups
    #[serde(default)]
    pub pvc_name: String,
}

/// Kubegres failover settings
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KubegresFailover {
    /// Disable automatic failover
    #[serde(default)]
    pub is_disabled: bool,

    /// Pod to promote manually
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub promote_pod: String,
}

impl KubegresSpec {
    /// Find an environment variable by name
    pub fn env_var(&self, name: &str) -> Option<&EnvVar> {
        self.env.iter().find(|env| env.name == name)
    }
}

/// Whether a resource requirements block actually requests anything
pub fn has_resources(resources: &ResourceRequirements) -> bool {
    let non_empty = |map: &Option<BTreeMap<String, Quantity>>| {
        map.as_ref().map(|m| !m.is_empty()).unwrap_or(false)
    };
    non_empty(&resources.requests)
        || non_empty(&resources.limits)
        || resources.claims.as_ref().map(|c| !c.is_empty()).unwrap_or(false)
}
