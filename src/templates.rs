//! Resource templates rendered from a KubegresRestore
//!
//! Every object created for a restore, except the target cluster, carries a
//! controller owner reference to the restore so it is garbage collected with it.

use std::collections::BTreeMap;

use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, EnvVar, PersistentVolumeClaimVolumeSource, Pod, PodSpec,
    PodTemplateSpec, ResourceRequirements, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};
use tracing::warn;

use crate::config::OperatorConfig;
use crate::crd::{
    has_resources, Kubegres, KubegresRestore, KubegresSpec, BASE_CONFIG_MAP_NAME,
    MANAGED_BY_RESTORE_LABEL, RESTORE_DATABASE_ROLE, SUPERUSER_PASSWORD_ENV,
};
use crate::error::{Error, Result};

/// Environment variable holding the snapshot path in checker and job containers
pub const SNAPSHOT_PATH_ENV: &str = "SNAPSHOT_PATH";

const SNAPSHOT_VOLUME: &str = "snapshot";
const CONFIG_VOLUME: &str = "restore-config";
const CONFIG_MOUNT_PATH: &str = "/etc/restore-config";

const FILE_CHECKER_SCRIPT: &str = r#"if [ -f "$SNAPSHOT_PATH" ]; then exit 0; fi
ls -1t "$(dirname "$SNAPSHOT_PATH")" 2>/dev/null | head -n 5 > /dev/termination-log
exit 1"#;

/// Key of the restore ConfigMap replacing the default `psql` invocation
pub const RESTORE_SCRIPT_KEY: &str = "restore.sh";

// A `restore.sh` provided by the mounted ConfigMap runs instead of psql, with
// the database name as its only argument.
const RESTORE_SCRIPT: &str = r#"export PGPASSWORD="$POSTGRES_PASSWORD"
if [ -f /etc/restore-config/restore.sh ]; then
  exec sh /etc/restore-config/restore.sh "$1"
fi
psql -v ON_ERROR_STOP=1 -h "$CLUSTER_NAME" -U "$DB_USER" -d "$1" -f "$SNAPSHOT_PATH""#;

fn owner_reference(restore: &KubegresRestore) -> Result<OwnerReference> {
    restore.controller_owner_ref(&()).ok_or_else(|| {
        Error::template(format!(
            "KubegresRestore {} has no uid, cannot own resources",
            restore.name_any()
        ))
    })
}

fn labels(restore: &KubegresRestore, role: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app".to_string(), restore.name_any()),
        ("role".to_string(), role.to_string()),
    ])
}

fn snapshot_volume(restore: &KubegresRestore) -> Volume {
    Volume {
        name: SNAPSHOT_VOLUME.to_string(),
        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
            claim_name: restore.spec.data_source.file.pvc_name.clone(),
            read_only: Some(true),
        }),
        ..Default::default()
    }
}

fn snapshot_mount(restore: &KubegresRestore) -> VolumeMount {
    VolumeMount {
        name: SNAPSHOT_VOLUME.to_string(),
        mount_path: restore.spec.data_source.file.mount_path.clone(),
        read_only: Some(true),
        ..Default::default()
    }
}

fn env_value(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        value_from: None,
    }
}

/// Pod testing whether the snapshot file exists in the PVC
///
/// Layout read back when detecting spec changes: `volumes[0]` is the PVC,
/// `containers[0].volume_mounts[0]` its mount and `containers[0].env[0]` the
/// snapshot path.
pub fn file_checker_pod(restore: &KubegresRestore, config: &OperatorConfig) -> Result<Pod> {
    Ok(Pod {
        metadata: ObjectMeta {
            name: Some(restore.file_checker_pod_name()),
            namespace: restore.namespace(),
            labels: Some(labels(restore, "file-checker")),
            owner_references: Some(vec![owner_reference(restore)?]),
            ..Default::default()
        },
        spec: Some(PodSpec {
            restart_policy: Some("Never".to_string()),
            volumes: Some(vec![snapshot_volume(restore)]),
            containers: vec![Container {
                name: "file-checker".to_string(),
                image: Some(config.file_checker_image.clone()),
                command: Some(vec![
                    "sh".to_string(),
                    "-c".to_string(),
                    FILE_CHECKER_SCRIPT.to_string(),
                ]),
                env: Some(vec![env_value(SNAPSHOT_PATH_ENV, restore.snapshot_path())]),
                volume_mounts: Some(vec![snapshot_mount(restore)]),
                termination_message_path: Some("/dev/termination-log".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Diagnostic pod mounting the snapshot PVC
pub fn debug_pod(restore: &KubegresRestore, config: &OperatorConfig) -> Result<Pod> {
    Ok(Pod {
        metadata: ObjectMeta {
            generate_name: Some(restore.debug_pod_name_prefix()),
            namespace: restore.namespace(),
            labels: Some(labels(restore, "debug")),
            owner_references: Some(vec![owner_reference(restore)?]),
            ..Default::default()
        },
        spec: Some(PodSpec {
            restart_policy: Some("Always".to_string()),
            volumes: Some(vec![snapshot_volume(restore)]),
            containers: vec![Container {
                name: "debug".to_string(),
                image: Some(config.debug_pod_image.clone()),
                command: Some(vec!["sleep".to_string(), "infinity".to_string()]),
                env: Some(vec![env_value(SNAPSHOT_PATH_ENV, restore.snapshot_path())]),
                volume_mounts: Some(vec![snapshot_mount(restore)]),
                ..Default::default()
            }],
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Superuser password reference copied from the cluster's environment
///
/// A missing variable yields an entry without a source.
fn superuser_password_env(cluster_spec: &KubegresSpec) -> EnvVar {
    match cluster_spec.env_var(SUPERUSER_PASSWORD_ENV) {
        Some(env) => EnvVar {
            name: SUPERUSER_PASSWORD_ENV.to_string(),
            value: None,
            value_from: env.value_from.clone(),
        },
        None => {
            warn!(
                env = SUPERUSER_PASSWORD_ENV,
                "Target cluster defines no superuser password variable, restore job will run without it"
            );
            EnvVar {
                name: SUPERUSER_PASSWORD_ENV.to_string(),
                ..Default::default()
            }
        }
    }
}

/// One-shot job restoring the snapshot into the target cluster
///
/// `volumes[0]` is the snapshot PVC and `volumes[1]` the restore ConfigMap.
/// The container environment is, in order: superuser password reference,
/// database role, target cluster name, snapshot path.
pub fn restore_job(
    restore: &KubegresRestore,
    cluster_spec: &KubegresSpec,
    config: &OperatorConfig,
) -> Result<Job> {
    let config_map = restore
        .custom_config_name()
        .unwrap_or(BASE_CONFIG_MAP_NAME)
        .to_string();
    let image = if cluster_spec.image.is_empty() {
        config.restore_job_image.clone()
    } else {
        cluster_spec.image.clone()
    };

    Ok(Job {
        metadata: ObjectMeta {
            name: Some(restore.restore_job_name()),
            namespace: restore.namespace(),
            labels: Some(labels(restore, "restore-job")),
            owner_references: Some(vec![owner_reference(restore)?]),
            ..Default::default()
        },
        spec: Some(JobSpec {
            backoff_limit: Some(0),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels(restore, "restore-job")),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    restart_policy: Some("Never".to_string()),
                    image_pull_secrets: Some(cluster_spec.image_pull_secrets.clone())
                        .filter(|secrets| !secrets.is_empty()),
                    volumes: Some(vec![
                        snapshot_volume(restore),
                        Volume {
                            name: CONFIG_VOLUME.to_string(),
                            config_map: Some(ConfigMapVolumeSource {
                                name: config_map,
                                ..Default::default()
                            }),
                            ..Default::default()
                        },
                    ]),
                    containers: vec![Container {
                        name: "restore".to_string(),
                        image: Some(image),
                        command: Some(vec![
                            "sh".to_string(),
                            "-c".to_string(),
                            RESTORE_SCRIPT.to_string(),
                            "restore".to_string(),
                            restore.spec.database_name.clone(),
                        ]),
                        env: Some(vec![
                            superuser_password_env(cluster_spec),
                            env_value("DB_USER", RESTORE_DATABASE_ROLE),
                            env_value("CLUSTER_NAME", restore.spec.cluster_name.clone()),
                            env_value(SNAPSHOT_PATH_ENV, restore.snapshot_path()),
                        ]),
                        volume_mounts: Some(vec![
                            snapshot_mount(restore),
                            VolumeMount {
                                name: CONFIG_VOLUME.to_string(),
                                mount_path: CONFIG_MOUNT_PATH.to_string(),
                                read_only: Some(true),
                                ..Default::default()
                            },
                        ]),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Resources the target cluster runs with during the restore
pub fn restore_time_resources(
    restore: &KubegresRestore,
    template: &KubegresSpec,
) -> ResourceRequirements {
    match &restore.spec.resources {
        Some(resources) if has_resources(resources) => resources.clone(),
        _ => template.resources.clone(),
    }
}

/// Single-instance target cluster marked as managed by the restore
pub fn target_cluster(restore: &KubegresRestore, template: &KubegresSpec) -> Kubegres {
    let mut spec = template.clone();
    spec.replicas = Some(1);
    spec.resources = restore_time_resources(restore, template);

    let mut cluster = Kubegres::new(&restore.spec.cluster_name, spec);
    cluster.metadata.namespace = restore.namespace();
    cluster.metadata.labels = Some(BTreeMap::from([(
        MANAGED_BY_RESTORE_LABEL.to_string(),
        restore.name_any(),
    )]));
    cluster
}
