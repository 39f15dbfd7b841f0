//! Operator configuration read from the environment

use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default metrics port
pub const DEFAULT_METRICS_PORT: u16 = 8080;

const DEFAULT_REQUEUE_SECONDS: u64 = 10;
const DEFAULT_FILE_CHECKER_IMAGE: &str = "busybox:1.36";
const DEFAULT_DEBUG_POD_IMAGE: &str = "busybox:1.36";
const DEFAULT_RESTORE_JOB_IMAGE: &str = "postgres:16";

/// Runtime configuration of the operator
#[derive(Clone, Debug, PartialEq)]
pub struct OperatorConfig {
    /// Port of the metrics and probe server
    pub metrics_port: u16,
    /// Delay before re-checking a restore that is waiting on something
    pub requeue_interval: Duration,
    /// Whether debug pods requested by restores are reconciled
    pub debug_pods_enabled: bool,
    /// Image of the snapshot file checker pod
    pub file_checker_image: String,
    /// Image of debug pods
    pub debug_pod_image: String,
    /// Image of the restore job when the cluster spec names none
    pub restore_job_image: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            metrics_port: DEFAULT_METRICS_PORT,
            requeue_interval: Duration::from_secs(DEFAULT_REQUEUE_SECONDS),
            debug_pods_enabled: false,
            file_checker_image: DEFAULT_FILE_CHECKER_IMAGE.to_string(),
            debug_pod_image: DEFAULT_DEBUG_POD_IMAGE.to_string(),
            restore_job_image: DEFAULT_RESTORE_JOB_IMAGE.to_string(),
        }
    }
}

impl OperatorConfig {
    /// Load configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let requeue_seconds: u64 =
            parse_var(&lookup, "RESTORE_REQUEUE_SECONDS")?.unwrap_or(DEFAULT_REQUEUE_SECONDS);
        if requeue_seconds == 0 {
            return Err(Error::config("RESTORE_REQUEUE_SECONDS must be greater than 0"));
        }

        Ok(Self {
            metrics_port: parse_var(&lookup, "METRICS_PORT")?.unwrap_or(defaults.metrics_port),
            requeue_interval: Duration::from_secs(requeue_seconds),
            debug_pods_enabled: parse_var(&lookup, "RESTORE_DEBUG_PODS_ENABLED")?
                .unwrap_or(defaults.debug_pods_enabled),
            file_checker_image: lookup("FILE_CHECKER_IMAGE")
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.file_checker_image),
            debug_pod_image: lookup("DEBUG_POD_IMAGE")
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.debug_pod_image),
            restore_job_image: lookup("RESTORE_JOB_IMAGE")
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.restore_job_image),
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::config(format!("Invalid value '{}' for {}: {}", raw, key, e))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = OperatorConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, OperatorConfig::default());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = OperatorConfig::from_lookup(lookup_from(&[
            ("METRICS_PORT", "9090"),
            ("RESTORE_REQUEUE_SECONDS", "3"),
            ("RESTORE_DEBUG_PODS_ENABLED", "true"),
            ("RESTORE_JOB_IMAGE", "postgres:15"),
        ]))
        .unwrap();

        assert_eq!(config.metrics_port, 9090);
        assert_eq!(config.requeue_interval, Duration::from_secs(3));
        assert!(config.debug_pods_enabled);
        assert_eq!(config.restore_job_image, "postgres:15");
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = OperatorConfig::from_lookup(lookup_from(&[("METRICS_PORT", "http")]))
            .unwrap_err();
        assert!(err.to_string().contains("METRICS_PORT"));

        let err = OperatorConfig::from_lookup(lookup_from(&[("RESTORE_REQUEUE_SECONDS", "0")]))
            .unwrap_err();
        assert!(err.to_string().contains("greater than 0"));
    }
}
