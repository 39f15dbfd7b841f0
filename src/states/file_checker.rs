//! State of the snapshot file checker pod

use k8s_openapi::api::core::v1::{ContainerStateTerminated, Pod};

use crate::crd::KubegresRestore;

/// Result of checking the snapshot file inside the PVC
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitStatus {
    /// The snapshot file exists
    Ok,
    /// The snapshot file is missing
    FileNotFound,
    /// No verdict yet
    Undefined,
}

/// Observed state of the file checker pod
#[derive(Clone, Debug)]
pub struct FileCheckerState {
    pub is_deployed: bool,
    pub is_terminated: bool,
    pub exit_status: ExitStatus,
    /// The pod checks another location than the one requested
    pub is_outdated: bool,
    /// Most recent files found next to the missing snapshot
    pub candidate_snapshot_names: Vec<String>,
    pub pod: Option<Pod>,
}

impl FileCheckerState {
    /// State when no file checker pod exists
    pub fn absent() -> Self {
        Self {
            is_deployed: false,
            is_terminated: false,
            exit_status: ExitStatus::Undefined,
            is_outdated: false,
            candidate_snapshot_names: Vec::new(),
            pod: None,
        }
    }

    /// Derive the state from a deployed pod
    pub fn from_pod(pod: Pod) -> Self {
        let (is_terminated, exit_status, candidate_snapshot_names) = match terminated_state(&pod) {
            None => (false, ExitStatus::Undefined, Vec::new()),
            Some(terminated) if terminated.exit_code == 0 => (true, ExitStatus::Ok, Vec::new()),
            Some(terminated) => (
                true,
                ExitStatus::FileNotFound,
                parse_snapshot_list(terminated.message.as_deref().unwrap_or_default()),
            ),
        };

        Self {
            is_deployed: true,
            is_terminated,
            exit_status,
            is_outdated: false,
            candidate_snapshot_names,
            pod: Some(pod),
        }
    }

    /// Derive the state of a pod checking the snapshot of `restore`
    ///
    /// A pod still looking at a previous location has no verdict for the
    /// current request.
    pub fn for_request(pod: Pod, restore: &KubegresRestore) -> Self {
        let mut state = Self::from_pod(pod);
        let outdated = state
            .pod
            .as_ref()
            .map(|pod| has_location_changed(pod, restore))
            .unwrap_or(false);
        if outdated {
            state.is_outdated = true;
            state.exit_status = ExitStatus::Undefined;
            state.candidate_snapshot_names.clear();
        }
        state
    }
}

/// Whether a deployed checker pod looks at another PVC, mount path or file
///
/// A pod whose layout is not the one rendered by the template counts as changed.
pub fn has_location_changed(pod: &Pod, restore: &KubegresRestore) -> bool {
    let file = &restore.spec.data_source.file;
    let Some(spec) = pod.spec.as_ref() else {
        return true;
    };

    let claim = spec
        .volumes
        .as_ref()
        .and_then(|volumes| volumes.first())
        .and_then(|volume| volume.persistent_volume_claim.as_ref())
        .map(|pvc| pvc.claim_name.as_str());
    let container = spec.containers.first();
    let mount_path = container
        .and_then(|c| c.volume_mounts.as_ref())
        .and_then(|mounts| mounts.first())
        .map(|mount| mount.mount_path.as_str());
    let snapshot_path = container
        .and_then(|c| c.env.as_ref())
        .and_then(|env| env.first())
        .and_then(|env| env.value.clone());

    claim != Some(file.pvc_name.as_str())
        || mount_path != Some(file.mount_path.as_str())
        || snapshot_path != Some(restore.snapshot_path())
}


fn terminated_state(pod: &Pod) -> Option<&ContainerStateTerminated> {
    pod.status
        .as_ref()?
        .container_statuses
        .as_ref()?
        .first()?
        .state
        .as_ref()?
        .terminated
        .as_ref()
}

/// Split the checker's termination message into file names
///
/// The message holds one file name per line; a trailing empty line is dropped.
pub fn parse_snapshot_list(message: &str) -> Vec<String> {
    if message.is_empty() {
        return Vec::new();
    }
    let mut files: Vec<String> = message.split('\n').map(str::to_string).collect();
    if files.last().map(String::is_empty).unwrap_or(false) {
        files.pop();
    }
    files
}
