//! Error types for resource group operations

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures reported by the underlying resource-control facility
#[derive(Debug, Error)]
pub enum FacilityError {
    #[error("{op} {path:?}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cgroup mount root not found: {0:?}")]
    MountMissing(PathBuf),

    #[error("Controller is not mounted: {0}")]
    NotMounted(String),

    #[error("Cgroup not found: {0}")]
    NoSuchGroup(String),

    #[error("Invalid pid: {0}")]
    InvalidPid(i32),

    #[error("Facility rejected request: {0}")]
    Rejected(String),
}

impl FacilityError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }
}

/// Errors surfaced by the resource group manager
#[derive(Debug, Error)]
pub enum ResourceGroupError {
    #[error("cgroup_name is not configured")]
    ConfigurationMissing,

    #[error("Group name is empty")]
    EmptyGroupName,

    #[error("Could not initialize cgroup facility: {0}")]
    InitFailed(String),

    #[error("Could not allocate cgroup handle for \"{group}\"")]
    AllocationFailed {
        group: String,
        #[source]
        source: FacilityError,
    },

    #[error("Could not get cgroup controller: \"{group}\", \"{controller}\"")]
    ControllerNotFound { group: String, controller: String },

    #[error("Could not create cgroup controller: \"{group}\", \"{controller}\" ({reason})")]
    ControllerCreateFailed {
        group: String,
        controller: String,
        reason: String,
    },

    #[error("Could not create new cgroup: \"{group}\", \"{controller}\"")]
    GroupCreateFailed {
        group: String,
        controller: String,
        #[source]
        source: FacilityError,
    },

    #[error("Could not delete cgroup: \"{group}\", \"{controller}\"")]
    DeleteFailed {
        group: String,
        controller: String,
        #[source]
        source: FacilityError,
    },

    #[error(
        "Could not modify cgroup: \"{group}\", subsystem \"{controller}\", param \"{param}\" and value {value}"
    )]
    ModifyFailed {
        group: String,
        controller: String,
        param: String,
        value: u64,
        #[source]
        source: FacilityError,
    },

    #[error("Could not attach pid {pid} to cgroup: \"{group}\", \"{controller}\"")]
    AttachFailed {
        group: String,
        controller: String,
        pid: i32,
        #[source]
        source: FacilityError,
    },

    #[error("Could not read {what} of cgroup: \"{group}\", \"{controller}\"")]
    ReadFailed {
        group: String,
        controller: String,
        what: String,
        #[source]
        source: FacilityError,
    },
}

pub type Result<T> = std::result::Result<T, ResourceGroupError>;
