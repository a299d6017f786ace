//! Underlying resource-control facility
//!
//! The manager never touches cgroup state directly. Everything that reads
//! or mutates kernel-side groups goes through [`Facility`]:
//!
//! - [`CgroupFs`] writes the cgroup filesystem (v1 per-controller
//!   hierarchies or the v2 unified hierarchy)
//! - [`MemoryFacility`] keeps the same state in process memory and can
//!   inject failures, for tests and dry runs

pub mod cgroupfs;
pub mod memory;

pub use cgroupfs::{CgroupFs, Layout};
pub use memory::{FailPoint, MemoryFacility};

use crate::error::FacilityError;
use crate::handle::GroupHandle;

pub type FacilityResult<T> = std::result::Result<T, FacilityError>;

/// What the facility currently records for one group
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupState {
    /// Controllers the group exists under, in facility order
    pub controllers: Vec<String>,
}

impl GroupState {
    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }
}

/// Operations the resource group manager needs from the OS facility
///
/// Group-level operations act on every controller bound to the handle,
/// the same way libcgroup treats a `struct cgroup`.
pub trait Facility: Send + Sync {
    /// One-time setup. Callers guarantee this runs at most once.
    fn init(&self) -> FacilityResult<()>;

    /// Reserve resources for a new handle
    fn allocate(&self, name: &str) -> FacilityResult<()>;

    /// Return what `allocate` reserved
    fn release(&self, name: &str);

    /// Query which controllers the named group exists under
    fn load(&self, name: &str) -> FacilityResult<GroupState>;

    /// Create the group under every bound controller, then write staged values
    fn create(&self, group: &GroupHandle<'_>) -> FacilityResult<()>;

    /// Move member tasks to the parent group, then remove the group
    fn delete(&self, group: &GroupHandle<'_>) -> FacilityResult<()>;

    /// Write staged values of every bound controller
    fn modify(&self, group: &GroupHandle<'_>) -> FacilityResult<()>;

    /// Move a process into the group
    fn attach(&self, group: &GroupHandle<'_>, pid: i32) -> FacilityResult<()>;

    /// Read one parameter of one controller as text
    fn read_value(&self, group: &str, controller: &str, param: &str) -> FacilityResult<String>;

    /// Process identifiers in the group's task list for one controller
    fn tasks(&self, group: &str, controller: &str) -> FacilityResult<Vec<i32>>;
}
