//! Group and controller handles

use std::fmt;

use crate::facility::{Facility, GroupState};

/// Longest controller name the facility accepts
pub const CONTROL_NAMELEN_MAX: usize = 32;

/// Most controllers one group handle can hold
pub const CG_CONTROLLER_MAX: usize = 100;

/// One controller's configuration within a group handle
///
/// Values set here are only staged; they reach the facility when the
/// owning group is created or modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Controller {
    name: String,
    values: Vec<(String, u64)>,
}

impl Controller {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Staged parameters, in the order they were first set
    pub fn values(&self) -> &[(String, u64)] {
        &self.values
    }

    pub fn value(&self, param: &str) -> Option<u64> {
        self.values
            .iter()
            .find(|(name, _)| name == param)
            .map(|(_, value)| *value)
    }

    /// Stage a parameter write, replacing an earlier one for the same name
    pub fn set_value_u64(&mut self, param: &str, value: u64) {
        match self.values.iter_mut().find(|(name, _)| name == param) {
            Some(entry) => entry.1 = value,
            None => self.values.push((param.to_string(), value)),
        }
    }
}

/// In-process view of one named group
///
/// Obtained through the handle provider; the facility reservation taken at
/// allocation time is returned when the handle is dropped, on every exit
/// path of the operation that owns it.
pub struct GroupHandle<'f> {
    name: String,
    controllers: Vec<Controller>,
    facility: &'f dyn Facility,
}

impl<'f> GroupHandle<'f> {
    /// Wrap an allocation the facility has already granted for `name`
    pub(crate) fn new(name: String, facility: &'f dyn Facility, state: GroupState) -> Self {
        let controllers = state.controllers.into_iter().map(Controller::new).collect();
        Self {
            name,
            controllers,
            facility,
        }
    }

    /// Fully-qualified group name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn controllers(&self) -> &[Controller] {
        &self.controllers
    }

    pub fn controller(&self, name: &str) -> Option<&Controller> {
        self.controllers.iter().find(|c| c.name == name)
    }

    pub(crate) fn position(&self, name: &str) -> Option<usize> {
        self.controllers.iter().position(|c| c.name == name)
    }

    pub(crate) fn controller_at_mut(&mut self, index: usize) -> &mut Controller {
        &mut self.controllers[index]
    }

    /// Add a controller to the in-memory representation only
    ///
    /// Returns the reason when the name or the controller count is out of
    /// the facility's bounds.
    pub(crate) fn add_controller(&mut self, name: &str) -> Result<&mut Controller, String> {
        if name.is_empty() {
            return Err("controller name is empty".to_string());
        }
        if name.len() > CONTROL_NAMELEN_MAX {
            return Err(format!(
                "controller name longer than {} bytes",
                CONTROL_NAMELEN_MAX
            ));
        }
        if self.controllers.len() >= CG_CONTROLLER_MAX {
            return Err(format!("group already holds {} controllers", CG_CONTROLLER_MAX));
        }

        self.controllers.push(Controller::new(name));
        let last = self.controllers.len() - 1;
        Ok(&mut self.controllers[last])
    }
}

impl fmt::Debug for GroupHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupHandle")
            .field("name", &self.name)
            .field("controllers", &self.controllers)
            .finish()
    }
}

impl Drop for GroupHandle<'_> {
    fn drop(&mut self) {
        self.facility.release(&self.name);
    }
}
