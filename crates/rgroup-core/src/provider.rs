//! Group handle provider

use std::sync::{Arc, OnceLock};

use tracing::debug;

use crate::error::{ResourceGroupError, Result};
use crate::facility::{Facility, GroupState};
use crate::handle::GroupHandle;

/// Hands out group handles, initializing the facility on first use
pub struct HandleProvider {
    facility: Arc<dyn Facility>,
    init: OnceLock<std::result::Result<(), String>>,
}

impl HandleProvider {
    pub fn new(facility: Arc<dyn Facility>) -> Self {
        Self {
            facility,
            init: OnceLock::new(),
        }
    }

    pub fn facility(&self) -> &dyn Facility {
        self.facility.as_ref()
    }

    /// Run `Facility::init` exactly once; later calls see the first outcome
    pub fn ensure_init(&self) -> Result<()> {
        self.init
            .get_or_init(|| {
                debug!("initializing cgroup facility");
                self.facility.init().map_err(|e| e.to_string())
            })
            .clone()
            .map_err(ResourceGroupError::InitFailed)
    }

    /// Allocate a handle for `name` and fill it from current facility state
    ///
    /// A group that does not exist yet yields an empty handle; that is
    /// reported later, when a controller is requested from it.
    pub fn obtain(&self, name: &str) -> Result<GroupHandle<'_>> {
        self.ensure_init()?;

        self.facility
            .allocate(name)
            .map_err(|source| ResourceGroupError::AllocationFailed {
                group: name.to_string(),
                source,
            })?;

        let state = match self.facility.load(name) {
            Ok(state) => {
                debug!(group = name, controllers = ?state.controllers, "loaded group state");
                state
            }
            Err(e) => {
                debug!(group = name, error = %e, "group state not loaded");
                GroupState::default()
            }
        };

        Ok(GroupHandle::new(name.to_string(), self.facility(), state))
    }
}
