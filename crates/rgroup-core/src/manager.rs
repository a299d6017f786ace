//! Resource group manager
//!
//! Every operation runs the same sequence and stops at the first failure:
//!
//! ```text
//! resolve name -> obtain handle -> bind controller -> mutate -> release
//! ```
//!
//! The group handle is released when it goes out of scope, so early
//! returns from the bind or mutate steps release it too. Nothing is
//! rolled back: a failed mutation leaves whatever the facility left.

use std::sync::{Arc, RwLock};

use tracing::{debug, info, warn};

use crate::binder::bind;
use crate::config::ManagerConfig;
use crate::error::{ResourceGroupError, Result};
use crate::facility::{CgroupFs, Facility};
use crate::name::resolve;
use crate::provider::HandleProvider;

/// Creates, deletes, configures and populates groups under one root name
pub struct ResourceGroupManager {
    root_name: RwLock<Option<String>>,
    provider: HandleProvider,
}

impl ResourceGroupManager {
    pub fn new(config: &ManagerConfig, facility: Arc<dyn Facility>) -> Self {
        Self {
            root_name: RwLock::new(config.root_name().map(str::to_string)),
            provider: HandleProvider::new(facility),
        }
    }

    /// Manager over the cgroup filesystem described by `config`
    pub fn from_config(config: &ManagerConfig) -> Self {
        Self::new(config, Arc::new(CgroupFs::from_config(&config.cgroup)))
    }

    /// Swap in the root name from a reloaded configuration
    ///
    /// Only the root name is reloadable; the facility stays as created.
    pub fn reload(&self, config: &ManagerConfig) {
        let next = config.root_name().map(str::to_string);
        let mut root = self.root_name.write().unwrap_or_else(|e| e.into_inner());
        if *root != next {
            info!(old = ?*root, new = ?next, "cgroup_name reloaded");
            *root = next;
        }
    }

    pub fn root_name(&self) -> Option<String> {
        self.root_name
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Fully-qualified name for `group` under the current root
    pub fn qualified_name(&self, group: &str) -> Result<String> {
        resolve(self.root_name().as_deref(), group)
    }

    pub fn facility(&self) -> &dyn Facility {
        self.provider.facility()
    }

    /// Create `group` with `controller` added to whatever it already has
    pub fn create_resource_group(&self, group: &str, controller: &str) -> Result<bool> {
        let name = self.qualified_name(group)?;
        debug!(group = %name, controller, "create_resource_group");

        let mut handle = self.provider.obtain(&name)?;
        bind(&mut handle, controller, true)?;

        self.provider.facility().create(&handle).map_err(|source| {
            warn!(group = %name, controller, error = %source, "cgroup create failed");
            ResourceGroupError::GroupCreateFailed {
                group: name.clone(),
                controller: controller.to_string(),
                source,
            }
        })?;

        info!(group = %name, controller, "created resource group");
        Ok(true)
    }

    /// Delete `group`; it must exist under `controller`
    pub fn delete_resource_group(&self, group: &str, controller: &str) -> Result<bool> {
        let name = self.qualified_name(group)?;
        debug!(group = %name, controller, "delete_resource_group");

        let mut handle = self.provider.obtain(&name)?;
        bind(&mut handle, controller, false)?;

        self.provider.facility().delete(&handle).map_err(|source| {
            warn!(group = %name, controller, error = %source, "cgroup delete failed");
            ResourceGroupError::DeleteFailed {
                group: name.clone(),
                controller: controller.to_string(),
                source,
            }
        })?;

        info!(group = %name, controller, "deleted resource group");
        Ok(true)
    }

    /// Write `param = value` to `controller` of an existing `group`
    pub fn set_resource_value(
        &self,
        group: &str,
        controller: &str,
        param: &str,
        value: u64,
    ) -> Result<bool> {
        let name = self.qualified_name(group)?;
        debug!(group = %name, controller, param, value, "set_resource_value");

        let mut handle = self.provider.obtain(&name)?;
        bind(&mut handle, controller, false)?.set_value_u64(param, value);

        self.provider.facility().modify(&handle).map_err(|source| {
            warn!(group = %name, controller, param, value, error = %source, "cgroup modify failed");
            ResourceGroupError::ModifyFailed {
                group: name.clone(),
                controller: controller.to_string(),
                param: param.to_string(),
                value,
                source,
            }
        })?;

        info!(group = %name, controller, param, value, "set resource value");
        Ok(true)
    }

    /// Move the calling process into `group`
    pub fn attach_resource_group(&self, group: &str, controller: &str) -> Result<bool> {
        self.attach(group, controller, None)
    }

    /// Move process `pid` into `group`
    pub fn attach_resource_group_pid(&self, group: &str, controller: &str, pid: i32) -> Result<bool> {
        self.attach(group, controller, Some(pid))
    }

    fn attach(&self, group: &str, controller: &str, pid: Option<i32>) -> Result<bool> {
        let name = self.qualified_name(group)?;
        debug!(group = %name, controller, ?pid, "attach_resource_group");

        let mut handle = self.provider.obtain(&name)?;
        bind(&mut handle, controller, false)?;

        let pid = pid.unwrap_or_else(|| nix::unistd::getpid().as_raw());
        self.provider.facility().attach(&handle, pid).map_err(|source| {
            warn!(group = %name, controller, pid, error = %source, "cgroup attach failed");
            ResourceGroupError::AttachFailed {
                group: name.clone(),
                controller: controller.to_string(),
                pid,
                source,
            }
        })?;

        info!(group = %name, controller, pid, "attached process");
        Ok(true)
    }

    /// Current value of `param` as the facility reports it
    pub fn resource_value(&self, group: &str, controller: &str, param: &str) -> Result<String> {
        let name = self.qualified_name(group)?;
        self.provider.ensure_init()?;
        self.provider
            .facility()
            .read_value(&name, controller, param)
            .map_err(|source| ResourceGroupError::ReadFailed {
                group: name.clone(),
                controller: controller.to_string(),
                what: format!("parameter \"{}\"", param),
                source,
            })
    }

    /// Processes currently in `group` for `controller`
    pub fn resource_tasks(&self, group: &str, controller: &str) -> Result<Vec<i32>> {
        let name = self.qualified_name(group)?;
        self.provider.ensure_init()?;
        self.provider
            .facility()
            .tasks(&name, controller)
            .map_err(|source| ResourceGroupError::ReadFailed {
                group: name.clone(),
                controller: controller.to_string(),
                what: "task list".to_string(),
                source,
            })
    }
}
