//! rgroup Core Library
//!
//! Manages named cgroups on behalf of a host process. Short group names
//! are nested under one configured root (`root/short`); groups can be
//! created and deleted, given controller parameters, and have processes
//! attached to them.
//!
//! ```no_run
//! use rgroup_core::{ManagerConfig, ResourceGroupManager};
//!
//! let mut config = ManagerConfig::default();
//! config.cgroup.cgroup_name = Some("pg".to_string());
//!
//! let manager = ResourceGroupManager::from_config(&config);
//! manager.create_resource_group("etl_jobs", "cpu")?;
//! manager.set_resource_value("etl_jobs", "cpu", "cpu.shares", 512)?;
//! manager.attach_resource_group_pid("etl_jobs", "cpu", 4242)?;
//! # Ok::<(), rgroup_core::ResourceGroupError>(())
//! ```

pub mod binder;
pub mod config;
pub mod error;
pub mod facility;
pub mod handle;
pub mod manager;
pub mod name;
pub mod provider;

pub use config::{CgroupConfig, ConfigError, LayoutMode, ManagerConfig, CGROUP_NAME_ENV};
pub use error::{FacilityError, ResourceGroupError, Result};
pub use facility::{CgroupFs, Facility, FailPoint, GroupState, Layout, MemoryFacility};
pub use handle::{Controller, GroupHandle};
pub use manager::ResourceGroupManager;
pub use provider::HandleProvider;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
