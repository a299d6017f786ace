use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable that overrides `cgroup.cgroup_name`
pub const CGROUP_NAME_ENV: &str = "RGROUP_CGROUP_NAME";

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration for the resource group manager
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Cgroup facility settings
    #[serde(default)]
    pub cgroup: CgroupConfig,
}

/// Where the managed groups live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CgroupConfig {
    /// Root group name under which every short name is nested (default: unset)
    #[serde(default)]
    pub cgroup_name: Option<String>,

    /// Cgroup filesystem mount point (default: /sys/fs/cgroup)
    #[serde(default = "default_mount_root")]
    pub mount_root: PathBuf,

    /// Hierarchy layout (default: auto)
    #[serde(default)]
    pub layout: LayoutMode,
}

/// Hierarchy layout selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutMode {
    /// Detect from the mount root
    #[default]
    Auto,
    /// cgroup v1, one hierarchy per controller
    Legacy,
    /// cgroup v2 unified hierarchy
    Unified,
}

fn default_mount_root() -> PathBuf {
    PathBuf::from("/sys/fs/cgroup")
}

impl Default for CgroupConfig {
    fn default() -> Self {
        Self {
            cgroup_name: None,
            mount_root: default_mount_root(),
            layout: LayoutMode::default(),
        }
    }
}

impl ManagerConfig {
    /// Load configuration from TOML file
    ///
    /// # Example
    /// ```no_run
    /// use rgroup_core::config::ManagerConfig;
    ///
    /// let config = ManagerConfig::load_from_file("/etc/rgroup/config.toml").unwrap();
    /// println!("Root group: {:?}", config.root_name());
    /// ```
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: ManagerConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `RGROUP_CGROUP_NAME` from the process environment
    pub fn with_env_overrides(mut self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok());
        self
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(name) = lookup(CGROUP_NAME_ENV) {
            self.cgroup.cgroup_name = Some(name);
        }
    }

    /// Root group name, `None` when unset or empty
    pub fn root_name(&self) -> Option<&str> {
        self.cgroup
            .cgroup_name
            .as_deref()
            .filter(|name| !name.is_empty())
    }

    /// Validate configuration values
    ///
    /// An empty root name is not invalid: it means "unset" and is reported
    /// by every operation instead.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(name) = self.root_name() {
            if name.contains('\0') {
                return Err(ConfigError::Invalid(
                    "cgroup_name must not contain NUL bytes".to_string(),
                ));
            }
            if name.starts_with('/') || name.ends_with('/') {
                return Err(ConfigError::Invalid(format!(
                    "cgroup_name must not start or end with '/', got: {}",
                    name
                )));
            }
        }

        if self.cgroup.mount_root.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("mount_root must not be empty".to_string()));
        }

        Ok(())
    }
}
