//! Cgroup filesystem facility
//!
//! Two layouts are supported:
//!
//! ```text
//! Legacy (v1)                          Unified (v2)
//! /sys/fs/cgroup/                      /sys/fs/cgroup/
//! ├── cpu/                             ├── cgroup.controllers
//! │   └── pg/                          ├── cgroup.subtree_control  (+cpu)
//! │       └── etl_jobs/                └── pg/
//! │           ├── cpu.shares               ├── cgroup.subtree_control  (+cpu)
//! │           └── tasks                    └── etl_jobs/
//! └── memory/                                  ├── cgroup.controllers
//!     └── pg/...                               ├── cpu.weight
//!                                              └── cgroup.procs
//! ```
//!
//! In the legacy layout every controller is its own hierarchy, so a group
//! exists once per controller. In the unified layout there is one
//! directory per group and a controller is available in it when the
//! parent enables it through `cgroup.subtree_control`.
//!
//! Deleting a populated v2 group moves its processes to the nearest
//! ancestor with no controllers enabled for its children (or the root),
//! since the kernel refuses processes in any other inner cgroup.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use nix::errno::Errno;
use tracing::{debug, info};

use super::{Facility, FacilityResult, GroupState};
use crate::config::{CgroupConfig, LayoutMode};
use crate::error::FacilityError;
use crate::handle::GroupHandle;

const CGROUP_CONTROLLERS: &str = "cgroup.controllers";
const CGROUP_SUBTREE_CONTROL: &str = "cgroup.subtree_control";
const CGROUP_PROCS: &str = "cgroup.procs";
const TASKS: &str = "tasks";

/// Resolved hierarchy layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Legacy,
    Unified,
}

impl Layout {
    fn tasks_file(self) -> &'static str {
        match self {
            Layout::Legacy => TASKS,
            Layout::Unified => CGROUP_PROCS,
        }
    }
}

/// Facility backed by a mounted cgroup filesystem
#[derive(Debug)]
pub struct CgroupFs {
    mount_root: PathBuf,
    mode: LayoutMode,
    layout: OnceLock<Layout>,
}

impl CgroupFs {
    pub fn new(mount_root: impl Into<PathBuf>, mode: LayoutMode) -> Self {
        Self {
            mount_root: mount_root.into(),
            mode,
            layout: OnceLock::new(),
        }
    }

    pub fn from_config(config: &CgroupConfig) -> Self {
        Self::new(config.mount_root.clone(), config.layout)
    }

    pub fn mount_root(&self) -> &Path {
        &self.mount_root
    }

    /// Layout in use; `Auto` is resolved on first call
    pub fn layout(&self) -> Layout {
        *self.layout.get_or_init(|| match self.mode {
            LayoutMode::Legacy => Layout::Legacy,
            LayoutMode::Unified => Layout::Unified,
            LayoutMode::Auto => {
                // cgroup.controllers only exists at the root of a v2 mount
                if self.mount_root.join(CGROUP_CONTROLLERS).exists() {
                    Layout::Unified
                } else {
                    Layout::Legacy
                }
            }
        })
    }

    /// Directory of `group` in the hierarchy that carries `controller`
    pub fn group_dir(&self, controller: &str, group: &str) -> PathBuf {
        match self.layout() {
            Layout::Legacy => self.mount_root.join(controller).join(group),
            Layout::Unified => self.mount_root.join(group),
        }
    }

    fn ensure_mounted(&self, controller: &str) -> FacilityResult<()> {
        let mounted = match self.layout() {
            Layout::Legacy => {
                is_hierarchy_name(controller) && self.mount_root.join(controller).is_dir()
            }
            Layout::Unified => {
                let path = self.mount_root.join(CGROUP_CONTROLLERS);
                read_cgroup_file(&path)?
                    .split_whitespace()
                    .any(|name| name == controller)
            }
        };

        if mounted {
            Ok(())
        } else {
            Err(FacilityError::NotMounted(controller.to_string()))
        }
    }

    /// Group directories touched by a group-level operation
    ///
    /// Co-mounted v1 controllers (`cpu` and `cpuacct` linking to
    /// `cpu,cpuacct`) share one directory and appear once.
    fn group_dirs(&self, group: &GroupHandle<'_>) -> Vec<PathBuf> {
        let mut seen: Vec<PathBuf> = Vec::new();
        let mut dirs = Vec::new();

        for ctl in group.controllers() {
            let dir = self.group_dir(ctl.name(), group.name());
            let hierarchy = match self.layout() {
                Layout::Legacy => {
                    let root = self.mount_root.join(ctl.name());
                    root.canonicalize().unwrap_or(root)
                }
                Layout::Unified => self.mount_root.clone(),
            };
            if !seen.contains(&hierarchy) {
                seen.push(hierarchy);
                dirs.push(dir);
            }
        }

        dirs
    }

    /// Create each level of `group` under the unified root, enabling the
    /// bound controllers for the level below as it goes
    fn create_unified(&self, group: &GroupHandle<'_>) -> FacilityResult<()> {
        let enable = group
            .controllers()
            .iter()
            .map(|ctl| format!("+{}", ctl.name()))
            .collect::<Vec<_>>()
            .join(" ");

        let mut dir = self.mount_root.clone();
        for component in group.name().split('/') {
            if !enable.is_empty() {
                write_cgroup_file(&dir.join(CGROUP_SUBTREE_CONTROL), &enable)?;
            }
            dir.push(component);
            create_cgroup_dir(&dir)?;
        }

        Ok(())
    }

    fn write_values(&self, group: &GroupHandle<'_>) -> FacilityResult<()> {
        for ctl in group.controllers() {
            let dir = self.group_dir(ctl.name(), group.name());
            for (param, value) in ctl.values() {
                write_cgroup_file(&dir.join(param), &value.to_string())?;
                debug!(group = group.name(), param = %param, value, "wrote cgroup value");
            }
        }
        Ok(())
    }

    /// Cgroup that receives the tasks of `dir` when it is removed
    fn migration_target(&self, dir: &Path) -> Option<PathBuf> {
        let mut target = dir.parent()?;
        if self.layout() == Layout::Unified {
            while target != self.mount_root.as_path() {
                let control = fs::read_to_string(target.join(CGROUP_SUBTREE_CONTROL))
                    .unwrap_or_default();
                if control.trim().is_empty() {
                    break;
                }
                target = match target.parent() {
                    Some(parent) => parent,
                    None => break,
                };
            }
        }
        Some(target.to_path_buf())
    }

    fn migrate_tasks(&self, from: &Path, to: &Path) -> FacilityResult<()> {
        let tasks_file = self.layout().tasks_file();
        let pids = match read_cgroup_file(&from.join(tasks_file)) {
            Ok(content) => parse_tasks(&content),
            Err(FacilityError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                return Ok(())
            }
            Err(e) => return Err(e),
        };

        for pid in pids {
            match append_task(&to.join(tasks_file), pid) {
                Ok(()) => {}
                // Exited while being moved
                Err(FacilityError::Io { source, .. })
                    if source.raw_os_error() == Some(Errno::ESRCH as i32) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }
}

impl Facility for CgroupFs {
    fn init(&self) -> FacilityResult<()> {
        if !self.mount_root.is_dir() {
            return Err(FacilityError::MountMissing(self.mount_root.clone()));
        }
        let layout = self.layout();
        info!(mount_root = ?self.mount_root, ?layout, "cgroup facility initialized");
        Ok(())
    }

    fn allocate(&self, _name: &str) -> FacilityResult<()> {
        Ok(())
    }

    fn release(&self, _name: &str) {}

    fn load(&self, name: &str) -> FacilityResult<GroupState> {
        let mut controllers = Vec::new();

        match self.layout() {
            Layout::Legacy => {
                let entries = fs::read_dir(&self.mount_root)
                    .map_err(|e| FacilityError::io("read_dir", &self.mount_root, e))?;
                for entry in entries {
                    let entry = entry.map_err(|e| FacilityError::io("read_dir", &self.mount_root, e))?;
                    let controller = entry.file_name().to_string_lossy().into_owned();
                    if entry.path().join(name).is_dir() {
                        controllers.push(controller);
                    }
                }
                controllers.sort();
            }
            Layout::Unified => {
                // A group's controllers are the ones its parent enables
                let dir = self.mount_root.join(name);
                if let (true, Some(parent)) = (dir.is_dir(), dir.parent()) {
                    controllers = read_cgroup_file(&parent.join(CGROUP_SUBTREE_CONTROL))?
                        .split_whitespace()
                        .map(|ctl| ctl.trim_start_matches('+').to_string())
                        .collect();
                }
            }
        }

        Ok(GroupState { controllers })
    }

    fn create(&self, group: &GroupHandle<'_>) -> FacilityResult<()> {
        for ctl in group.controllers() {
            self.ensure_mounted(ctl.name())?;
        }

        match self.layout() {
            Layout::Legacy => {
                for dir in self.group_dirs(group) {
                    create_cgroup_dir_all(&dir)?;
                }
            }
            Layout::Unified => self.create_unified(group)?,
        }

        self.write_values(group)
    }

    fn delete(&self, group: &GroupHandle<'_>) -> FacilityResult<()> {
        for dir in self.group_dirs(group) {
            if let Some(target) = self.migration_target(&dir) {
                self.migrate_tasks(&dir, &target)?;
            }
            fs::remove_dir(&dir).map_err(|e| FacilityError::io("rmdir", &dir, e))?;
            debug!(path = ?dir, "removed cgroup directory");
        }
        Ok(())
    }

    fn modify(&self, group: &GroupHandle<'_>) -> FacilityResult<()> {
        for dir in self.group_dirs(group) {
            if !dir.is_dir() {
                return Err(FacilityError::NoSuchGroup(group.name().to_string()));
            }
        }
        self.write_values(group)
    }

    fn attach(&self, group: &GroupHandle<'_>, pid: i32) -> FacilityResult<()> {
        if pid <= 0 {
            return Err(FacilityError::InvalidPid(pid));
        }

        let tasks_file = self.layout().tasks_file();
        for dir in self.group_dirs(group) {
            if !dir.is_dir() {
                return Err(FacilityError::NoSuchGroup(group.name().to_string()));
            }
            append_task(&dir.join(tasks_file), pid)?;
        }
        Ok(())
    }

    fn read_value(&self, group: &str, controller: &str, param: &str) -> FacilityResult<String> {
        let path = self.group_dir(controller, group).join(param);
        Ok(read_cgroup_file(&path)?.trim().to_string())
    }

    fn tasks(&self, group: &str, controller: &str) -> FacilityResult<Vec<i32>> {
        let path = self
            .group_dir(controller, group)
            .join(self.layout().tasks_file());
        Ok(parse_tasks(&read_cgroup_file(&path)?))
    }
}

/// A v1 hierarchy is a direct child of the mount root
fn is_hierarchy_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains('/')
}

fn parse_tasks(content: &str) -> Vec<i32> {
    content
        .lines()
        .filter_map(|line| line.trim().parse::<i32>().ok())
        .collect()
}

fn read_cgroup_file(path: &Path) -> FacilityResult<String> {
    fs::read_to_string(path).map_err(|e| FacilityError::io("read", path, e))
}

fn write_cgroup_file(path: &Path, content: &str) -> FacilityResult<()> {
    fs::write(path, content).map_err(|e| FacilityError::io("write", path, e))
}

/// Each pid needs its own write(2) on a task file
fn append_task(path: &Path, pid: i32) -> FacilityResult<()> {
    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .map_err(|e| FacilityError::io("open", path, e))?;
    file.write_all(format!("{}\n", pid).as_bytes())
        .map_err(|e| FacilityError::io("write", path, e))
}

fn create_cgroup_dir(path: &Path) -> FacilityResult<()> {
    match fs::create_dir(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(FacilityError::io("mkdir", path, e)),
    }
}

fn create_cgroup_dir_all(path: &Path) -> FacilityResult<()> {
    fs::create_dir_all(path).map_err(|e| FacilityError::io("mkdir", path, e))
}
