//! In-process facility
//!
//! Mirrors the cgroup filesystem semantics closely enough to drive the
//! manager without privileges: per-group controller sets, staged values,
//! task lists and migration to the parent on delete. Live handles and
//! `init` calls are counted so tests can check that every handle is
//! released.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::{Facility, FacilityResult, GroupState};
use crate::error::FacilityError;
use crate::handle::GroupHandle;

/// Facility call that should fail once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    Init,
    Allocate,
    Create,
    Delete,
    Modify,
    Attach,
}

#[derive(Debug, Default, Clone)]
struct ControllerState {
    values: BTreeMap<String, u64>,
    tasks: Vec<i32>,
}

#[derive(Debug, Default)]
struct State {
    /// group name -> controller name -> state
    groups: BTreeMap<String, BTreeMap<String, ControllerState>>,
    failures: Vec<FailPoint>,
}

/// Facility that keeps all group state in memory
#[derive(Debug, Default)]
pub struct MemoryFacility {
    state: Mutex<State>,
    live: AtomicUsize,
    inits: AtomicUsize,
}

impl MemoryFacility {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call at `point` fail
    pub fn fail_next(&self, point: FailPoint) {
        self.lock().failures.push(point);
    }

    /// Handles allocated and not yet released
    pub fn live_handles(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// How many times `init` ran
    pub fn init_calls(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }

    /// Names of every group that exists under at least one controller
    pub fn group_names(&self) -> Vec<String> {
        self.lock().groups.keys().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // State stays consistent even if a test thread panicked mid-call
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn injected(state: &mut State, point: FailPoint) -> FacilityResult<()> {
        match state.failures.iter().position(|p| *p == point) {
            Some(index) => {
                state.failures.remove(index);
                Err(FacilityError::Rejected(format!("injected {:?} failure", point)))
            }
            None => Ok(()),
        }
    }

    fn check_name(name: &str) -> FacilityResult<()> {
        if name.split('/').any(|part| part.is_empty() || part == "." || part == "..") {
            return Err(FacilityError::Rejected(format!("invalid group name: {}", name)));
        }
        Ok(())
    }

    fn flush(
        controllers: &mut BTreeMap<String, ControllerState>,
        group: &GroupHandle<'_>,
    ) -> FacilityResult<()> {
        for ctl in group.controllers() {
            let entry = controllers
                .get_mut(ctl.name())
                .ok_or_else(|| FacilityError::NoSuchGroup(group.name().to_string()))?;
            for (param, value) in ctl.values() {
                entry.values.insert(param.clone(), *value);
            }
        }
        Ok(())
    }
}

impl Facility for MemoryFacility {
    fn init(&self) -> FacilityResult<()> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        Self::injected(&mut self.lock(), FailPoint::Init)
    }

    fn allocate(&self, _name: &str) -> FacilityResult<()> {
        Self::injected(&mut self.lock(), FailPoint::Allocate)?;
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release(&self, _name: &str) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }

    fn load(&self, name: &str) -> FacilityResult<GroupState> {
        let state = self.lock();
        let controllers = state
            .groups
            .get(name)
            .map(|ctls| ctls.keys().cloned().collect())
            .unwrap_or_default();
        Ok(GroupState { controllers })
    }

    fn create(&self, group: &GroupHandle<'_>) -> FacilityResult<()> {
        let mut state = self.lock();
        Self::injected(&mut state, FailPoint::Create)?;
        Self::check_name(group.name())?;

        // Existing controllers are kept as they are, like mkdir on EEXIST
        let controllers = state.groups.entry(group.name().to_string()).or_default();
        for ctl in group.controllers() {
            controllers.entry(ctl.name().to_string()).or_default();
        }
        Self::flush(controllers, group)
    }

    fn delete(&self, group: &GroupHandle<'_>) -> FacilityResult<()> {
        let mut state = self.lock();
        Self::injected(&mut state, FailPoint::Delete)?;

        let parent = group.name().rsplit_once('/').map(|(parent, _)| parent.to_string());
        let mut controllers = state
            .groups
            .remove(group.name())
            .ok_or_else(|| FacilityError::NoSuchGroup(group.name().to_string()))?;

        for ctl in group.controllers() {
            let removed = match controllers.remove(ctl.name()) {
                Some(removed) => removed,
                None => continue,
            };
            // Tasks fall back to the parent group, or to the hierarchy root
            if let Some(parent_group) = parent.as_deref().and_then(|p| state.groups.get_mut(p)) {
                if let Some(parent_ctl) = parent_group.get_mut(ctl.name()) {
                    parent_ctl.tasks.extend(removed.tasks);
                }
            }
        }

        if !controllers.is_empty() {
            state.groups.insert(group.name().to_string(), controllers);
        }
        Ok(())
    }

    fn modify(&self, group: &GroupHandle<'_>) -> FacilityResult<()> {
        let mut state = self.lock();
        Self::injected(&mut state, FailPoint::Modify)?;

        let controllers = state
            .groups
            .get_mut(group.name())
            .ok_or_else(|| FacilityError::NoSuchGroup(group.name().to_string()))?;
        Self::flush(controllers, group)
    }

    fn attach(&self, group: &GroupHandle<'_>, pid: i32) -> FacilityResult<()> {
        let mut state = self.lock();
        Self::injected(&mut state, FailPoint::Attach)?;

        if pid <= 0 {
            return Err(FacilityError::InvalidPid(pid));
        }

        let bound = state.groups.get(group.name()).is_some_and(|ctls| {
            group.controllers().iter().all(|ctl| ctls.contains_key(ctl.name()))
        });
        if !bound {
            return Err(FacilityError::NoSuchGroup(group.name().to_string()));
        }

        // A task belongs to one group per controller at a time
        for ctl in group.controllers() {
            for (name, controllers) in state.groups.iter_mut() {
                let entry = match controllers.get_mut(ctl.name()) {
                    Some(entry) => entry,
                    None => continue,
                };
                if name == group.name() {
                    if !entry.tasks.contains(&pid) {
                        entry.tasks.push(pid);
                    }
                } else {
                    entry.tasks.retain(|task| *task != pid);
                }
            }
        }
        Ok(())
    }

    fn read_value(&self, group: &str, controller: &str, param: &str) -> FacilityResult<String> {
        let state = self.lock();
        let ctl = state
            .groups
            .get(group)
            .and_then(|ctls| ctls.get(controller))
            .ok_or_else(|| FacilityError::NoSuchGroup(group.to_string()))?;
        ctl.values
            .get(param)
            .map(|value| value.to_string())
            .ok_or_else(|| FacilityError::Rejected(format!("no such parameter: {}", param)))
    }

    fn tasks(&self, group: &str, controller: &str) -> FacilityResult<Vec<i32>> {
        let state = self.lock();
        state
            .groups
            .get(group)
            .and_then(|ctls| ctls.get(controller))
            .map(|ctl| ctl.tasks.clone())
            .ok_or_else(|| FacilityError::NoSuchGroup(group.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle<'f>(facility: &'f MemoryFacility, name: &str, controllers: &[&str]) -> GroupHandle<'f> {
        facility.allocate(name).unwrap();
        let state = GroupState {
            controllers: controllers.iter().map(|c| c.to_string()).collect(),
        };
        GroupHandle::new(name.to_string(), facility, state)
    }

    #[test]
    fn test_create_and_load() {
        let facility = MemoryFacility::new();
        facility.create(&handle(&facility, "pg/etl", &["cpu", "memory"])).unwrap();

        let state = facility.load("pg/etl").unwrap();
        assert_eq!(state.controllers, vec!["cpu".to_string(), "memory".to_string()]);
        assert!(facility.load("pg/other").unwrap().is_empty());
        assert_eq!(facility.group_names(), vec!["pg/etl".to_string()]);
    }

    #[test]
    fn test_create_existing_is_idempotent() {
        let facility = MemoryFacility::new();
        let group = handle(&facility, "pg/etl", &["cpu"]);
        facility.create(&group).unwrap();
        facility.create(&group).unwrap();

        assert_eq!(facility.load("pg/etl").unwrap().controllers.len(), 1);
    }

    #[test]
    fn test_create_rejects_bad_names() {
        let facility = MemoryFacility::new();
        assert!(facility.create(&handle(&facility, "pg/", &["cpu"])).is_err());
        assert!(facility.create(&handle(&facility, "pg/..", &["cpu"])).is_err());
        assert!(facility.group_names().is_empty());
    }

    #[test]
    fn test_modify_requires_group() {
        let facility = MemoryFacility::new();
        let result = facility.modify(&handle(&facility, "pg/etl", &["cpu"]));
        assert!(matches!(result, Err(FacilityError::NoSuchGroup(_))));
    }

    #[test]
    fn test_attach_moves_task() {
        let facility = MemoryFacility::new();
        facility.create(&handle(&facility, "pg/a", &["cpu"])).unwrap();
        facility.create(&handle(&facility, "pg/b", &["cpu"])).unwrap();

        facility.attach(&handle(&facility, "pg/a", &["cpu"]), 4242).unwrap();
        facility.attach(&handle(&facility, "pg/a", &["cpu"]), 4242).unwrap();
        assert_eq!(facility.tasks("pg/a", "cpu").unwrap(), vec![4242]);

        facility.attach(&handle(&facility, "pg/b", &["cpu"]), 4242).unwrap();
        assert!(facility.tasks("pg/a", "cpu").unwrap().is_empty());
        assert_eq!(facility.tasks("pg/b", "cpu").unwrap(), vec![4242]);
    }

    #[test]
    fn test_attach_invalid_pid() {
        let facility = MemoryFacility::new();
        facility.create(&handle(&facility, "pg/a", &["cpu"])).unwrap();

        let result = facility.attach(&handle(&facility, "pg/a", &["cpu"]), 0);
        assert!(matches!(result, Err(FacilityError::InvalidPid(0))));
    }

    #[test]
    fn test_delete_migrates_tasks_to_parent() {
        let facility = MemoryFacility::new();
        facility.create(&handle(&facility, "pg", &["cpu"])).unwrap();
        facility.create(&handle(&facility, "pg/etl", &["cpu"])).unwrap();
        facility.attach(&handle(&facility, "pg/etl", &["cpu"]), 7).unwrap();

        facility.delete(&handle(&facility, "pg/etl", &["cpu"])).unwrap();

        assert!(facility.load("pg/etl").unwrap().is_empty());
        assert_eq!(facility.tasks("pg", "cpu").unwrap(), vec![7]);
    }

    #[test]
    fn test_delete_keeps_unbound_controllers() {
        let facility = MemoryFacility::new();
        facility.create(&handle(&facility, "pg/etl", &["cpu", "memory"])).unwrap();
        facility.delete(&handle(&facility, "pg/etl", &["cpu"])).unwrap();

        assert_eq!(
            facility.load("pg/etl").unwrap().controllers,
            vec!["memory".to_string()]
        );
    }

    #[test]
    fn test_injected_failure_fires_once() {
        let facility = MemoryFacility::new();
        facility.fail_next(FailPoint::Create);

        let group = handle(&facility, "pg/etl", &["cpu"]);
        assert!(matches!(facility.create(&group), Err(FacilityError::Rejected(_))));
        assert!(facility.create(&group).is_ok());
    }

    #[test]
    fn test_live_handle_count() {
        let facility = MemoryFacility::new();
        let a = handle(&facility, "pg/a", &[]);
        let b = handle(&facility, "pg/b", &[]);
        assert_eq!(facility.live_handles(), 2);

        drop(a);
        drop(b);
        assert_eq!(facility.live_handles(), 0);
    }
}
