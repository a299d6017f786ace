// Integration tests for ResourceGroupManager
// Run the full create/set/attach/delete lifecycle against the in-memory
// facility and against a fake cgroup v1 mount in a temp directory

use std::fs;
use std::sync::Arc;

use rgroup_core::{
    CgroupFs, FailPoint, LayoutMode, ManagerConfig, MemoryFacility, ResourceGroupError,
    ResourceGroupManager,
};
use tempfile::TempDir;

fn pg_config() -> ManagerConfig {
    let mut config = ManagerConfig::default();
    config.cgroup.cgroup_name = Some("pg".to_string());
    config
}

#[test]
fn test_etl_jobs_lifecycle_in_memory() {
    let facility = Arc::new(MemoryFacility::new());
    let manager = ResourceGroupManager::new(&pg_config(), facility.clone());

    assert!(manager.create_resource_group("etl_jobs", "cpu").unwrap());
    assert_eq!(manager.qualified_name("etl_jobs").unwrap(), "pg/etl_jobs");

    assert!(manager
        .set_resource_value("etl_jobs", "cpu", "cpu.shares", 512)
        .unwrap());
    assert_eq!(
        manager.resource_value("etl_jobs", "cpu", "cpu.shares").unwrap(),
        "512"
    );

    assert!(manager
        .attach_resource_group_pid("etl_jobs", "cpu", 4242)
        .unwrap());
    assert!(manager
        .resource_tasks("etl_jobs", "cpu")
        .unwrap()
        .contains(&4242));

    assert!(manager.delete_resource_group("etl_jobs", "cpu").unwrap());

    match manager.set_resource_value("etl_jobs", "cpu", "cpu.shares", 512) {
        Err(ResourceGroupError::ControllerNotFound { group, controller }) => {
            assert_eq!(group, "pg/etl_jobs");
            assert_eq!(controller, "cpu");
        }
        other => panic!("expected ControllerNotFound, got {:?}", other),
    }

    assert_eq!(facility.live_handles(), 0);
    assert_eq!(facility.init_calls(), 1);
}

#[test]
fn test_no_handle_leak_on_any_failure() {
    let facility = Arc::new(MemoryFacility::new());
    let manager = ResourceGroupManager::new(&pg_config(), facility.clone());

    // Bind failures
    assert!(manager.delete_resource_group("missing", "cpu").is_err());
    assert!(manager.set_resource_value("missing", "cpu", "cpu.shares", 1).is_err());
    assert!(manager.attach_resource_group("missing", "cpu").is_err());
    assert!(manager.create_resource_group("missing", "").is_err());
    assert_eq!(facility.live_handles(), 0);

    // Handle allocation failure
    facility.fail_next(FailPoint::Allocate);
    assert!(manager.create_resource_group("etl_jobs", "cpu").is_err());
    assert_eq!(facility.live_handles(), 0);

    // Commit failure
    facility.fail_next(FailPoint::Create);
    assert!(manager.create_resource_group("etl_jobs", "cpu").is_err());
    assert_eq!(facility.live_handles(), 0);
}

#[test]
fn test_concurrent_operations_share_one_init() {
    let facility = Arc::new(MemoryFacility::new());
    let manager = Arc::new(ResourceGroupManager::new(&pg_config(), facility.clone()));

    let workers: Vec<_> = (0..8)
        .map(|i| {
            let manager = Arc::clone(&manager);
            std::thread::spawn(move || {
                let group = format!("worker{}", i);
                manager.create_resource_group(&group, "cpu").unwrap();
                manager
                    .set_resource_value(&group, "cpu", "cpu.shares", 100 + i)
                    .unwrap();
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(facility.init_calls(), 1);
    assert_eq!(facility.live_handles(), 0);
    assert_eq!(facility.group_names().len(), 8);
    assert_eq!(
        manager.resource_value("worker3", "cpu", "cpu.shares").unwrap(),
        "103"
    );
}

/// Fake v1 mount with `cpu` and `memory` hierarchies
fn legacy_mount() -> (TempDir, ResourceGroupManager) {
    let mount = tempfile::tempdir().unwrap();
    fs::create_dir(mount.path().join("cpu")).unwrap();
    fs::create_dir(mount.path().join("memory")).unwrap();

    let mut config = pg_config();
    config.cgroup.mount_root = mount.path().to_path_buf();
    config.cgroup.layout = LayoutMode::Legacy;

    let manager = ResourceGroupManager::from_config(&config);
    (mount, manager)
}

#[test]
fn test_etl_jobs_on_legacy_mount() {
    let (mount, manager) = legacy_mount();
    let group_dir = mount.path().join("cpu/pg/etl_jobs");

    assert!(manager.create_resource_group("etl_jobs", "cpu").unwrap());
    assert!(group_dir.is_dir());

    manager
        .set_resource_value("etl_jobs", "cpu", "cpu.shares", 512)
        .unwrap();
    assert_eq!(fs::read_to_string(group_dir.join("cpu.shares")).unwrap(), "512");
    assert_eq!(
        manager.resource_value("etl_jobs", "cpu", "cpu.shares").unwrap(),
        "512"
    );

    manager.attach_resource_group_pid("etl_jobs", "cpu", 4242).unwrap();
    assert_eq!(manager.resource_tasks("etl_jobs", "cpu").unwrap(), vec![4242]);

    // Never created under memory
    assert!(matches!(
        manager.set_resource_value("etl_jobs", "memory", "memory.limit_in_bytes", 1 << 30),
        Err(ResourceGroupError::ControllerNotFound { .. })
    ));
}

#[test]
fn test_create_delete_on_legacy_mount() {
    let (mount, manager) = legacy_mount();

    manager.create_resource_group("scratch", "memory").unwrap();
    // Existing group: idempotent success
    manager.create_resource_group("scratch", "memory").unwrap();

    manager.delete_resource_group("scratch", "memory").unwrap();
    assert!(!mount.path().join("memory/pg/scratch").exists());

    assert!(matches!(
        manager.delete_resource_group("scratch", "memory"),
        Err(ResourceGroupError::ControllerNotFound { .. })
    ));
}

#[test]
fn test_unmounted_controller_on_legacy_mount() {
    let (_mount, manager) = legacy_mount();

    match manager.create_resource_group("etl_jobs", "blkio") {
        Err(ResourceGroupError::GroupCreateFailed { group, controller, .. }) => {
            assert_eq!(group, "pg/etl_jobs");
            assert_eq!(controller, "blkio");
        }
        other => panic!("expected GroupCreateFailed, got {:?}", other),
    }
}

#[test]
fn test_controller_names_stay_inside_legacy_mount() {
    let tmp = tempfile::tempdir().unwrap();
    let mount = tmp.path().join("cgroup");
    fs::create_dir_all(mount.join("cpu")).unwrap();
    fs::create_dir(tmp.path().join("outside")).unwrap();

    let mut config = pg_config();
    config.cgroup.mount_root = mount.clone();
    config.cgroup.layout = LayoutMode::Legacy;
    let manager = ResourceGroupManager::from_config(&config);

    // Gives cpu/pg a directory, so "cpu/pg" would pass a plain is_dir check
    manager.create_resource_group("etl_jobs", "cpu").unwrap();

    for controller in ["../outside", "cpu/pg"] {
        assert!(matches!(
            manager.create_resource_group("etl_jobs", controller),
            Err(ResourceGroupError::GroupCreateFailed { .. })
        ));
    }
    assert!(!tmp.path().join("outside/pg").exists());
    assert!(!mount.join("cpu/pg/pg").exists());

    // Whatever was created can be deleted again
    assert!(manager.delete_resource_group("etl_jobs", "cpu").unwrap());
}

#[test]
fn test_create_delete_on_unified_mount() {
    let mount = tempfile::tempdir().unwrap();
    fs::write(mount.path().join("cgroup.controllers"), "cpu memory io").unwrap();

    let mut config = pg_config();
    config.cgroup.mount_root = mount.path().to_path_buf();
    let manager = ResourceGroupManager::from_config(&config);

    assert!(manager.create_resource_group("etl_jobs", "cpu").unwrap());
    assert!(mount.path().join("pg/etl_jobs").is_dir());
    assert_eq!(
        fs::read_to_string(mount.path().join("pg/cgroup.subtree_control")).unwrap(),
        "+cpu"
    );

    assert!(manager.delete_resource_group("etl_jobs", "cpu").unwrap());
    assert!(!mount.path().join("pg/etl_jobs").exists());

    assert!(matches!(
        manager.delete_resource_group("etl_jobs", "cpu"),
        Err(ResourceGroupError::ControllerNotFound { .. })
    ));
}

#[test]
fn test_missing_mount_root() {
    let mut config = pg_config();
    config.cgroup.mount_root = "/nonexistent/rgroup/mount".into();
    let manager = ResourceGroupManager::new(
        &config,
        Arc::new(CgroupFs::from_config(&config.cgroup)),
    );

    assert!(matches!(
        manager.create_resource_group("etl_jobs", "cpu"),
        Err(ResourceGroupError::InitFailed(_))
    ));
}
