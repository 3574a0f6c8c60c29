//! Integration tests for assembling the command context.

use hishtory_core::config::{ClientConfig, ConfigStore};
use hishtory_core::context::{BootstrapStage, Context};
use hishtory_core::paths::HishtoryPaths;
use std::fs;
use tempfile::TempDir;

fn setup_paths() -> (TempDir, HishtoryPaths) {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let paths = HishtoryPaths::new(temp.path(), ".hishtory");
    (temp, paths)
}

#[test]
fn bootstrap_binds_config_db_and_home() {
    let (temp, paths) = setup_paths();
    ConfigStore::new(&paths)
        .save(&ClientConfig {
            is_enabled: true,
            device_id: "dev-7".to_string(),
            ..Default::default()
        })
        .expect("Failed to save config");

    let ctx = Context::bootstrap_at(&paths).expect("Bootstrap failed");

    assert!(ctx.config().is_enabled);
    assert_eq!(ctx.config().device_id, "dev-7");
    assert_eq!(ctx.home_dir(), temp.path());
    ctx.db().ping().expect("DB should be live");
    assert!(paths.db_file().is_file());
}

#[test]
fn bootstrap_without_config_fails_at_config_stage() {
    let (_temp, paths) = setup_paths();

    let err = Context::bootstrap_at(&paths).expect_err("Bootstrap should fail");

    assert_eq!(err.stage, BootstrapStage::Config);
    assert!(err.to_string().starts_with("failed to retrieve config"));
}

#[test]
fn bootstrap_with_corrupt_config_fails_at_config_stage() {
    let (_temp, paths) = setup_paths();
    let store = ConfigStore::new(&paths);
    store.init_if_absent().expect("Failed to init config");
    fs::write(store.path(), "not json").expect("Failed to corrupt config");

    let err = Context::bootstrap_at(&paths).expect_err("Bootstrap should fail");

    assert_eq!(err.stage, BootstrapStage::Config);
}

#[test]
fn bootstrap_with_unopenable_db_fails_at_datastore_stage() {
    let (_temp, paths) = setup_paths();
    ConfigStore::new(&paths)
        .init_if_absent()
        .expect("Failed to init config");
    // A directory where the database file should be.
    fs::create_dir_all(paths.db_file()).expect("Failed to create blocker");

    let err = Context::bootstrap_at(&paths).expect_err("Bootstrap should fail");

    assert_eq!(err.stage, BootstrapStage::Datastore);
}

#[test]
fn derived_frames_do_not_change_bootstrapped_context() {
    let (_temp, paths) = setup_paths();
    ConfigStore::new(&paths)
        .init_if_absent()
        .expect("Failed to init config");
    let ctx = Context::bootstrap_at(&paths).expect("Bootstrap failed");

    let mut updated = ctx.config().clone();
    updated.is_enabled = true;
    let derived = ctx.with_config(updated);

    assert!(derived.config().is_enabled);
    assert!(!ctx.config().is_enabled);
    assert_eq!(derived.home_dir(), ctx.home_dir());
}
