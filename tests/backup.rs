mod common;

use common::utf8_root;
use mod_deployer::core::mod_backup::BackupManager;
use mod_deployer::models::error::SError;
use mod_deployer::models::record::{BackupOrigin, BackupRecord};
use std::fs;

fn setup() -> (tempfile::TempDir, camino::Utf8PathBuf, BackupManager) {
    let tmp = tempfile::tempdir().unwrap();
    let root = utf8_root(&tmp);
    let manager = BackupManager::load(&root.join("backups.toml")).unwrap();
    (tmp, root, manager)
}

#[test]
fn test_preserve_is_idempotent() {
    let (_tmp, root, mut backups) = setup();
    let target = root.join("game/file.bundle");
    fs::create_dir_all(target.parent().unwrap()).unwrap();
    fs::write(&target, b"pristine").unwrap();

    assert!(backups.preserve(&target, "A").unwrap());
    fs::write(&target, b"modded").unwrap();
    assert!(!backups.preserve(&target, "B").unwrap());

    let sidecar = BackupRecord::sidecar_for(&target);
    assert_eq!(sidecar.file_name(), Some("file.bundle.modbak"));
    assert_eq!(fs::read(&sidecar).unwrap(), b"pristine");
    assert_eq!(backups.records().count(), 1);
    assert_eq!(backups.get(&target).unwrap().owner, "A");
}

#[test]
fn test_restore_puts_original_back() {
    let (_tmp, root, mut backups) = setup();
    let target = root.join("file.bundle");
    fs::write(&target, b"pristine").unwrap();

    backups.preserve(&target, "A").unwrap();
    fs::write(&target, b"modded").unwrap();
    assert!(backups.restore(&target).unwrap());

    assert_eq!(fs::read(&target).unwrap(), b"pristine");
    assert!(!BackupRecord::sidecar_for(&target).exists());
    assert!(!backups.has_backup(&target));

    // no record left, so this is a no-op
    assert!(!backups.restore(&target).unwrap());
    assert_eq!(fs::read(&target).unwrap(), b"pristine");
}

#[test]
fn test_absent_origin_removes_the_file() {
    let (_tmp, root, mut backups) = setup();
    let target = root.join("new/introduced.fmf");

    backups.preserve(&target, "A").unwrap();
    assert_eq!(backups.get(&target).unwrap().origin, BackupOrigin::Absent);

    fs::create_dir_all(target.parent().unwrap()).unwrap();
    fs::write(&target, b"from the mod").unwrap();
    backups.restore(&target).unwrap();

    assert!(!target.exists());
    assert!(!backups.has_backup(&target));
}

#[test]
fn test_tampered_sidecar_keeps_the_backup() {
    let (_tmp, root, mut backups) = setup();
    let target = root.join("file.bundle");
    fs::write(&target, b"pristine").unwrap();

    backups.preserve(&target, "A").unwrap();
    fs::write(&target, b"modded").unwrap();
    let sidecar = BackupRecord::sidecar_for(&target);
    fs::write(&sidecar, b"corrupted").unwrap();

    let err = backups.restore(&target).unwrap_err();
    assert!(matches!(err, SError::BackupRestoreFailure { .. }));
    assert!(sidecar.exists());
    assert!(backups.has_backup(&target));
    assert_eq!(fs::read(&target).unwrap(), b"modded");
}

#[test]
fn test_ledger_survives_reload_and_transfer() {
    let (_tmp, root, mut backups) = setup();
    let ledger = root.join("backups.toml");
    let target = root.join("file.bundle");
    fs::write(&target, b"pristine").unwrap();

    backups.preserve(&target, "A").unwrap();
    backups.transfer(&target, "B").unwrap();
    drop(backups);

    let reloaded = BackupManager::load(&ledger).unwrap();
    let record = reloaded.get(&target).unwrap();
    assert_eq!(record.owner, "B");
    assert_eq!(record.origin, BackupOrigin::File);
    assert!(record.digest.is_some());
    assert_eq!(reloaded.owned_by("B"), vec![target.clone()]);
}
