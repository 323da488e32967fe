mod common;

use common::{manifest, utf8_root, write_mod_dir};
use mod_deployer::core::validator::ManifestValidator;
use mod_deployer::models::error::SError;
use mod_deployer::models::manifest::{ModType, Operation, Platform};
use serde_json::json;

fn violations(value: serde_json::Value) -> mod_deployer::models::error::ManifestViolations {
    match ManifestValidator::new().unwrap().validate(&value) {
        Err(SError::ManifestError(v)) => v,
        other => panic!("expected ManifestError, got {other:?}"),
    }
}

#[test]
fn test_valid_manifest_gets_defaults() {
    let v = ManifestValidator::new().unwrap();
    let m = v
        .validate(&json!({
            "name": "Better UI",
            "version": "2.10.0",
            "type": "ui",
            "author": "someone",
            "description": "nicer panels",
            "files": [
                { "source": "panel.bundle", "target_subpath": "panel.bundle" },
                { "target_subpath": "data/db/1800/english.ltc", "operation": "delete", "backup": false }
            ]
        }))
        .expect("manifest should be valid");

    assert_eq!(m.mod_type, ModType::Ui);
    assert_eq!(m.revision(), "Better UI@2.10.0");
    assert_eq!(m.files[0].platform, Platform::All);
    assert_eq!(m.files[0].operation, Operation::Copy);
    assert!(m.files[0].backup);
    assert_eq!(m.files[1].operation, Operation::Delete);
    assert!(m.files[1].source.is_none());
    assert!(!m.files[1].backup);
}

#[test]
fn test_every_violation_is_reported() {
    let v = violations(json!({
        "name": "x",
        "version": "1.0",
        "type": "shader",
        "files": []
    }));

    assert!(v.mentions("version"));
    assert!(v.mentions("type"));
    assert!(v.mentions("author"));
    assert!(v.mentions("files"));
    assert_eq!(v.len(), 4);
}

#[test]
fn test_target_paths_must_stay_relative() {
    let v = violations(manifest(
        "paths",
        "misc",
        json!([
            { "source": "a", "target_subpath": "/etc/passwd" },
            { "source": "a", "target_subpath": "..\\..\\boot.ini" },
            { "source": "a", "target_subpath": "C:\\Windows\\a.txt" },
            { "source": "a", "target_subpath": "\\server\\share" },
            { "source": "a", "target_subpath": "ok/file.txt" }
        ]),
    ));

    for i in 0..4 {
        assert!(v.mentions(&format!("files[{i}].target_subpath")), "entry {i}");
    }
    assert!(!v.mentions("files[4].target_subpath"));
}

#[test]
fn test_reserved_names_rejected_for_copy_and_delete() {
    let v = violations(manifest(
        "reserved",
        "misc",
        json!([
            { "source": "a", "target_subpath": "fm26.exe" },
            { "target_subpath": "FM26.exe", "operation": "delete" },
            { "target_subpath": "fm_Data/globalgamemanagers", "operation": "delete" }
        ]),
    ));
    assert_eq!(v.len(), 3);
}

#[test]
fn test_copy_needs_safe_source() {
    let v = violations(manifest(
        "sources",
        "misc",
        json!([
            { "target_subpath": "a.txt" },
            { "source": "../outside.txt", "target_subpath": "b.txt" },
            { "source": "ok.txt", "target_subpath": "c.txt", "operation": "move" },
            { "source": "ok.txt", "target_subpath": "d.txt", "platform": "linux", "backup": "yes" }
        ]),
    ));

    assert!(v.mentions("files[0].source"));
    assert!(v.mentions("files[1].source"));
    assert!(v.mentions("files[2].operation"));
    assert!(v.mentions("files[3].platform"));
    assert!(v.mentions("files[3].backup"));
}

#[test]
fn test_name_must_be_a_folder_name() {
    let v = violations(manifest("a/b", "misc", json!([{ "source": "a", "target_subpath": "a" }])));
    assert!(v.mentions("name"));
    let v = violations(manifest("NUL", "misc", json!([{ "source": "a", "target_subpath": "a" }])));
    assert!(v.mentions("name"));
}

#[test]
fn test_payload_sources_must_exist() {
    let tmp = tempfile::tempdir().unwrap();
    let root = utf8_root(&tmp);
    let m = manifest(
        "payload",
        "misc",
        json!([
            { "source": "present.txt", "target_subpath": "a.txt" },
            { "source": "missing.txt", "target_subpath": "b.txt" },
            { "target_subpath": "c.ltc", "operation": "delete" }
        ]),
    );
    let dir = write_mod_dir(&root.join("payload"), &m, &[("present.txt", b"x")]);

    let v = ManifestValidator::new().unwrap();
    let parsed = v.read(&dir.join("manifest.json")).unwrap();
    match v.verify_payload(&parsed, &dir) {
        Err(SError::ManifestError(violations)) => {
            assert_eq!(violations.len(), 1);
            assert!(violations.mentions("files[1].source"));
        }
        other => panic!("expected ManifestError, got {other:?}"),
    }
}

#[test]
fn test_unparseable_file_is_a_parse_error() {
    let tmp = tempfile::tempdir().unwrap();
    let root = utf8_root(&tmp);
    let path = root.join("manifest.json");
    std::fs::write(&path, "{ not json").unwrap();

    let err = ManifestValidator::new().unwrap().read(&path).unwrap_err();
    assert!(matches!(err, SError::ParseError(_)));
}
