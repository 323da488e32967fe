#![allow(dead_code)]

use camino::{Utf8Path, Utf8PathBuf};
use mod_deployer::config::AppSettings;
use mod_deployer::core::workspace::Workspace;
use serde_json::{json, Value};
use std::fs;
use std::io::Write;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

pub fn utf8_root(tmp: &TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).unwrap()
}

/// Portable workspace with empty game, asset and user folders.
pub fn setup_test_env() -> (TempDir, Workspace) {
    let (tmp, settings) = test_settings();
    let ws = Workspace::open(settings).expect("Failed to open workspace");
    (tmp, ws)
}

pub fn test_settings() -> (TempDir, AppSettings) {
    let tmp = tempfile::tempdir().unwrap();
    let root = utf8_root(&tmp);
    let settings = AppSettings::portable(&root);

    for dir in [
        settings.game_root.as_ref(),
        settings.asset_root.as_ref(),
        settings.user_dir.as_ref(),
    ]
    .into_iter()
    .flatten()
    {
        fs::create_dir_all(dir).unwrap();
    }
    (tmp, settings)
}

pub fn manifest(name: &str, mod_type: &str, files: Value) -> Value {
    json!({
        "name": name,
        "version": "1.0.0",
        "type": mod_type,
        "author": "test",
        "files": files,
    })
}

/// Writes `manifest.json` plus payload files into `dir` and returns it.
pub fn write_mod_dir(dir: &Utf8Path, manifest: &Value, payload: &[(&str, &[u8])]) -> Utf8PathBuf {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join("manifest.json"), serde_json::to_vec_pretty(manifest).unwrap()).unwrap();
    for (rel, bytes) in payload {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, bytes).unwrap();
    }
    dir.to_owned()
}

/// Single-file copy mod: `source` in the payload goes to `target`.
pub fn copy_mod(parent: &Utf8Path, name: &str, target: &str, content: &[u8]) -> Utf8PathBuf {
    let m = manifest(
        name,
        "ui",
        json!([{ "source": "payload.bin", "target_subpath": target }]),
    );
    write_mod_dir(&parent.join(format!("src_{name}")), &m, &[("payload.bin", content)])
}

pub fn write_zip(path: &Utf8Path, entries: &[(&str, &[u8])]) {
    let file = fs::File::create(path).unwrap();
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default();
    for (name, bytes) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap();
}

pub fn dir_is_empty(dir: &Utf8Path) -> bool {
    !dir.exists() || fs::read_dir(dir).unwrap().next().is_none()
}
