mod common;

use common::{dir_is_empty, utf8_root, write_zip};
use mod_deployer::config::limits::ExtractionLimits;
use mod_deployer::core::decompression::SafeArchiveExtractor;
use mod_deployer::models::error::{ArchiveViolation, SError};
use std::fs;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const MANIFEST: &[u8] = br#"{"name":"m","version":"1.0.0","type":"misc","author":"t","files":[{"source":"a.txt","target_subpath":"a.txt"}]}"#;

fn violation(result: Result<camino::Utf8PathBuf, SError>) -> ArchiveViolation {
    match result {
        Err(SError::ArchiveSecurity { violation, .. }) => violation,
        other => panic!("expected ArchiveSecurity, got {other:?}"),
    }
}

#[test]
fn test_extracts_into_fresh_staging_dir() {
    let tmp = tempfile::tempdir().unwrap();
    let root = utf8_root(&tmp);
    let archive = root.join("mod.zip");
    write_zip(
        &archive,
        &[("manifest.json", MANIFEST), ("a.txt", b"hello"), ("nested/b.txt", b"world")],
    );

    let staging = root.join("staging");
    let out = SafeArchiveExtractor::new(ExtractionLimits::default())
        .extract(&archive, &staging)
        .expect("archive should extract");

    assert!(out.starts_with(&staging));
    assert_eq!(fs::read(out.join("a.txt")).unwrap(), b"hello");
    assert_eq!(fs::read(out.join("nested/b.txt")).unwrap(), b"world");
}

#[test]
fn test_traversal_entry_leaves_nothing_behind() {
    let tmp = tempfile::tempdir().unwrap();
    let root = utf8_root(&tmp);
    let archive = root.join("evil.zip");
    write_zip(
        &archive,
        &[("manifest.json", MANIFEST), ("a.txt", b"fine"), ("../../escaped.txt", b"gotcha")],
    );

    let staging = root.join("staging");
    let v = violation(SafeArchiveExtractor::new(ExtractionLimits::default()).extract(&archive, &staging));

    assert!(matches!(v, ArchiveViolation::PathTraversal(_)));
    assert!(dir_is_empty(&staging));
    assert!(!root.join("escaped.txt").exists());
    assert!(!tmp.path().parent().unwrap().join("escaped.txt").exists());
}

#[test]
fn test_missing_manifest_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let root = utf8_root(&tmp);
    let archive = root.join("bare.zip");
    write_zip(&archive, &[("sub/manifest.json", MANIFEST), ("a.txt", b"x")]);

    let staging = root.join("staging");
    let v = violation(SafeArchiveExtractor::new(ExtractionLimits::default()).extract(&archive, &staging));
    assert_eq!(v, ArchiveViolation::MissingDescriptor);
    assert!(dir_is_empty(&staging));
}

#[test]
fn test_total_size_ceiling() {
    let tmp = tempfile::tempdir().unwrap();
    let root = utf8_root(&tmp);
    let archive = root.join("big.zip");
    let big = vec![7u8; 64 * 1024];
    write_zip(&archive, &[("manifest.json", MANIFEST), ("a.txt", &big)]);

    let limits = ExtractionLimits {
        max_total_bytes: 16 * 1024,
        max_entry_ratio: u64::MAX / 4,
        ..ExtractionLimits::default()
    };
    let staging = root.join("staging");
    let v = violation(SafeArchiveExtractor::new(limits).extract(&archive, &staging));

    assert_eq!(v, ArchiveViolation::SizeCeiling(16 * 1024));
    assert!(dir_is_empty(&staging));
}

#[test]
fn test_compression_ratio_ceiling() {
    let tmp = tempfile::tempdir().unwrap();
    let root = utf8_root(&tmp);
    let archive = root.join("bomb.zip");
    let zeros = vec![0u8; 4 * 1024 * 1024];
    write_zip(&archive, &[("manifest.json", MANIFEST), ("a.txt", &zeros)]);

    let staging = root.join("staging");
    let v = violation(SafeArchiveExtractor::new(ExtractionLimits::default()).extract(&archive, &staging));

    assert!(matches!(v, ArchiveViolation::RatioCeiling { limit: 100, .. }));
    assert!(dir_is_empty(&staging));
}

#[test]
fn test_entry_count_ceiling() {
    let tmp = tempfile::tempdir().unwrap();
    let root = utf8_root(&tmp);
    let archive = root.join("many.zip");
    write_zip(
        &archive,
        &[("manifest.json", MANIFEST), ("a.txt", b"1"), ("b.txt", b"2"), ("c.txt", b"3")],
    );

    let limits = ExtractionLimits {
        max_entries: 3,
        ..ExtractionLimits::default()
    };
    let v = violation(SafeArchiveExtractor::new(limits).extract(&archive, &root.join("staging")));
    assert_eq!(v, ArchiveViolation::TooManyEntries(3));
}

#[test]
fn test_symlink_entry_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let root = utf8_root(&tmp);
    let archive = root.join("link.zip");
    {
        let file = fs::File::create(&archive).unwrap();
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default();
        zip.start_file("manifest.json", options).unwrap();
        std::io::Write::write_all(&mut zip, MANIFEST).unwrap();
        zip.add_symlink("a.txt", "/etc/passwd", options).unwrap();
        zip.finish().unwrap();
    }

    let staging = root.join("staging");
    let v = violation(SafeArchiveExtractor::new(ExtractionLimits::default()).extract(&archive, &staging));
    assert!(matches!(v, ArchiveViolation::Link(_)));
    assert!(dir_is_empty(&staging));
}

#[test]
fn test_garbage_is_corrupt() {
    let tmp = tempfile::tempdir().unwrap();
    let root = utf8_root(&tmp);
    let archive = root.join("junk.zip");
    fs::write(&archive, b"definitely not a zip").unwrap();

    let v = violation(SafeArchiveExtractor::new(ExtractionLimits::default()).extract(&archive, &root.join("staging")));
    assert!(matches!(v, ArchiveViolation::Corrupt(_)));
}
