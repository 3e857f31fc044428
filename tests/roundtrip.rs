//! Round-trip integration tests for backpipe.
//!
//! Each test backs a tree up with one stage combination, recovers it into a
//! fresh directory and compares the result with the source.

mod common;

use std::fs;

use backpipe::{BackupConfig, FixedDecisions, Pipeline, Stage};
use tempfile::TempDir;

fn roundtrip(configure: impl FnOnce(BackupConfig) -> BackupConfig, key: Option<&str>) -> Vec<Stage> {
    let tmp = TempDir::new().unwrap();
    let source = common::sample_tree(tmp.path());
    let backups = tmp.path().join("backups");
    let restore = tmp.path().join("restore");
    fs::create_dir(&restore).unwrap();

    let config = configure(BackupConfig::new(&source, &backups));
    let pipeline = Pipeline::new();
    let report = pipeline
        .backup(&config, &mut FixedDecisions::default())
        .expect("backup failed");
    assert!(report.artifact.exists());
    assert_eq!(report.record.artifact_path(), report.artifact);

    let mut decisions = FixedDecisions::default();
    if let Some(key) = key {
        decisions = decisions.key(key);
    }
    let recovered = pipeline
        .recover(&report.record, &restore, &mut decisions)
        .expect("recovery failed");

    common::assert_same_tree(&source, &restore.join("docs"));
    recovered.stages
}

#[test]
fn test_mirror_roundtrip() {
    let stages = roundtrip(|c| c, None);
    assert_eq!(stages, vec![Stage::Copy]);
}

#[test]
fn test_pack_roundtrip() {
    let stages = roundtrip(|c| c.pack("Basic"), None);
    assert_eq!(stages, vec![Stage::Unpack]);
}

#[test]
fn test_pack_compress_roundtrip() {
    let stages = roundtrip(|c| c.compress("Huffman"), None);
    assert_eq!(stages, vec![Stage::Decompress, Stage::Unpack]);
}

#[test]
fn test_pack_encrypt_roundtrip() {
    let stages = roundtrip(|c| c.encrypt("SimXOR", "hunter2"), Some("hunter2"));
    assert_eq!(stages, vec![Stage::Decrypt, Stage::Unpack]);
}

#[test]
fn test_all_stages_roundtrip() {
    let stages = roundtrip(
        |c| c.pack("Basic").compress("Huffman").encrypt("SimXOR", "k3y"),
        Some("k3y"),
    );
    assert_eq!(stages, vec![Stage::Decrypt, Stage::Decompress, Stage::Unpack]);
}

#[test]
fn test_single_file_source() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("ledger.csv");
    let data = common::skewed_text(70 * 1024, 3);
    fs::write(&file, &data).unwrap();

    let config = BackupConfig::new(&file, tmp.path().join("backups")).compress("Huffman");
    let report = Pipeline::new()
        .backup(&config, &mut FixedDecisions::default())
        .unwrap();
    assert_eq!(report.entries, 1);
    assert_eq!(report.record.file_name, "ledger.csv");
    // Skewed text must come out smaller.
    assert!(fs::metadata(&report.artifact).unwrap().len() < data.len() as u64);

    let restore = tmp.path().join("restore");
    fs::create_dir(&restore).unwrap();
    Pipeline::new()
        .recover(&report.record, &restore, &mut FixedDecisions::default())
        .unwrap();
    assert_eq!(fs::read(restore.join("ledger.csv")).unwrap(), data);
}

#[test]
fn test_unicode_names_roundtrip() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("archiv");
    common::write_tree(
        &source,
        &[
            ("日本語/ファイル.txt", "こんにちは".as_bytes()),
            ("ελληνικά.txt", "γειά".as_bytes()),
            ("emoji 🎉/party.txt", b"!"),
        ],
    );

    let config = BackupConfig::new(&source, tmp.path().join("backups"))
        .compress("Huffman")
        .encrypt("SimXOR", "ключ");
    let report = Pipeline::new()
        .backup(&config, &mut FixedDecisions::default())
        .unwrap();

    let restore = tmp.path().join("restore");
    fs::create_dir(&restore).unwrap();
    Pipeline::new()
        .recover(&report.record, &restore, &mut FixedDecisions::default().key("ключ"))
        .unwrap();
    common::assert_same_tree(&source, &restore.join("archiv"));
}

#[test]
fn test_non_recursive_pack_keeps_top_level_only() {
    let tmp = TempDir::new().unwrap();
    let source = common::sample_tree(tmp.path());
    let config = BackupConfig::new(&source, tmp.path().join("backups"))
        .pack("Basic")
        .recursive(false);
    let report = Pipeline::new()
        .backup(&config, &mut FixedDecisions::default())
        .unwrap();

    let restore = tmp.path().join("restore");
    fs::create_dir(&restore).unwrap();
    Pipeline::new()
        .recover(&report.record, &restore, &mut FixedDecisions::default())
        .unwrap();

    let restored = restore.join("docs");
    assert!(restored.join("readme.txt").is_file());
    assert!(restored.join("notes").is_dir());
    assert!(!restored.join("notes/todo.md").exists());
}

#[test]
fn test_empty_directory_source() {
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("void");
    fs::create_dir(&source).unwrap();

    let config = BackupConfig::new(&source, tmp.path().join("backups")).compress("Huffman");
    let report = Pipeline::new()
        .backup(&config, &mut FixedDecisions::default())
        .unwrap();
    assert_eq!(report.entries, 1);

    let restore = tmp.path().join("restore");
    fs::create_dir(&restore).unwrap();
    let recovered = Pipeline::new()
        .recover(&report.record, &restore, &mut FixedDecisions::default())
        .unwrap();
    assert!(restore.join("void").is_dir());
    assert_eq!(recovered.unpacked.unwrap().directories, 1);
}
