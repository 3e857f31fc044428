//! Failure handling and orchestration tests for the backup pipeline.
//!
//! These tests damage artifacts on disk, swap registries and nest
//! destinations, and check that every failure names its stage and leaves no
//! untrusted output behind.

mod common;

use std::fs::{self, OpenOptions};
use std::path::Path;

use backpipe::compress::COMPRESSION_HEADER_SIZE;
use backpipe::progress::StageLog;
use backpipe::{
    ArtifactDetail, BackupConfig, BackupReport, BasicPacker, Error, FixedDecisions, Pipeline, Registry, Stage,
    StageKind, XorEncryptor,
};
use tempfile::TempDir;

fn backup(tmp: &Path, configure: impl FnOnce(BackupConfig) -> BackupConfig) -> BackupReport {
    let source = common::sample_tree(tmp);
    let config = configure(BackupConfig::new(&source, tmp.join("backups")));
    Pipeline::new()
        .backup(&config, &mut FixedDecisions::default())
        .expect("backup failed")
}

fn restore_dir(tmp: &Path) -> std::path::PathBuf {
    let dir = tmp.join("restore");
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn flip_byte(path: &Path, offset: usize) {
    let mut data = fs::read(path).unwrap();
    data[offset] ^= 0x5A;
    fs::write(path, data).unwrap();
}

#[test]
fn test_wrong_key_leaves_no_plaintext() {
    let tmp = TempDir::new().unwrap();
    let report = backup(tmp.path(), |c| c.compress("Huffman").encrypt("SimXOR", "right"));
    let restore = restore_dir(tmp.path());

    let err = Pipeline::new()
        .recover(&report.record, &restore, &mut FixedDecisions::default().key("wrong"))
        .unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Decrypt));
    assert!(err.is_corruption());
    assert!(common::list_dir(&restore).is_empty());
    assert_eq!(
        common::list_dir(&report.record.destination_directory),
        vec![report.record.backup_file_name.clone()]
    );
}

#[test]
fn test_corrupted_ciphertext_detected() {
    let tmp = TempDir::new().unwrap();
    let report = backup(tmp.path(), |c| c.encrypt("SimXOR", "pw"));
    flip_byte(&report.artifact, 40);

    let err = Pipeline::new()
        .recover(
            &report.record,
            &restore_dir(tmp.path()),
            &mut FixedDecisions::default().key("pw"),
        )
        .unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Decrypt));
    assert!(matches!(err.root_cause(), Error::ChecksumMismatch { .. }));
}

#[test]
fn test_corrupted_sealed_archive_leaves_nothing_behind() {
    let tmp = TempDir::new().unwrap();
    let report = backup(tmp.path(), |c| c.compress("Huffman").encrypt("SimXOR", "pw"));
    assert!(report.record.backup_file_name.ends_with(".huff.enc"));
    let len = fs::metadata(&report.artifact).unwrap().len() as usize;
    flip_byte(&report.artifact, len / 2);

    let restore = restore_dir(tmp.path());
    let err = Pipeline::new()
        .recover(&report.record, &restore, &mut FixedDecisions::default().key("pw"))
        .unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Decrypt));
    assert!(matches!(err.root_cause(), Error::ChecksumMismatch { .. }), "{err}");
    assert!(common::list_dir(&restore).is_empty());
    assert_eq!(
        common::list_dir(&report.record.destination_directory),
        vec![report.record.backup_file_name.clone()]
    );
}

#[test]
fn test_corrupted_payload_detected() {
    let tmp = TempDir::new().unwrap();
    let report = backup(tmp.path(), |c| c.compress("Huffman"));
    let header = fs::read(&report.artifact).unwrap();
    let table = u32::from_le_bytes(header[8..12].try_into().unwrap()) as usize;
    flip_byte(&report.artifact, COMPRESSION_HEADER_SIZE as usize + table + 100);

    let restore = restore_dir(tmp.path());
    let err = Pipeline::new()
        .recover(&report.record, &restore, &mut FixedDecisions::default())
        .unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Decompress));
    assert!(matches!(err.root_cause(), Error::ChecksumMismatch { .. }), "{err}");
    assert!(common::list_dir(&restore).is_empty());
    // The half-decoded container was removed.
    assert_eq!(common::list_dir(&report.record.destination_directory).len(), 1);
}

#[test]
fn test_truncated_artifact_detected() {
    let tmp = TempDir::new().unwrap();
    let report = backup(tmp.path(), |c| c.compress("Huffman"));
    OpenOptions::new()
        .write(true)
        .open(&report.artifact)
        .unwrap()
        .set_len(12)
        .unwrap();

    let err = Pipeline::new()
        .recover(&report.record, &restore_dir(tmp.path()), &mut FixedDecisions::default())
        .unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Decompress));
    assert!(matches!(err.root_cause(), Error::TruncatedData { .. }));
}

#[test]
fn test_replaced_artifact_is_not_a_container() {
    let tmp = TempDir::new().unwrap();
    let report = backup(tmp.path(), |c| c.pack("Basic"));
    fs::write(&report.artifact, b"hello world").unwrap();

    let err = Pipeline::new()
        .recover(&report.record, &restore_dir(tmp.path()), &mut FixedDecisions::default())
        .unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Unpack));
    assert!(matches!(
        err.root_cause(),
        Error::FormatMismatch {
            expected: StageKind::Packed,
            marker: b'h',
            ..
        }
    ));
}

#[test]
fn test_unregistered_tag_is_unsupported() {
    let tmp = TempDir::new().unwrap();
    let report = backup(tmp.path(), |c| c.encrypt("SimXOR", "pw"));
    // Same marker, unknown cipher.
    let mut data = fs::read(&report.artifact).unwrap();
    data[1] = 0x09;
    fs::write(&report.artifact, data).unwrap();

    let err = Pipeline::new()
        .recover(
            &report.record,
            &restore_dir(tmp.path()),
            &mut FixedDecisions::default().key("pw"),
        )
        .unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Decrypt));
    assert!(matches!(
        err.root_cause(),
        Error::UnsupportedAlgorithm {
            kind: StageKind::Encrypted,
            ..
        }
    ));
}

#[test]
fn test_registry_without_compressor() {
    let tmp = TempDir::new().unwrap();
    let report = backup(tmp.path(), |c| c.compress("Huffman"));

    let mut registry = Registry::empty();
    registry
        .register_packer("Basic", 0x00, || Box::new(BasicPacker::new()))
        .register_encryptor("SimXOR", 0x01, || Box::new(XorEncryptor::new()));
    let pipeline = Pipeline::with_registry(registry);
    assert!(pipeline.registry().compressors().is_empty());

    let err = pipeline
        .recover(&report.record, &restore_dir(tmp.path()), &mut FixedDecisions::default())
        .unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Decompress));
    assert!(err.is_config_error());

    // Backups that need the missing stage fail before anything is written.
    let source = tmp.path().join("docs");
    let out = tmp.path().join("other");
    let config = BackupConfig::new(&source, &out).compress("Huffman");
    let err = pipeline
        .backup(&config, &mut FixedDecisions::default())
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedAlgorithm { .. }));
    assert!(common::list_dir(&out).is_empty());
}

#[test]
fn test_destination_inside_source_is_skipped() {
    let tmp = TempDir::new().unwrap();
    let source = common::sample_tree(tmp.path());
    let config = BackupConfig::new(&source, source.join(".backups")).pack("Basic");
    let report = Pipeline::new()
        .backup(&config, &mut FixedDecisions::default())
        .unwrap();

    let restore = restore_dir(tmp.path());
    Pipeline::new()
        .recover(&report.record, &restore, &mut FixedDecisions::default())
        .unwrap();
    assert!(!restore.join("docs/.backups").exists());
    assert_eq!(
        fs::read(restore.join("docs/readme.txt")).unwrap(),
        fs::read(source.join("readme.txt")).unwrap()
    );
}

#[test]
fn test_stage_log_sees_every_stage() {
    let tmp = TempDir::new().unwrap();
    let source = common::sample_tree(tmp.path());
    let config = BackupConfig::new(&source, tmp.path().join("backups"))
        .extra_source(tmp.path().join("elsewhere"))
        .compress("Huffman")
        .encrypt("SimXOR", "pw");

    let mut log = StageLog::new();
    let report = Pipeline::new()
        .backup_with_progress(&config, &mut FixedDecisions::default(), &mut log)
        .unwrap();
    assert_eq!(log.started(), &[Stage::Pack, Stage::Compress, Stage::Encrypt]);
    assert_eq!(log.events().last().unwrap().output, report.artifact);
    assert_eq!(log.warnings().iter().filter(|w| w.contains("elsewhere")).count(), 1);

    let mut log = StageLog::new();
    Pipeline::new()
        .recover_with_progress(
            &report.record,
            &restore_dir(tmp.path()),
            &mut FixedDecisions::default().key("pw"),
            &mut log,
        )
        .unwrap();
    let stages: Vec<_> = log.events().iter().map(|e| e.stage).collect();
    assert_eq!(stages, vec![Stage::Decrypt, Stage::Decompress, Stage::Unpack]);
}

#[test]
fn test_inspect_container_lists_entries() {
    let tmp = TempDir::new().unwrap();
    let report = backup(tmp.path(), |c| c.pack("Basic"));

    let info = Pipeline::new().inspect(&report.artifact).unwrap();
    let class = info.class.expect("container not recognized");
    assert_eq!(class.signature.kind, StageKind::Packed);
    assert_eq!(class.algorithm.as_deref(), Some("Basic"));
    match info.detail {
        ArtifactDetail::Container { header, entries } => {
            assert_eq!(header.entry_count as usize, entries.len());
            assert_eq!(entries.len(), report.entries);
            assert_eq!(entries[0].name, "docs");
            assert!(entries.iter().any(|e| e.name == "docs/media/blob.bin"));
        }
        other => panic!("unexpected detail {:?}", other),
    }
}

#[test]
fn test_inspect_missing_file() {
    let tmp = TempDir::new().unwrap();
    let err = Pipeline::new().inspect(&tmp.path().join("nope")).unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[test]
fn test_recover_missing_artifact() {
    let tmp = TempDir::new().unwrap();
    let report = backup(tmp.path(), |c| c.pack("Basic"));
    fs::remove_file(&report.artifact).unwrap();

    let err = Pipeline::new()
        .recover(&report.record, &restore_dir(tmp.path()), &mut FixedDecisions::default())
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { path } if path == report.artifact));
}

#[test]
fn test_mirror_into_source_parent_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let source = common::sample_tree(tmp.path());
    let before = common::snapshot(&source);

    let config = BackupConfig::new(&source, tmp.path());
    let err = Pipeline::new()
        .backup(&config, &mut FixedDecisions::default().overwrite(true))
        .unwrap_err();
    assert!(matches!(err.root_cause(), Error::InvalidConfig(_)), "{err}");
    assert_eq!(common::snapshot(&source), before);
}

#[test]
fn test_copy_restore_onto_backup_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let report = backup(tmp.path(), |c| c);
    let backups = report.record.destination_directory.clone();
    let before = common::snapshot(&report.artifact);

    let err = Pipeline::new()
        .recover(&report.record, &backups, &mut FixedDecisions::default().overwrite(true))
        .unwrap_err();
    assert!(matches!(err.root_cause(), Error::InvalidConfig(_)), "{err}");
    assert_eq!(common::snapshot(&report.artifact), before);
}
