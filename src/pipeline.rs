//! Chains the stages into a backup and unwinds them on recovery.
//!
//! A backup either mirrors the source tree into the destination, or packs
//! it into one container which is then optionally compressed and
//! encrypted. Each stage consumes the previous stage's artifact and the
//! previous artifact is deleted once the next one exists. Recovery reads
//! the marker bytes of the recorded artifact and undoes encryption, then
//! compression, then packing.
//!
//! # Example
//!
//! ```rust,no_run
//! use backpipe::{BackupConfig, FixedDecisions, Pipeline};
//!
//! let pipeline = Pipeline::new();
//! let config = BackupConfig::new("docs", "backups")
//!     .compress("Huffman")
//!     .encrypt("SimXOR", "hunter2");
//! let report = pipeline.backup(&config, &mut FixedDecisions::default())?;
//!
//! let mut decisions = FixedDecisions::default().key("hunter2");
//! pipeline.recover(&report.record, "restore".as_ref(), &mut decisions)?;
//! # Ok::<(), backpipe::Error>(())
//! ```

use std::fmt;
use std::fs::{self as stdfs, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{debug, info, warn};

use crate::compress::CompressionHeader;
use crate::config::BackupConfig;
use crate::encrypt::EncryptionHeader;
use crate::format::reader::read_full;
use crate::format::{ArtifactClass, Registry, StageKind};
use crate::fs::{
    collect_entries, copy_file, copy_symlink, copy_tree, ensure_dir, is_writable_dir,
    relative_name, remove_path, strip_last_extension,
};
use crate::pack::{ContainerHeader, FileEntryMeta, PackOptions, UnpackSummary};
use crate::progress::{NoProgress, ProgressReporter};
use crate::record::BackupRecord;
use crate::{Error, Result};

/// One step of a backup or recovery run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Packing the source into a container.
    Pack,
    /// Compressing the container.
    Compress,
    /// Encrypting the latest artifact.
    Encrypt,
    /// Decrypting an encrypted artifact.
    Decrypt,
    /// Decompressing a compressed artifact.
    Decompress,
    /// Extracting a container.
    Unpack,
    /// Mirror-copying files.
    Copy,
}

impl Stage {
    /// Returns the lowercase stage name.
    pub fn name(self) -> &'static str {
        match self {
            Stage::Pack => "pack",
            Stage::Compress => "compress",
            Stage::Encrypt => "encrypt",
            Stage::Decrypt => "decrypt",
            Stage::Decompress => "decompress",
            Stage::Unpack => "unpack",
            Stage::Copy => "copy",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Answers the questions a run may need to ask its user.
pub trait Decisions {
    /// Returns `true` to replace `existing`.
    fn confirm_overwrite(&mut self, existing: &Path) -> bool;

    /// Returns the key for an encrypted artifact, or `None` to cancel.
    fn key_for(&mut self, artifact: &Path) -> Option<String>;
}

/// Canned answers for non-interactive use.
///
/// The default declines every overwrite and has no key.
#[derive(Debug, Clone, Default)]
pub struct FixedDecisions {
    /// Answer to every overwrite question.
    pub overwrite: bool,
    /// Key handed out for every encrypted artifact.
    pub key: Option<String>,
}

impl FixedDecisions {
    /// Sets the overwrite answer.
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Sets the key.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

impl Decisions for FixedDecisions {
    fn confirm_overwrite(&mut self, existing: &Path) -> bool {
        debug!("overwrite {}: {}", existing.display(), self.overwrite);
        self.overwrite
    }

    fn key_for(&mut self, _artifact: &Path) -> Option<String> {
        self.key.clone()
    }
}

/// Outcome of a successful backup.
#[derive(Debug, Clone)]
pub struct BackupReport {
    /// The final artifact: a container, its compressed or encrypted form,
    /// or the mirrored copy.
    pub artifact: PathBuf,
    /// Stages that ran, in order.
    pub stages: Vec<Stage>,
    /// Number of enumerated entries, the source root included.
    pub entries: usize,
    /// Record describing the backup, ready for a [`RecordStore`](crate::RecordStore).
    pub record: BackupRecord,
}

/// Outcome of a successful recovery.
#[derive(Debug, Clone)]
pub struct RecoveryReport {
    /// Stages that ran, in order.
    pub stages: Vec<Stage>,
    /// Where the data was restored: the destination directory after an
    /// unpack, or the copied file or tree.
    pub restored: PathBuf,
    /// Extraction counts when a container was unpacked.
    pub unpacked: Option<UnpackSummary>,
}

/// Header-level view of an artifact.
#[derive(Debug, Clone)]
pub enum ArtifactDetail {
    /// No known marker; a mirrored file or directory.
    Plain,
    /// A container with its index.
    Container {
        /// The container header.
        header: ContainerHeader,
        /// The entry index, empty if the packer is not registered.
        entries: Vec<FileEntryMeta>,
    },
    /// A compressed artifact.
    Compressed(CompressionHeader),
    /// An encrypted artifact.
    Encrypted(EncryptionHeader),
}

/// What [`Pipeline::inspect`] learned about a file.
#[derive(Debug, Clone)]
pub struct ArtifactInfo {
    /// The inspected path.
    pub path: PathBuf,
    /// File size in bytes; 0 for directories.
    pub size: u64,
    /// Detected stage and algorithm, if any.
    pub class: Option<ArtifactClass>,
    /// Parsed header.
    pub detail: ArtifactDetail,
}

/// Runs backups and recoveries with the algorithms of a [`Registry`].
#[derive(Debug, Default)]
pub struct Pipeline {
    registry: Registry,
}

impl Pipeline {
    /// Creates a pipeline with the built-in algorithms.
    pub fn new() -> Self {
        Self::with_registry(Registry::new())
    }

    /// Creates a pipeline over a custom registry.
    pub fn with_registry(registry: Registry) -> Self {
        Self { registry }
    }

    /// Returns the registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Returns the registry for adding algorithms.
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Backs up `config.source` into `config.destination`.
    ///
    /// # Errors
    ///
    /// Configuration problems are returned as-is, before anything is
    /// written. Stage failures are wrapped in [`Error::Stage`]; artifacts of
    /// earlier stages are left in place.
    pub fn backup(&self, config: &BackupConfig, decisions: &mut dyn Decisions) -> Result<BackupReport> {
        self.backup_with_progress(config, decisions, &mut NoProgress)
    }

    /// Like [`backup`](Self::backup), reporting stage progress.
    pub fn backup_with_progress(
        &self,
        config: &BackupConfig,
        decisions: &mut dyn Decisions,
        progress: &mut dyn ProgressReporter,
    ) -> Result<BackupReport> {
        config.validate()?;
        for extra in &config.extra_sources {
            let message = format!("only the first source is backed up; ignoring {}", extra.display());
            warn!("{}", message);
            progress.on_warning(&message);
        }

        // Resolve every codec before touching the filesystem.
        let packer = if config.is_packing() {
            Some(self.registry.create_packer(config.packer_name())?)
        } else {
            None
        };
        let compressor = config
            .compress
            .as_deref()
            .map(|name| self.registry.create_compressor(name))
            .transpose()?;
        let encryptor = config
            .encrypt
            .as_deref()
            .map(|name| self.registry.create_encryptor(name))
            .transpose()?;

        let source = std::path::absolute(&config.source)?;
        let destination = std::path::absolute(&config.destination)?;
        let source_name = source
            .file_name()
            .ok_or_else(|| Error::InvalidConfig(format!("source has no file name: {}", source.display())))?
            .to_os_string();

        let mut entries = collect_entries(&source, config.recursive, config.follow_symlinks, |rel, is_dir| {
            config.should_include(rel, is_dir)
        })?;
        if destination != source && destination.starts_with(&source) {
            entries.retain(|path| !path.starts_with(&destination));
        }
        info!("backing up {} entries from {}", entries.len(), source.display());

        let mut stages = Vec::new();
        let artifact = match packer {
            None => {
                let target = destination.join(&source_name);
                if same_location(&target, &source) {
                    return Err(Error::InvalidConfig(format!(
                        "mirror target {} is the source itself",
                        target.display()
                    )));
                }
                self.mirror(&source, &entries, &target, config.follow_symlinks, decisions, progress)?;
                stages.push(Stage::Copy);
                target
            }
            Some(packer) => {
                let options = PackOptions {
                    follow_symlinks: config.follow_symlinks,
                };
                let mut artifact = run_stage(Stage::Pack, &source, progress, || {
                    packer.pack(&entries, &destination, &options)
                })?;
                stages.push(Stage::Pack);

                if let Some(compressor) = &compressor {
                    debug!(
                        "{} ignores compression level {}",
                        compressor.name(),
                        config.compression_level
                    );
                    let input = artifact.clone();
                    artifact = run_stage(Stage::Compress, &input, progress, || {
                        compressor.compress_file(&input)
                    })?;
                    stages.push(Stage::Compress);
                    discard_intermediate(&input, progress);
                }

                if let Some(encryptor) = &encryptor {
                    let input = artifact.clone();
                    artifact = run_stage(Stage::Encrypt, &input, progress, || {
                        encryptor.encrypt_file(&input, config.key.as_bytes())
                    })?;
                    stages.push(Stage::Encrypt);
                    discard_intermediate(&input, progress);
                }
                artifact
            }
        };

        let record = BackupRecord {
            file_name: source_name.to_string_lossy().into_owned(),
            source_full_path: source.clone(),
            destination_directory: destination,
            backup_file_name: artifact
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            backup_time: BackupRecord::timestamp_now(),
            is_encrypted: encryptor.is_some(),
            is_packed: config.is_packing(),
            is_compressed: compressor.is_some(),
            description: config.description.clone(),
        };
        info!("backup complete: {}", artifact.display());

        Ok(BackupReport {
            artifact,
            stages,
            entries: entries.len(),
            record,
        })
    }

    fn mirror(
        &self,
        source: &Path,
        entries: &[PathBuf],
        target: &Path,
        follow_symlinks: bool,
        decisions: &mut dyn Decisions,
        progress: &mut dyn ProgressReporter,
    ) -> Result<()> {
        if stdfs::symlink_metadata(target).is_ok() {
            if !decisions.confirm_overwrite(target) {
                info!("overwrite of {} declined", target.display());
                return Err(Error::Cancelled);
            }
            remove_path(target).map_err(|e| e.in_stage(Stage::Copy, target))?;
        }

        run_stage(Stage::Copy, source, progress, || {
            for entry in entries {
                let relative = relative_name(source, entry)?;
                let dest = if relative == "." {
                    target.to_path_buf()
                } else {
                    target.join(&relative)
                };
                let meta = if follow_symlinks {
                    stdfs::metadata(entry)?
                } else {
                    stdfs::symlink_metadata(entry)?
                };
                if meta.is_dir() {
                    ensure_dir(&dest)?;
                    continue;
                }
                if let Some(parent) = dest.parent() {
                    ensure_dir(parent)?;
                }
                if meta.file_type().is_symlink() {
                    copy_symlink(entry, &dest)?;
                } else if meta.is_file() {
                    copy_file(entry, &dest)?;
                } else {
                    warn!("skipping special file {}", entry.display());
                }
            }
            Ok(target.to_path_buf())
        })?;
        Ok(())
    }

    /// Restores the backup described by `record` into `dest_dir`.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if `dest_dir` or the artifact is missing,
    /// [`Error::DestinationNotWritable`] if `dest_dir` rejects writes,
    /// [`Error::Cancelled`] if no key is supplied or an overwrite is
    /// declined. Stage failures are wrapped in [`Error::Stage`].
    pub fn recover(
        &self,
        record: &BackupRecord,
        dest_dir: &Path,
        decisions: &mut dyn Decisions,
    ) -> Result<RecoveryReport> {
        self.recover_with_progress(record, dest_dir, decisions, &mut NoProgress)
    }

    /// Like [`recover`](Self::recover), reporting stage progress.
    pub fn recover_with_progress(
        &self,
        record: &BackupRecord,
        dest_dir: &Path,
        decisions: &mut dyn Decisions,
        progress: &mut dyn ProgressReporter,
    ) -> Result<RecoveryReport> {
        if !dest_dir.is_dir() {
            return Err(Error::NotFound {
                path: dest_dir.to_path_buf(),
            });
        }
        if !is_writable_dir(dest_dir) {
            return Err(Error::DestinationNotWritable {
                path: dest_dir.to_path_buf(),
            });
        }
        let artifact = record.artifact_path();
        if stdfs::symlink_metadata(&artifact).is_err() {
            return Err(Error::NotFound { path: artifact });
        }
        info!("recovering {} into {}", artifact.display(), dest_dir.display());

        if !record.is_packed {
            return self.restore_copy(record, &artifact, dest_dir, decisions, progress);
        }

        let mut stages = Vec::new();
        let mut current = artifact;
        // Output of the last decode step; removed once the next step succeeds.
        let mut intermediate: Option<PathBuf> = None;

        if let Some(name) = self.detected(&current, StageKind::Encrypted, Stage::Decrypt)? {
            let encryptor = self
                .registry
                .create_encryptor(&name)
                .map_err(|e| e.in_stage(Stage::Decrypt, &current))?;
            let key = decisions.key_for(&current).ok_or(Error::Cancelled)?;
            let output = strip_last_extension(&current);
            let input = current.clone();
            current = run_stage(Stage::Decrypt, &input, progress, || {
                encryptor
                    .decrypt_file(&input, &output, key.as_bytes())
                    .map(|()| output.clone())
            })?;
            stages.push(Stage::Decrypt);
            intermediate = Some(current.clone());
        }

        if let Some(name) = self.detected(&current, StageKind::Compressed, Stage::Decompress)? {
            let compressor = self
                .registry
                .create_compressor(&name)
                .map_err(|e| e.in_stage(Stage::Decompress, &current))?;
            let output = strip_last_extension(&current);
            let input = current.clone();
            current = run_stage(Stage::Decompress, &input, progress, || {
                compressor.decompress_file(&input, &output).map(|()| output.clone())
            })?;
            stages.push(Stage::Decompress);
            if let Some(previous) = intermediate.replace(current.clone()) {
                discard_intermediate(&previous, progress);
            }
        }

        let name = self
            .detected(&current, StageKind::Packed, Stage::Unpack)?
            .ok_or_else(|| {
                let head = leading_bytes(&current);
                Error::FormatMismatch {
                    expected: StageKind::Packed,
                    marker: head[0],
                    tag: head[1],
                }
                .in_stage(Stage::Unpack, &current)
            })?;
        let packer = self
            .registry
            .create_packer(&name)
            .map_err(|e| e.in_stage(Stage::Unpack, &current))?;

        progress.on_stage_start(Stage::Unpack, &current);
        let started = Instant::now();
        let summary = packer
            .unpack(&current, dest_dir)
            .map_err(|e| e.in_stage(Stage::Unpack, &current))?;
        progress.on_stage_complete(Stage::Unpack, dest_dir, started.elapsed());
        stages.push(Stage::Unpack);
        info!(
            "unpacked {} files and {} directories into {}",
            summary.files,
            summary.directories,
            dest_dir.display()
        );
        if let Some(previous) = intermediate {
            discard_intermediate(&previous, progress);
        }

        Ok(RecoveryReport {
            stages,
            restored: dest_dir.to_path_buf(),
            unpacked: Some(summary),
        })
    }

    fn restore_copy(
        &self,
        record: &BackupRecord,
        artifact: &Path,
        dest_dir: &Path,
        decisions: &mut dyn Decisions,
        progress: &mut dyn ProgressReporter,
    ) -> Result<RecoveryReport> {
        let name = record
            .source_full_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| record.file_name.clone().into());
        let target = dest_dir.join(name);
        if same_location(&target, artifact) {
            return Err(Error::InvalidConfig(format!(
                "restore target {} is the backup itself",
                target.display()
            )));
        }
        if stdfs::symlink_metadata(&target).is_ok() {
            if !decisions.confirm_overwrite(&target) {
                return Err(Error::Cancelled);
            }
            remove_path(&target).map_err(|e| e.in_stage(Stage::Copy, &target))?;
        }
        let restored = run_stage(Stage::Copy, artifact, progress, || {
            if let Some(parent) = target.parent() {
                ensure_dir(parent)?;
            }
            copy_tree(artifact, &target)?;
            Ok(target.clone())
        })?;
        Ok(RecoveryReport {
            stages: vec![Stage::Copy],
            restored,
            unpacked: None,
        })
    }

    /// Returns the registered algorithm if `path` carries the marker of
    /// `kind`.
    ///
    /// A marker whose tag nothing is registered for is an
    /// [`Error::UnsupportedAlgorithm`].
    fn detected(&self, path: &Path, kind: StageKind, stage: Stage) -> Result<Option<String>> {
        let class = self
            .registry
            .classify(path)
            .map_err(|e| e.in_stage(stage, path))?;
        match class {
            Some(class) if class.signature.kind == kind => match class.algorithm {
                Some(name) => Ok(Some(name)),
                None => Err(Error::UnsupportedAlgorithm {
                    kind,
                    name: format!("tag {:#04x}", class.signature.tag),
                }
                .in_stage(stage, path)),
            },
            _ => Ok(None),
        }
    }

    /// Classifies `path` and parses its header.
    pub fn inspect(&self, path: &Path) -> Result<ArtifactInfo> {
        let meta = stdfs::metadata(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                Error::Io(e)
            }
        })?;
        let class = self.registry.classify(path)?;
        let detail = match &class {
            None => ArtifactDetail::Plain,
            Some(class) => {
                let mut reader = BufReader::new(File::open(path)?);
                match class.signature.kind {
                    StageKind::Packed => {
                        let header = ContainerHeader::read_from(&mut reader)?;
                        let entries = match &class.algorithm {
                            Some(name) => self.registry.create_packer(name)?.list(path)?,
                            None => Vec::new(),
                        };
                        ArtifactDetail::Container { header, entries }
                    }
                    StageKind::Compressed => {
                        ArtifactDetail::Compressed(CompressionHeader::read_from(&mut reader)?)
                    }
                    StageKind::Encrypted => {
                        ArtifactDetail::Encrypted(EncryptionHeader::read_from(&mut reader)?)
                    }
                }
            }
        };
        Ok(ArtifactInfo {
            path: path.to_path_buf(),
            size: if meta.is_file() { meta.len() } else { 0 },
            class,
            detail,
        })
    }
}

fn run_stage<F>(stage: Stage, input: &Path, progress: &mut dyn ProgressReporter, f: F) -> Result<PathBuf>
where
    F: FnOnce() -> Result<PathBuf>,
{
    progress.on_stage_start(stage, input);
    let started = Instant::now();
    let output = f().map_err(|e| e.in_stage(stage, input))?;
    progress.on_stage_complete(stage, &output, started.elapsed());
    info!("{} finished: {}", stage, output.display());
    Ok(output)
}

/// Returns the first two bytes of `path`, zero-filled when unreadable.
fn leading_bytes(path: &Path) -> [u8; 2] {
    let mut head = [0u8; 2];
    if let Ok(mut file) = File::open(path) {
        let _ = read_full(&mut file, &mut head);
    }
    head
}

/// True when both paths name the same filesystem entry.
fn same_location(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (stdfs::canonicalize(a), stdfs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn discard_intermediate(path: &Path, progress: &mut dyn ProgressReporter) {
    match stdfs::remove_file(path) {
        Ok(()) => debug!("removed intermediate {}", path.display()),
        Err(e) => {
            let message = format!("could not remove intermediate {}: {}", path.display(), e);
            warn!("{}", message);
            progress.on_warning(&message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::StageLog;
    use std::fs;
    use tempfile::TempDir;

    fn source_tree(root: &Path) -> PathBuf {
        let src = root.join("docs");
        fs::create_dir_all(src.join("sub")).unwrap();
        fs::write(src.join("a.txt"), b"hello").unwrap();
        fs::write(src.join("sub").join("b.txt"), b"world").unwrap();
        src
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Decrypt.to_string(), "decrypt");
        assert_eq!(Stage::Pack.name(), "pack");
    }

    #[test]
    fn test_fixed_decisions_default() {
        let mut d = FixedDecisions::default();
        assert!(!d.confirm_overwrite(Path::new("x")));
        assert_eq!(d.key_for(Path::new("x")), None);
        let mut d = FixedDecisions::default().overwrite(true).key("k");
        assert!(d.confirm_overwrite(Path::new("x")));
        assert_eq!(d.key_for(Path::new("x")).as_deref(), Some("k"));
    }

    #[test]
    fn test_full_chain_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let src = source_tree(tmp.path());
        let out = tmp.path().join("out");
        let config = BackupConfig::new(&src, &out)
            .compress("Huffman")
            .encrypt("SimXOR", "pw");

        let mut log = StageLog::new();
        let report = Pipeline::new()
            .backup_with_progress(&config, &mut FixedDecisions::default(), &mut log)
            .unwrap();
        assert_eq!(report.stages, vec![Stage::Pack, Stage::Compress, Stage::Encrypt]);
        assert_eq!(log.events().len(), 3);
        let name = report.artifact.file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.ends_with(".Basic.huff.enc"), "{name}");
        // Only the final artifact remains.
        assert_eq!(fs::read_dir(&out).unwrap().count(), 1);

        let restore = tmp.path().join("restore");
        fs::create_dir(&restore).unwrap();
        let mut decisions = FixedDecisions::default().key("pw");
        let recovered = Pipeline::new()
            .recover(&report.record, &restore, &mut decisions)
            .unwrap();
        assert_eq!(
            recovered.stages,
            vec![Stage::Decrypt, Stage::Decompress, Stage::Unpack]
        );
        assert_eq!(fs::read(restore.join("docs/a.txt")).unwrap(), b"hello");
        assert_eq!(fs::read(restore.join("docs/sub/b.txt")).unwrap(), b"world");
        // Intermediates are gone, the artifact stays.
        assert_eq!(fs::read_dir(&out).unwrap().count(), 1);
    }

    #[test]
    fn test_wrong_key_names_decrypt_stage() {
        let tmp = TempDir::new().unwrap();
        let src = source_tree(tmp.path());
        let out = tmp.path().join("out");
        let config = BackupConfig::new(&src, &out).encrypt("SimXOR", "right");
        let report = Pipeline::new()
            .backup(&config, &mut FixedDecisions::default())
            .unwrap();

        let restore = tmp.path().join("restore");
        fs::create_dir(&restore).unwrap();
        let err = Pipeline::new()
            .recover(&report.record, &restore, &mut FixedDecisions::default().key("wrong"))
            .unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Decrypt));
        assert!(matches!(err.root_cause(), Error::ChecksumMismatch { .. }));
        assert!(err.to_string().starts_with("decrypt failed for"));
    }

    #[test]
    fn test_missing_key_cancels() {
        let tmp = TempDir::new().unwrap();
        let src = source_tree(tmp.path());
        let config = BackupConfig::new(&src, tmp.path().join("out")).encrypt("SimXOR", "k");
        let report = Pipeline::new()
            .backup(&config, &mut FixedDecisions::default())
            .unwrap();
        let err = Pipeline::new()
            .recover(&report.record, tmp.path(), &mut FixedDecisions::default())
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn test_unknown_algorithm_fails_before_writing() {
        let tmp = TempDir::new().unwrap();
        let src = source_tree(tmp.path());
        let out = tmp.path().join("out");
        let config = BackupConfig::new(&src, &out).compress("Zstd");
        let err = Pipeline::new()
            .backup(&config, &mut FixedDecisions::default())
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedAlgorithm { .. }));
        assert_eq!(fs::read_dir(&out).unwrap().count(), 0);
    }

    #[test]
    fn test_mirror_copy_and_declined_overwrite() {
        let tmp = TempDir::new().unwrap();
        let src = source_tree(tmp.path());
        let out = tmp.path().join("out");
        let config = BackupConfig::new(&src, &out);

        let report = Pipeline::new()
            .backup(&config, &mut FixedDecisions::default())
            .unwrap();
        assert_eq!(report.stages, vec![Stage::Copy]);
        assert_eq!(report.artifact, std::path::absolute(out.join("docs")).unwrap());
        assert_eq!(fs::read(out.join("docs/sub/b.txt")).unwrap(), b"world");
        assert!(!report.record.is_packed);

        fs::write(out.join("docs/a.txt"), b"changed").unwrap();
        let err = Pipeline::new()
            .backup(&config, &mut FixedDecisions::default())
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(fs::read(out.join("docs/a.txt")).unwrap(), b"changed");

        Pipeline::new()
            .backup(&config, &mut FixedDecisions::default().overwrite(true))
            .unwrap();
        assert_eq!(fs::read(out.join("docs/a.txt")).unwrap(), b"hello");
    }

    #[test]
    fn test_mirror_recovery_copies_tree() {
        let tmp = TempDir::new().unwrap();
        let src = source_tree(tmp.path());
        let config = BackupConfig::new(&src, tmp.path().join("out"));
        let report = Pipeline::new()
            .backup(&config, &mut FixedDecisions::default())
            .unwrap();

        let restore = tmp.path().join("restore");
        fs::create_dir(&restore).unwrap();
        let recovered = Pipeline::new()
            .recover(&report.record, &restore, &mut FixedDecisions::default())
            .unwrap();
        assert_eq!(recovered.stages, vec![Stage::Copy]);
        assert_eq!(recovered.restored, restore.join("docs"));
        assert_eq!(fs::read(restore.join("docs/a.txt")).unwrap(), b"hello");
    }

    #[test]
    fn test_recover_into_missing_directory() {
        let tmp = TempDir::new().unwrap();
        let src = source_tree(tmp.path());
        let config = BackupConfig::new(&src, tmp.path().join("out")).pack("Basic");
        let report = Pipeline::new()
            .backup(&config, &mut FixedDecisions::default())
            .unwrap();
        let err = Pipeline::new()
            .recover(&report.record, &tmp.path().join("nope"), &mut FixedDecisions::default())
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_filters_apply() {
        let tmp = TempDir::new().unwrap();
        let src = source_tree(tmp.path());
        fs::write(src.join("skip.log"), b"noise").unwrap();
        let config = BackupConfig::new(&src, tmp.path().join("out"))
            .exclude(r"\.log$")
            .unwrap()
            .pack("Basic");
        let report = Pipeline::new()
            .backup(&config, &mut FixedDecisions::default())
            .unwrap();
        // docs, docs/a.txt, docs/sub, docs/sub/b.txt
        assert_eq!(report.entries, 4);

        let info = Pipeline::new().inspect(&report.artifact).unwrap();
        match info.detail {
            ArtifactDetail::Container { header, entries } => {
                assert_eq!(header.entry_count, 4);
                assert!(entries.iter().all(|e| !e.name.ends_with(".log")));
            }
            other => panic!("unexpected detail: {other:?}"),
        }
    }

    #[test]
    fn test_inspect_plain_and_compressed() {
        let tmp = TempDir::new().unwrap();
        let src = source_tree(tmp.path());
        let config = BackupConfig::new(&src, tmp.path().join("out")).compress("Huffman");
        let report = Pipeline::new()
            .backup(&config, &mut FixedDecisions::default())
            .unwrap();

        let info = Pipeline::new().inspect(&report.artifact).unwrap();
        let class = info.class.unwrap();
        assert_eq!(class.signature.kind, StageKind::Compressed);
        assert_eq!(class.algorithm.as_deref(), Some("Huffman"));
        assert!(matches!(info.detail, ArtifactDetail::Compressed(_)));

        let plain = Pipeline::new().inspect(&src.join("a.txt")).unwrap();
        assert!(plain.class.is_none());
        assert!(matches!(plain.detail, ArtifactDetail::Plain));
        assert_eq!(plain.size, 5);

        let err = Pipeline::new().inspect(&tmp.path().join("missing")).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }
}
