//! Error types for backup and recovery operations.
//!
//! This module provides the [`Error`] enum which represents all failure
//! modes of the pack, compress and encrypt stages and of the pipeline that
//! chains them, along with a convenient [`Result<T>`] type alias.
//!
//! # Error Handling
//!
//! All fallible operations in this crate return `Result<T, Error>`. Codec
//! errors are returned as-is by the codecs themselves; the pipeline wraps
//! them in [`Error::Stage`] so the caller can tell which stage and which
//! file failed:
//!
//! ```rust,no_run
//! use backpipe::{BackupConfig, Error, FixedDecisions, Pipeline};
//!
//! fn run(config: &BackupConfig) -> backpipe::Result<()> {
//!     let pipeline = Pipeline::new();
//!     match pipeline.backup(config, &mut FixedDecisions::default()) {
//!         Ok(report) => {
//!             println!("backup written to {}", report.artifact.display());
//!             Ok(())
//!         }
//!         Err(e @ Error::Stage { .. }) if e.is_corruption() => {
//!             eprintln!("integrity failure: {}", e);
//!             Err(e)
//!         }
//!         Err(e) => Err(e),
//!     }
//! }
//! ```

use std::io;
use std::path::PathBuf;

use crate::format::StageKind;
use crate::pipeline::Stage;

/// Helper struct for formatting ChecksumMismatch error messages.
struct ChecksumMismatchDisplay<'a> {
    path: Option<&'a std::path::Path>,
    expected: u32,
    actual: u32,
}

impl std::fmt::Display for ChecksumMismatchDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CRC-32 mismatch")?;
        if let Some(path) = self.path {
            write!(f, " for {}", path.display())?;
        }
        write!(f, ": expected {:#010x}, got {:#010x}", self.expected, self.actual)
    }
}

/// The main error type for backup and recovery operations.
///
/// # Error Categories
///
/// | Category | Variants | Typical Cause |
/// |----------|----------|---------------|
/// | I/O | [`Io`][Self::Io], [`DirCreateFailed`][Self::DirCreateFailed] | File system operations |
/// | Configuration | [`InvalidConfig`][Self::InvalidConfig], [`InvalidRegex`][Self::InvalidRegex], [`InvalidCompressionLevel`][Self::InvalidCompressionLevel] | Bad caller input |
/// | Format | [`FormatMismatch`][Self::FormatMismatch], [`CorruptHeader`][Self::CorruptHeader], [`TruncatedData`][Self::TruncatedData] | Wrong or damaged artifact |
/// | Integrity | [`ChecksumMismatch`][Self::ChecksumMismatch] | Corruption or wrong key |
/// | Security | [`PathTraversal`][Self::PathTraversal] | Entry escapes the destination |
/// | Pipeline | [`Stage`][Self::Stage], [`Cancelled`][Self::Cancelled] | Orchestration context |
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred at the operating system boundary.
    ///
    /// Open, read, write and seek failures all land here. The pipeline wraps
    /// it in [`Error::Stage`] with the file that was being processed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The configuration is missing a required value or has an invalid one.
    ///
    /// Returned by [`BackupConfig::validate`] for an empty source or
    /// destination path, or a missing encryption key.
    ///
    /// [`BackupConfig::validate`]: crate::BackupConfig::validate
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A source path or backup artifact does not exist.
    #[error("Not found: {}", path.display())]
    NotFound {
        /// The missing path.
        path: PathBuf,
    },

    /// The leading marker bytes do not belong to the expected stage.
    ///
    /// Byte 0 identifies the stage (`0x01` packed, `0x21` compressed,
    /// `0x31` encrypted) and byte 1 the algorithm inside that stage.
    #[error("Not a {expected} file: marker {marker:#04x}, algorithm {tag:#04x}")]
    FormatMismatch {
        /// The stage the caller expected.
        expected: StageKind,
        /// The marker byte found at offset 0.
        marker: u8,
        /// The algorithm byte found at offset 1.
        tag: u8,
    },

    /// No algorithm with this name is registered for the given stage.
    ///
    /// # Recovery
    ///
    /// List the supported names with [`Registry::packers`],
    /// [`Registry::compressors`] or [`Registry::encryptors`], or register a
    /// new constructor.
    ///
    /// [`Registry::packers`]: crate::Registry::packers
    /// [`Registry::compressors`]: crate::Registry::compressors
    /// [`Registry::encryptors`]: crate::Registry::encryptors
    #[error("Unsupported {kind} algorithm: '{name}'")]
    UnsupportedAlgorithm {
        /// The stage family that was queried.
        kind: StageKind,
        /// The requested algorithm name.
        name: String,
    },

    /// The CRC-32 of decoded data differs from the value stored in the header.
    ///
    /// This is always fatal for the stage: the data is corrupted, or for an
    /// encrypted artifact the key is wrong. The untrusted output is removed.
    #[error("{}", ChecksumMismatchDisplay { path: path.as_deref(), expected: *expected, actual: *actual })]
    ChecksumMismatch {
        /// The file whose content failed verification (if known).
        path: Option<PathBuf>,
        /// The checksum stored in the header.
        expected: u32,
        /// The checksum of the decoded bytes.
        actual: u32,
    },

    /// Fewer bytes were available than a header or entry declares.
    #[error("Truncated data in {context}: expected {expected} bytes, got {actual}")]
    TruncatedData {
        /// What was being read.
        context: String,
        /// The declared number of bytes.
        expected: u64,
        /// The number of bytes actually available.
        actual: u64,
    },

    /// A header field is inconsistent with the rest of the file.
    #[error("Corrupt header at offset {offset:#x}: {reason}")]
    CorruptHeader {
        /// The byte offset of the offending field.
        offset: u64,
        /// A description of the inconsistency.
        reason: String,
    },

    /// The destination directory cannot be written to.
    #[error("Destination is not writable: {}", path.display())]
    DestinationNotWritable {
        /// The directory that failed the write probe.
        path: PathBuf,
    },

    /// Packing was requested with no input paths.
    #[error("Nothing to pack: the file list is empty")]
    EmptyInput,

    /// A directory entry could not be created during unpacking.
    #[error("Failed to create directory {}: {source}", path.display())]
    DirCreateFailed {
        /// The directory that could not be created.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// An entry path would resolve outside its root.
    ///
    /// Raised on unpack for absolute names or names with `..` components,
    /// and on pack for inputs that do not live under the common root.
    #[error("Path escapes its root: {path}")]
    PathTraversal {
        /// The offending path.
        path: String,
    },

    /// An include or exclude filter is not a valid regular expression.
    #[error("Invalid regex pattern '{pattern}': {reason}")]
    InvalidRegex {
        /// The invalid pattern.
        pattern: String,
        /// Why the pattern was rejected.
        reason: String,
    },

    /// A compression level outside 1-9 was provided.
    #[error("Invalid compression level {level}: must be 1-9")]
    InvalidCompressionLevel {
        /// The rejected level.
        level: u32,
    },

    /// The operation was cancelled through a [`Decisions`] callback.
    ///
    /// Returned when an overwrite is declined or no key is supplied for an
    /// encrypted artifact. Nothing was modified.
    ///
    /// [`Decisions`]: crate::Decisions
    #[error("Operation cancelled")]
    Cancelled,

    /// A backup record index is out of range or a record is not in the store.
    #[error("Backup record not found: {0}")]
    RecordNotFound(String),

    /// The record file could not be parsed or serialized.
    #[error("Record store JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A pipeline stage failed.
    ///
    /// Wraps the underlying error with the failing stage and the file that
    /// stage was working on.
    #[error("{stage} failed for {}: {source}", path.display())]
    Stage {
        /// The stage that failed.
        stage: Stage,
        /// The file the stage was processing.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wraps this error with pipeline stage context.
    pub fn in_stage(self, stage: Stage, path: impl Into<PathBuf>) -> Self {
        Error::Stage {
            stage,
            path: path.into(),
            source: Box::new(self),
        }
    }

    /// Returns the innermost error, looking through [`Error::Stage`] wrappers.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Stage { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Returns the failing stage, if this error came from the pipeline.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Returns `true` if this is a data corruption error.
    ///
    /// Corruption errors mean the artifact is unusable as-is.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self.root_cause(),
            Error::ChecksumMismatch { .. } | Error::CorruptHeader { .. } | Error::TruncatedData { .. }
        )
    }

    /// Returns `true` if this error was caused by invalid caller input.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self.root_cause(),
            Error::InvalidConfig(_)
                | Error::InvalidRegex { .. }
                | Error::InvalidCompressionLevel { .. }
                | Error::UnsupportedAlgorithm { .. }
        )
    }
}

/// Result type alias using the crate's [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

/// Maps an unexpected end of input to [`Error::TruncatedData`].
///
/// Header readers use `read_exact`, which reports a short read as
/// `UnexpectedEof`; everything else stays an I/O error.
pub(crate) fn truncated_on_eof(context: &str, expected: u64) -> impl FnOnce(io::Error) -> Error + '_ {
    move |e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::TruncatedData {
                context: context.to_string(),
                expected,
                actual: 0,
            }
        } else {
            Error::Io(e)
        }
    }
}
