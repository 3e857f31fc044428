//! # backpipe
//!
//! A file backup and recovery library built around a pluggable
//! transformation pipeline.
//!
//! A backup either mirrors a source tree into a destination directory, or
//! packs it into a single self-describing container that can then be
//! compressed (Huffman) and encrypted (XOR stream cipher). Every artifact
//! starts with a marker byte and an algorithm byte, so recovery can tell
//! which stages to undo by reading the file alone. Each codec stores a
//! CRC-32 of its input and verifies it on the way back.
//!
//! ## Quick Start
//!
//! ### Backing Up
//!
//! ```rust,no_run
//! use backpipe::{BackupConfig, FixedDecisions, Pipeline, RecordStore, Result};
//!
//! fn main() -> Result<()> {
//!     let config = BackupConfig::new("/home/me/docs", "/mnt/backups")
//!         .exclude(r"(^|/)target(/|$)")?
//!         .compress("Huffman")
//!         .encrypt("SimXOR", "correct horse")
//!         .description("nightly");
//!
//!     let report = Pipeline::new().backup(&config, &mut FixedDecisions::default())?;
//!     println!("wrote {}", report.artifact.display());
//!
//!     let mut records = RecordStore::open("/mnt/backups")?;
//!     records.add(report.record)?;
//!     records.save()?;
//!     Ok(())
//! }
//! ```
//!
//! ### Recovering
//!
//! ```rust,no_run
//! use backpipe::{FixedDecisions, Pipeline, RecordStore, Result};
//! use std::path::Path;
//!
//! fn main() -> Result<()> {
//!     let records = RecordStore::open("/mnt/backups")?;
//!     let record = records.get(0)?;
//!     let mut decisions = FixedDecisions::default().key("correct horse");
//!     let report = Pipeline::new().recover(record, Path::new("/tmp/restore"), &mut decisions)?;
//!     println!("undid {:?}", report.stages);
//!     Ok(())
//! }
//! ```
//!
//! ## Artifact Formats
//!
//! | Stage | Marker | Algorithm | Extension |
//! |-------|--------|-----------|-----------|
//! | Packed | `0x01` | `Basic` = `0x00` | `backup_<unix-secs>.Basic` |
//! | Compressed | `0x21` | `Huffman` = `0x01` | `.huff` appended |
//! | Encrypted | `0x31` | `SimXOR` = `0x01` | `.enc` appended |
//!
//! All multi-byte integers are little-endian. See [`pack`], [`compress`]
//! and [`encrypt`] for the exact layouts.
//!
//! ## Extending
//!
//! Algorithms are looked up by name in a [`Registry`]. Register another
//! packer, compressor or encryptor and pass the registry to
//! [`Pipeline::with_registry`]; nothing else changes.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli` | No | The `backpipe` command-line tool |
//!
//! ## Minimum Supported Rust Version (MSRV)
//!
//! This crate requires **Rust 1.85** or later.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Chunk size for streaming codec I/O (64 KiB).
pub(crate) const CHUNK_SIZE: usize = 64 * 1024;

pub mod checksum;
pub mod compress;
pub mod config;
pub mod encrypt;
pub mod error;
pub mod format;
pub mod fs;
pub mod pack;
pub mod pipeline;
pub mod progress;
pub mod record;
pub mod safety;

pub(crate) use error::truncated_on_eof;

pub use compress::{Compressor, HuffmanCompressor};
pub use config::BackupConfig;
pub use encrypt::{DEFAULT_KEY, Encryptor, XorEncryptor};
pub use error::{Error, Result};
pub use format::{ArtifactClass, Registry, StageKind};
pub use pack::{BasicPacker, FileEntryMeta, FileKind, Packer, UnpackSummary};
pub use pipeline::{
    ArtifactDetail, ArtifactInfo, BackupReport, Decisions, FixedDecisions, Pipeline,
    RecoveryReport, Stage,
};
pub use progress::{NoProgress, ProgressReporter, StageLog};
pub use record::{BackupRecord, RecordStore};
pub use safety::resolve_entry_path;
