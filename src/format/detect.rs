//! Stage detection from leading marker bytes.
//!
//! Classification never parses past byte 1: byte 0 selects the stage and
//! byte 1 is the algorithm tag inside that stage. Directories are never
//! classified.

use std::fs::File;
use std::path::Path;

use super::{COMPRESS_MARKER, ENCRYPT_MARKER, PACK_MARKER};
use crate::Result;
use crate::format::reader::read_full;

/// A pipeline stage family identified by its marker byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StageKind {
    /// Packed container.
    Packed,
    /// Compressed artifact.
    Compressed,
    /// Encrypted artifact.
    Encrypted,
}

impl StageKind {
    /// All stage kinds, in the order recovery undoes them.
    pub const RECOVERY_ORDER: [StageKind; 3] =
        [StageKind::Encrypted, StageKind::Compressed, StageKind::Packed];

    /// Returns the marker byte identifying this stage.
    pub fn marker(&self) -> u8 {
        match self {
            StageKind::Packed => PACK_MARKER,
            StageKind::Compressed => COMPRESS_MARKER,
            StageKind::Encrypted => ENCRYPT_MARKER,
        }
    }

    /// Returns the stage whose marker is `byte`, if any.
    pub fn from_marker(byte: u8) -> Option<Self> {
        match byte {
            PACK_MARKER => Some(StageKind::Packed),
            COMPRESS_MARKER => Some(StageKind::Compressed),
            ENCRYPT_MARKER => Some(StageKind::Encrypted),
            _ => None,
        }
    }

    /// Returns a lower-case name for this stage family.
    pub fn name(&self) -> &'static str {
        match self {
            StageKind::Packed => "pack",
            StageKind::Compressed => "compression",
            StageKind::Encrypted => "encryption",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The two leading bytes of a recognized artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    /// The stage named by byte 0.
    pub kind: StageKind,
    /// The algorithm tag in byte 1.
    pub tag: u8,
}

impl Signature {
    /// Parses a signature from the first two bytes of a file.
    pub fn from_bytes(bytes: [u8; 2]) -> Option<Self> {
        StageKind::from_marker(bytes[0]).map(|kind| Signature { kind, tag: bytes[1] })
    }
}

/// Reads the signature of the file at `path`.
///
/// Returns `Ok(None)` for directories, files shorter than two bytes and
/// files whose first byte is not a known marker.
///
/// # Errors
///
/// Returns an error if the path exists but cannot be opened or read.
pub fn detect_signature(path: &Path) -> Result<Option<Signature>> {
    if path.is_dir() {
        return Ok(None);
    }
    let mut file = File::open(path)?;
    let mut head = [0u8; 2];
    if read_full(&mut file, &mut head)? < head.len() {
        return Ok(None);
    }
    Ok(Signature::from_bytes(head))
}

fn has_stage(path: &Path, kind: StageKind) -> bool {
    match detect_signature(path) {
        Ok(Some(sig)) => sig.kind == kind,
        Ok(None) => false,
        Err(e) => {
            log::debug!("cannot classify {}: {}", path.display(), e);
            false
        }
    }
}

/// Returns `true` if `path` is a packed container.
pub fn is_packed(path: &Path) -> bool {
    has_stage(path, StageKind::Packed)
}

/// Returns `true` if `path` is a compressed artifact.
pub fn is_compressed(path: &Path) -> bool {
    has_stage(path, StageKind::Compressed)
}

/// Returns `true` if `path` is an encrypted artifact.
pub fn is_encrypted(path: &Path) -> bool {
    has_stage(path, StageKind::Encrypted)
}
