//! Encryption stage: header layout and the encryptor capability trait.
//!
//! An encrypted artifact is a 10-byte [`EncryptionHeader`] followed by the
//! ciphertext:
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 1 | marker `0x31` |
//! | 1 | 1 | algorithm tag |
//! | 2 | 4 | header size (10) |
//! | 6 | 4 | CRC-32 of the plaintext |
//!
//! The checksum always covers the plaintext, so a wrong key shows up as a
//! [`ChecksumMismatch`](crate::Error::ChecksumMismatch) on decryption.

mod xor;

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

pub use xor::{XorEncryptor, XorKeystream};

use crate::format::reader::{read_u32_le, write_u32_le};
use crate::format::{ENCRYPT_MARKER, StageKind};
use crate::{Error, Result, truncated_on_eof};

/// Size of the encryption header in bytes.
pub const ENCRYPTION_HEADER_SIZE: u32 = 10;

/// Key used when the caller supplies an empty one.
pub const DEFAULT_KEY: &[u8] = b"default_key";

/// Returns `key`, or [`DEFAULT_KEY`] when it is empty.
pub fn effective_key(key: &[u8]) -> &[u8] {
    if key.is_empty() { DEFAULT_KEY } else { key }
}

/// The header at the start of every encrypted artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionHeader {
    /// Algorithm tag of the encryptor.
    pub tag: u8,
    /// Header size as stored.
    pub header_size: u32,
    /// CRC-32 of the plaintext.
    pub crc32: u32,
}

impl EncryptionHeader {
    /// Writes the header in artifact layout.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&[ENCRYPT_MARKER, self.tag])?;
        write_u32_le(w, self.header_size)?;
        write_u32_le(w, self.crc32)?;
        Ok(())
    }

    /// Reads a header, checking the marker byte and the header size.
    ///
    /// A header size above 10 is accepted; the extra bytes are skipped by
    /// the decryptor.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let expected = ENCRYPTION_HEADER_SIZE as u64;
        let mut head = [0u8; 2];
        r.read_exact(&mut head)
            .map_err(truncated_on_eof("encryption header", expected))?;
        if head[0] != ENCRYPT_MARKER {
            return Err(Error::FormatMismatch {
                expected: StageKind::Encrypted,
                marker: head[0],
                tag: head[1],
            });
        }
        let header_size = read_u32_le(r).map_err(truncated_on_eof("encryption header", expected))?;
        let crc32 = read_u32_le(r).map_err(truncated_on_eof("encryption header", expected))?;
        if header_size < ENCRYPTION_HEADER_SIZE {
            return Err(Error::CorruptHeader {
                offset: 2,
                reason: format!("header size {} is below {}", header_size, ENCRYPTION_HEADER_SIZE),
            });
        }
        Ok(Self {
            tag: head[1],
            header_size,
            crc32,
        })
    }
}

/// An encryption algorithm.
pub trait Encryptor: Send + Sync {
    /// Returns the registered algorithm name.
    fn name(&self) -> &'static str;

    /// Returns the algorithm tag written into byte 1.
    fn tag(&self) -> u8;

    /// Returns the extension appended to encrypted artifacts.
    fn extension(&self) -> &'static str;

    /// Encrypts `path` into a sibling file and returns its path.
    ///
    /// An empty key is replaced by [`DEFAULT_KEY`].
    fn encrypt_file(&self, path: &Path, key: &[u8]) -> Result<PathBuf>;

    /// Decrypts `src` into `dest`, verifying the plaintext checksum.
    ///
    /// On failure `dest` is removed.
    fn decrypt_file(&self, src: &Path, dest: &Path, key: &[u8]) -> Result<()>;
}
