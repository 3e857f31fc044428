//! CRC-32 checksum utilities.
//!
//! Every codec in this crate stores a CRC-32 of the *original* bytes in its
//! header and recomputes it while decoding, so corruption introduced between
//! write and read is always detected.
//!
//! The checksum is the standard IEEE 802.3 CRC-32 (reflected polynomial
//! `0xEDB88320`): the state starts at `0xFFFFFFFF`, every byte is folded in
//! with the table-driven reflected update, and the final value is the state
//! XOR `0xFFFFFFFF`. The computation itself is delegated to `crc32fast`.
//!
//! # Example
//!
//! ```rust
//! use backpipe::checksum::{Checksum, Crc32};
//!
//! let mut crc = Crc32::new();
//! crc.update(b"Hello, ");
//! crc.update(b"World!");
//! assert_eq!(crc.finalize(), 0xEC4AC3D0);
//!
//! assert_eq!(Crc32::compute(b"Hello, World!"), 0xEC4AC3D0);
//! ```

use std::io::{self, Read, Write};
use std::path::Path;

use crate::{CHUNK_SIZE, Error, Result};

/// Common trait for checksum computation.
pub trait Checksum: Default + Clone {
    /// The output type of this checksum.
    type Output: Copy + Eq + std::fmt::Debug;

    /// Creates a checksum in its initial state.
    fn new() -> Self;

    /// Folds more data into the running state.
    fn update(&mut self, data: &[u8]);

    /// Returns the checksum of everything fed so far.
    ///
    /// The running state is left untouched, so more data may follow.
    fn finalize(&self) -> Self::Output;

    /// Resets the checksum to its initial state.
    fn reset(&mut self);

    /// Computes the checksum of a single slice in one call.
    fn compute(data: &[u8]) -> Self::Output {
        let mut hasher = Self::new();
        hasher.update(data);
        hasher.finalize()
    }

    /// Computes the checksum of everything a reader yields.
    fn compute_reader<R: Read>(reader: &mut R) -> io::Result<Self::Output> {
        let mut hasher = Self::new();
        let mut buffer = vec![0u8; CHUNK_SIZE];
        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }
        Ok(hasher.finalize())
    }
}

/// CRC-32 checksum calculator (IEEE 802.3 polynomial).
///
/// # Example
///
/// ```rust
/// use backpipe::checksum::{Checksum, Crc32};
///
/// let mut crc = Crc32::new();
/// for byte in b"Hello, World!" {
///     crc.update_byte(*byte);
/// }
/// assert_eq!(crc.finalize(), 0xEC4AC3D0);
/// ```
#[derive(Clone)]
pub struct Crc32 {
    hasher: crc32fast::Hasher,
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Crc32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crc32")
            .field("current", &format_args!("{:#010x}", self.finalize()))
            .finish()
    }
}

impl Checksum for Crc32 {
    type Output = u32;

    fn new() -> Self {
        Self {
            hasher: crc32fast::Hasher::new(),
        }
    }

    fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    fn finalize(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    fn reset(&mut self) {
        self.hasher.reset();
    }
}

impl Crc32 {
    /// Folds a single byte into the running state.
    pub fn update_byte(&mut self, byte: u8) {
        self.hasher.update(&[byte]);
    }
}

/// A writer wrapper that computes CRC-32 over everything written through it.
///
/// Decoders write their output through this so the checksum covers exactly
/// the bytes that reached the destination.
pub struct Crc32Writer<W> {
    inner: W,
    crc: Crc32,
    bytes_written: u64,
}

impl<W> Crc32Writer<W> {
    /// Creates a new CRC-32 writer wrapping the given writer.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            crc: Crc32::new(),
            bytes_written: 0,
        }
    }

    /// Returns the CRC-32 of the bytes written so far.
    pub fn crc(&self) -> u32 {
        self.crc.finalize()
    }

    /// Returns the number of bytes written.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Consumes the wrapper and returns the inner writer.
    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Returns a mutable reference to the inner writer.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }
}

impl<W: Write> Write for Crc32Writer<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.crc.update(&buf[..n]);
        self.bytes_written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// A reader wrapper that computes CRC-32 over everything read through it.
pub struct Crc32Reader<R> {
    inner: R,
    crc: Crc32,
    bytes_read: u64,
}

impl<R> Crc32Reader<R> {
    /// Creates a new CRC-32 reader wrapping the given reader.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            crc: Crc32::new(),
            bytes_read: 0,
        }
    }

    /// Returns the CRC-32 of the bytes read so far.
    pub fn crc(&self) -> u32 {
        self.crc.finalize()
    }

    /// Returns the number of bytes read.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Consumes the wrapper and returns the inner reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for Crc32Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.crc.update(&buf[..n]);
        self.bytes_read += n as u64;
        Ok(n)
    }
}

/// Outcome of comparing a stored checksum with a computed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyResult {
    /// The checksums agree.
    Match,
    /// The checksums differ.
    Mismatch {
        /// The stored value.
        expected: u32,
        /// The computed value.
        actual: u32,
    },
}

impl VerifyResult {
    /// Compares a stored checksum with a computed one.
    pub fn compare(expected: u32, actual: u32) -> Self {
        if expected == actual {
            Self::Match
        } else {
            Self::Mismatch { expected, actual }
        }
    }

    /// Returns true if verification passed.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Match)
    }

    /// Converts a mismatch into [`Error::ChecksumMismatch`] for `path`.
    pub fn into_result(self, path: &Path) -> Result<()> {
        match self {
            Self::Match => Ok(()),
            Self::Mismatch { expected, actual } => Err(Error::ChecksumMismatch {
                path: Some(path.to_path_buf()),
                expected,
                actual,
            }),
        }
    }
}

/// Verifies the CRC-32 of `data` against an expected value.
pub fn verify_crc32(data: &[u8], expected: u32) -> VerifyResult {
    VerifyResult::compare(expected, Crc32::compute(data))
}
