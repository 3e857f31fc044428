//! Compression stage: header layout and the compressor capability trait.
//!
//! A compressed artifact is a fixed 24-byte [`CompressionHeader`], a
//! frequency table of `(symbol, count)` pairs, and the bit-packed payload:
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 1 | marker `0x21` |
//! | 1 | 1 | algorithm tag |
//! | 2 | 1 | padding bits in the final payload byte |
//! | 3 | 1 | reserved, 0 |
//! | 4 | 4 | header size (24) |
//! | 8 | 4 | frequency table size (9 per symbol) |
//! | 12 | 8 | original size |
//! | 20 | 4 | CRC-32 of the original bytes |

mod bits;
mod huffman;

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

pub use bits::{BitWriter, Code, PayloadBits};
pub use huffman::{FrequencyTable, HuffmanCompressor, HuffmanTree};

use crate::format::reader::{read_u32_le, read_u64_le, write_u32_le, write_u64_le};
use crate::format::{COMPRESS_MARKER, StageKind};
use crate::{Error, Result, truncated_on_eof};

/// Size of the fixed compression header in bytes.
pub const COMPRESSION_HEADER_SIZE: u32 = 24;

/// Encoded size of one frequency table entry.
pub const FREQ_ENTRY_SIZE: u32 = 1 + 8;

/// The fixed header at the start of every compressed artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionHeader {
    /// Algorithm tag of the compressor.
    pub tag: u8,
    /// Number of padding bits in the final payload byte (0 on a byte boundary).
    pub valid_bits: u8,
    /// Header size as stored; 24 for every artifact this crate writes.
    pub header_size: u32,
    /// Byte length of the frequency table that follows the header.
    pub freq_table_size: u32,
    /// Length of the uncompressed data.
    pub original_size: u64,
    /// CRC-32 of the uncompressed data.
    pub crc32: u32,
}

impl CompressionHeader {
    /// Returns the number of distinct symbols in the frequency table.
    pub fn symbol_count(&self) -> u32 {
        self.freq_table_size / FREQ_ENTRY_SIZE
    }

    /// Writes the header in artifact layout.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&[COMPRESS_MARKER, self.tag, self.valid_bits, 0])?;
        write_u32_le(w, self.header_size)?;
        write_u32_le(w, self.freq_table_size)?;
        write_u64_le(w, self.original_size)?;
        write_u32_le(w, self.crc32)?;
        Ok(())
    }

    /// Reads a header, checking the marker byte and the fixed fields.
    ///
    /// The algorithm tag is returned as-is; the compressor checks it.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let expected = COMPRESSION_HEADER_SIZE as u64;
        let mut head = [0u8; 4];
        r.read_exact(&mut head)
            .map_err(truncated_on_eof("compression header", expected))?;
        if head[0] != COMPRESS_MARKER {
            return Err(Error::FormatMismatch {
                expected: StageKind::Compressed,
                marker: head[0],
                tag: head[1],
            });
        }
        let header_size = read_u32_le(r).map_err(truncated_on_eof("compression header", expected))?;
        let freq_table_size =
            read_u32_le(r).map_err(truncated_on_eof("compression header", expected))?;
        let original_size = read_u64_le(r).map_err(truncated_on_eof("compression header", expected))?;
        let crc32 = read_u32_le(r).map_err(truncated_on_eof("compression header", expected))?;

        if header_size != COMPRESSION_HEADER_SIZE {
            return Err(Error::CorruptHeader {
                offset: 4,
                reason: format!("header size {} (expected {})", header_size, COMPRESSION_HEADER_SIZE),
            });
        }
        if head[2] > 7 {
            return Err(Error::CorruptHeader {
                offset: 2,
                reason: format!("{} padding bits in one byte", head[2]),
            });
        }
        if freq_table_size % FREQ_ENTRY_SIZE != 0 || freq_table_size > 256 * FREQ_ENTRY_SIZE {
            return Err(Error::CorruptHeader {
                offset: 8,
                reason: format!("frequency table size {}", freq_table_size),
            });
        }

        Ok(Self {
            tag: head[1],
            valid_bits: head[2],
            header_size,
            freq_table_size,
            original_size,
            crc32,
        })
    }
}

/// A compression algorithm.
///
/// Implementations are registered by name in a
/// [`Registry`](crate::Registry); the pipeline only talks to this trait.
pub trait Compressor: Send + Sync {
    /// Returns the registered algorithm name.
    fn name(&self) -> &'static str;

    /// Returns the algorithm tag written into byte 1.
    fn tag(&self) -> u8;

    /// Returns the extension appended to compressed artifacts.
    fn extension(&self) -> &'static str;

    /// Compresses `path` into a sibling file and returns its path.
    fn compress_file(&self, path: &Path) -> Result<PathBuf>;

    /// Decompresses `src` into `dest`, verifying the stored checksum.
    ///
    /// On failure `dest` is removed; its content would be untrusted.
    fn decompress_file(&self, src: &Path, dest: &Path) -> Result<()>;
}
