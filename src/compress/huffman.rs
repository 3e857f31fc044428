//! Byte-oriented Huffman coding.
//!
//! The encoder stores symbol frequencies, not the tree, so the decoder must
//! rebuild exactly the same tree. Ties are broken by insertion sequence:
//! leaves enter the heap in ascending symbol order and each parent takes the
//! next sequence number.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::debug;

use super::bits::{BitWriter, Code, PayloadBits};
use super::{COMPRESSION_HEADER_SIZE, CompressionHeader, Compressor, FREQ_ENTRY_SIZE};
use crate::checksum::{Checksum, Crc32, Crc32Writer, VerifyResult};
use crate::format::reader::{read_u8, read_u64_le, write_u64_le};
use crate::format::{StageKind, names, tag};
use crate::fs::{append_extension, discard_untrusted};
use crate::{CHUNK_SIZE, Error, Result, truncated_on_eof};

/// Extension appended to compressed files.
pub const HUFFMAN_EXTENSION: &str = "huff";

/// Symbol counts in the order they are stored: ascending symbol value,
/// absent symbols omitted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FrequencyTable {
    entries: Vec<(u8, u64)>,
}

impl FrequencyTable {
    /// Collects the non-zero counts of a 256-entry histogram.
    pub fn from_counts(counts: &[u64; 256]) -> Self {
        let entries = counts
            .iter()
            .enumerate()
            .filter(|(_, count)| **count > 0)
            .map(|(symbol, count)| (symbol as u8, *count))
            .collect();
        Self { entries }
    }

    /// Expands the table back into a 256-entry histogram.
    pub fn to_counts(&self) -> [u64; 256] {
        let mut counts = [0u64; 256];
        for &(symbol, count) in &self.entries {
            counts[symbol as usize] = count;
        }
        counts
    }

    /// Returns the stored `(symbol, count)` pairs.
    pub fn entries(&self) -> &[(u8, u64)] {
        &self.entries
    }

    /// Returns the encoded length in bytes.
    pub fn encoded_len(&self) -> u32 {
        self.entries.len() as u32 * FREQ_ENTRY_SIZE
    }

    /// Sums the counts, or `None` if the sum does not fit in a `u64`.
    pub fn total(&self) -> Option<u64> {
        self.entries
            .iter()
            .try_fold(0u64, |acc, &(_, count)| acc.checked_add(count))
    }

    /// Writes the table.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        for &(symbol, count) in &self.entries {
            w.write_all(&[symbol])?;
            write_u64_le(w, count)?;
        }
        Ok(())
    }

    /// Reads a table of `size` bytes.
    ///
    /// Duplicate or zero-count symbols are rejected; the encoder never
    /// writes them and the tree could not be rebuilt identically.
    pub fn read_from<R: Read>(r: &mut R, size: u32) -> Result<Self> {
        let count = (size / FREQ_ENTRY_SIZE) as usize;
        let mut seen = [false; 256];
        let mut entries = Vec::with_capacity(count);
        for i in 0..count {
            let offset = COMPRESSION_HEADER_SIZE as u64 + (i as u64) * FREQ_ENTRY_SIZE as u64;
            let symbol = read_u8(r).map_err(truncated_on_eof("frequency table", size as u64))?;
            let freq = read_u64_le(r).map_err(truncated_on_eof("frequency table", size as u64))?;
            if freq == 0 || seen[symbol as usize] {
                return Err(Error::CorruptHeader {
                    offset,
                    reason: format!("invalid frequency entry for symbol {:#04x}", symbol),
                });
            }
            seen[symbol as usize] = true;
            entries.push((symbol, freq));
        }
        entries.sort_unstable_by_key(|&(symbol, _)| symbol);
        Ok(Self { entries })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    Leaf(u8),
    Internal { left: usize, right: usize },
    /// Zero-frequency filler: the whole tree for empty input, or the right
    /// sibling of the only symbol.
    Placeholder,
}

/// A Huffman tree stored as an arena of nodes.
#[derive(Debug, Clone)]
pub struct HuffmanTree {
    nodes: Vec<Node>,
    root: usize,
}

/// Outcome of following one bit from a node.
enum Step {
    Inner(usize),
    Symbol(u8),
}

impl HuffmanTree {
    /// Builds the tree for a 256-entry histogram.
    pub fn build(counts: &[u64; 256]) -> Self {
        let mut nodes = Vec::new();
        let mut heap = BinaryHeap::new();
        let mut seq = 0u64;

        for (symbol, &freq) in counts.iter().enumerate() {
            if freq > 0 {
                nodes.push(Node::Leaf(symbol as u8));
                heap.push(Reverse((freq, seq, nodes.len() - 1)));
                seq += 1;
            }
        }

        match heap.len() {
            0 => {
                nodes.push(Node::Placeholder);
                return Self { nodes, root: 0 };
            }
            1 => {
                nodes.push(Node::Placeholder);
                nodes.push(Node::Internal { left: 0, right: 1 });
                return Self { nodes, root: 2 };
            }
            _ => {}
        }

        while heap.len() > 1 {
            let (Some(Reverse((lf, _, left))), Some(Reverse((rf, _, right)))) =
                (heap.pop(), heap.pop())
            else {
                break;
            };
            nodes.push(Node::Internal { left, right });
            heap.push(Reverse((lf.saturating_add(rf), seq, nodes.len() - 1)));
            seq += 1;
        }

        let root = heap.pop().map(|Reverse((_, _, idx))| idx).unwrap_or(0);
        Self { nodes, root }
    }

    /// Returns the code of every symbol; absent symbols get an empty code.
    pub fn codes(&self) -> [Code; 256] {
        let mut table = [Code::default(); 256];
        let mut stack = vec![(self.root, Code::default())];
        while let Some((idx, code)) = stack.pop() {
            match self.nodes[idx] {
                Node::Leaf(symbol) => table[symbol as usize] = code,
                Node::Internal { left, right } => {
                    // Right first so the left subtree is visited first.
                    stack.push((right, code.with_bit(true)));
                    stack.push((left, code.with_bit(false)));
                }
                Node::Placeholder => {}
            }
        }
        table
    }

    /// Returns `true` when the tree encodes no symbol at all.
    pub fn is_empty(&self) -> bool {
        matches!(self.nodes[self.root], Node::Placeholder)
    }

    /// Follows one bit from `from`. `None` means the bit path left the set
    /// of real codes, which only damaged input can do.
    fn step(&self, from: usize, bit: bool) -> Option<Step> {
        let Node::Internal { left, right } = self.nodes[from] else {
            return None;
        };
        let next = if bit { right } else { left };
        match self.nodes[next] {
            Node::Leaf(symbol) => Some(Step::Symbol(symbol)),
            Node::Internal { .. } => Some(Step::Inner(next)),
            Node::Placeholder => None,
        }
    }
}

/// Huffman compressor writing `<file>.huff` artifacts.
#[derive(Debug, Clone, Copy, Default)]
pub struct HuffmanCompressor;

impl HuffmanCompressor {
    /// Creates the compressor.
    pub fn new() -> Self {
        Self
    }

    /// Compresses everything `input` yields into `output`.
    ///
    /// `input` is read twice: once for the histogram and checksum, once to
    /// encode. The header is rewritten at the end once the padding of the
    /// final byte is known.
    pub fn encode<R, W>(&self, input: &mut R, output: &mut W) -> Result<CompressionHeader>
    where
        R: Read + Seek,
        W: Write + Seek,
    {
        input.seek(SeekFrom::Start(0))?;
        let mut counts = [0u64; 256];
        let mut crc = Crc32::new();
        let mut original_size = 0u64;
        let mut buffer = vec![0u8; CHUNK_SIZE];
        loop {
            let n = input.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            for &byte in &buffer[..n] {
                counts[byte as usize] += 1;
            }
            crc.update(&buffer[..n]);
            original_size += n as u64;
        }

        let table = FrequencyTable::from_counts(&counts);
        let codes = HuffmanTree::build(&counts).codes();
        let mut header = CompressionHeader {
            tag: tag::HUFFMAN,
            valid_bits: 0,
            header_size: COMPRESSION_HEADER_SIZE,
            freq_table_size: table.encoded_len(),
            original_size,
            crc32: crc.finalize(),
        };

        let header_pos = output.stream_position()?;
        header.write_to(output)?;
        table.write_to(output)?;

        input.seek(SeekFrom::Start(0))?;
        let mut bits = BitWriter::new(BufWriter::with_capacity(CHUNK_SIZE, &mut *output));
        let mut reread = 0u64;
        loop {
            let n = input.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            for &byte in &buffer[..n] {
                let code = &codes[byte as usize];
                if code.is_empty() {
                    return Err(source_changed());
                }
                bits.write_code(code)?;
            }
            reread += n as u64;
        }
        if reread != original_size {
            return Err(source_changed());
        }
        let payload_len = bits.bytes_written();
        let (writer, valid_bits) = bits.finish()?;
        drop(writer);

        header.valid_bits = valid_bits;
        let end = output.stream_position()?;
        output.seek(SeekFrom::Start(header_pos))?;
        header.write_to(output)?;
        output.seek(SeekFrom::Start(end))?;
        output.flush()?;

        debug!(
            "huffman: {} bytes -> {} payload bytes, {} symbols, {} padding bits",
            original_size,
            payload_len + u64::from(valid_bits != 0),
            table.entries().len(),
            valid_bits
        );
        Ok(header)
    }

    /// Decodes a compressed stream into `output` and verifies its checksum.
    ///
    /// The returned header describes what was decoded. A checksum failure
    /// carries no path; [`Compressor::decompress_file`] attaches one.
    pub fn decode<R, W>(&self, input: &mut R, output: &mut W) -> Result<CompressionHeader>
    where
        R: Read + Seek,
        W: Write,
    {
        let stream_len = input.seek(SeekFrom::End(0))?;
        input.seek(SeekFrom::Start(0))?;

        let header = CompressionHeader::read_from(input)?;
        if header.tag != tag::HUFFMAN {
            return Err(Error::FormatMismatch {
                expected: StageKind::Compressed,
                marker: crate::format::COMPRESS_MARKER,
                tag: header.tag,
            });
        }
        let table = FrequencyTable::read_from(input, header.freq_table_size)?;
        if table.total() != Some(header.original_size) {
            return Err(Error::CorruptHeader {
                offset: 12,
                reason: format!(
                    "frequency table does not sum to the original size {}",
                    header.original_size
                ),
            });
        }

        let payload_start = COMPRESSION_HEADER_SIZE as u64 + header.freq_table_size as u64;
        let payload_len = stream_len.saturating_sub(payload_start);
        let tree = HuffmanTree::build(&table.to_counts());

        let mut out = Crc32Writer::new(BufWriter::with_capacity(CHUNK_SIZE, output));
        let mut bits = PayloadBits::new(input, payload_len, header.valid_bits);
        let mut decoded = Vec::with_capacity(CHUNK_SIZE);
        let mut remaining = header.original_size;
        let mut node = tree.root;

        // A damaged payload either runs dry or walks onto the placeholder
        // before every symbol is out. Both are reported against the
        // checksum of what was decoded so far.
        while remaining > 0 {
            let Some(bit) = bits.next_bit()? else {
                break;
            };
            match tree.step(node, bit) {
                Some(Step::Inner(next)) => node = next,
                Some(Step::Symbol(symbol)) => {
                    decoded.push(symbol);
                    remaining -= 1;
                    node = tree.root;
                    if decoded.len() == CHUNK_SIZE {
                        out.write_all(&decoded)?;
                        decoded.clear();
                    }
                }
                None => break,
            }
        }
        out.write_all(&decoded)?;
        out.flush()?;

        let actual = out.crc();
        if remaining > 0 {
            debug!(
                "huffman payload stopped {} of {} bytes short",
                remaining, header.original_size
            );
            return Err(Error::ChecksumMismatch {
                path: None,
                expected: header.crc32,
                actual,
            });
        }
        match VerifyResult::compare(header.crc32, actual) {
            VerifyResult::Match => Ok(header),
            VerifyResult::Mismatch { expected, actual } => Err(Error::ChecksumMismatch {
                path: None,
                expected,
                actual,
            }),
        }
    }
}

fn source_changed() -> Error {
    Error::Io(std::io::Error::other("input changed while it was being compressed"))
}

impl Compressor for HuffmanCompressor {
    fn name(&self) -> &'static str {
        names::HUFFMAN
    }

    fn tag(&self) -> u8 {
        tag::HUFFMAN
    }

    fn extension(&self) -> &'static str {
        HUFFMAN_EXTENSION
    }

    fn compress_file(&self, path: &Path) -> Result<PathBuf> {
        let dest = append_extension(path, HUFFMAN_EXTENSION);
        let mut input = BufReader::with_capacity(CHUNK_SIZE, File::open(path)?);
        let mut output = File::create(&dest)?;
        let header = self.encode(&mut input, &mut output)?;
        output.sync_all()?;
        debug!(
            "compressed {} ({} bytes) -> {}",
            path.display(),
            header.original_size,
            dest.display()
        );
        Ok(dest)
    }

    fn decompress_file(&self, src: &Path, dest: &Path) -> Result<()> {
        let mut input = BufReader::with_capacity(CHUNK_SIZE, File::open(src)?);
        let mut output = File::create(dest)?;
        match self.decode(&mut input, &mut output) {
            Ok(header) => {
                debug!(
                    "decompressed {} -> {} ({} bytes)",
                    src.display(),
                    dest.display(),
                    header.original_size
                );
                Ok(())
            }
            Err(err) => {
                drop(output);
                discard_untrusted(dest);
                Err(match err {
                    Error::ChecksumMismatch {
                        path: None,
                        expected,
                        actual,
                    } => Error::ChecksumMismatch {
                        path: Some(src.to_path_buf()),
                        expected,
                        actual,
                    },
                    other => other,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn counts_of(data: &[u8]) -> [u64; 256] {
        let mut counts = [0u64; 256];
        for &b in data {
            counts[b as usize] += 1;
        }
        counts
    }

    fn compress_bytes(data: &[u8]) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        HuffmanCompressor::new()
            .encode(&mut Cursor::new(data), &mut out)
            .unwrap();
        out.into_inner()
    }

    fn decompress_bytes(data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        HuffmanCompressor::new().decode(&mut Cursor::new(data), &mut out)?;
        Ok(out)
    }

    #[test]
    fn test_tree_tie_break() {
        // A=5, B=3, C=2: C and B merge first (C left), then A ties the
        // merged node at 5 and wins on its earlier sequence number.
        let codes = HuffmanTree::build(&counts_of(b"AAAAABBBCC")).codes();
        assert_eq!(codes[b'A' as usize].to_bit_string(), "0");
        assert_eq!(codes[b'C' as usize].to_bit_string(), "10");
        assert_eq!(codes[b'B' as usize].to_bit_string(), "11");
        assert!(codes[b'D' as usize].is_empty());
    }

    #[test]
    fn test_single_symbol_gets_one_bit() {
        let codes = HuffmanTree::build(&counts_of(b"zzzz")).codes();
        assert_eq!(codes[b'z' as usize].to_bit_string(), "0");
    }

    #[test]
    fn test_empty_tree() {
        let tree = HuffmanTree::build(&[0u64; 256]);
        assert!(tree.is_empty());
        assert!(tree.codes().iter().all(Code::is_empty));
    }

    #[test]
    fn test_known_payload() {
        let packed = compress_bytes(b"AAAAABBBCC");
        let header = CompressionHeader::read_from(&mut Cursor::new(&packed)).unwrap();
        assert_eq!(header.original_size, 10);
        assert_eq!(header.freq_table_size, 27);
        assert_eq!(header.crc32, Crc32::compute(b"AAAAABBBCC"));
        // 0 0 0 0 0 11 11 11 10 10 = 15 bits, one padding bit.
        assert_eq!(header.valid_bits, 1);
        assert_eq!(&packed[24 + 27..], &[0b0000_0111, 0b1111_0100]);
        assert_eq!(decompress_bytes(&packed).unwrap(), b"AAAAABBBCC");
    }

    #[test]
    fn test_roundtrip_empty() {
        let packed = compress_bytes(b"");
        assert_eq!(packed.len(), COMPRESSION_HEADER_SIZE as usize);
        assert!(decompress_bytes(&packed).unwrap().is_empty());
    }

    #[test]
    fn test_roundtrip_single_symbol() {
        let data = vec![7u8; 1000];
        let packed = compress_bytes(&data);
        assert_eq!(decompress_bytes(&packed).unwrap(), data);
    }

    #[test]
    fn test_roundtrip_all_symbols_across_chunks() {
        let data: Vec<u8> = (0..CHUNK_SIZE * 2 + 17).map(|i| (i * 31 % 251) as u8).collect();
        let packed = compress_bytes(&data);
        assert_eq!(decompress_bytes(&packed).unwrap(), data);
    }

    #[test]
    fn test_corrupt_payload_detected() {
        let data = b"pack my box with five dozen liquor jugs, then pack it again\n".repeat(18);
        let packed = compress_bytes(&data);
        let table = u32::from_le_bytes(packed[8..12].try_into().unwrap()) as usize;
        let start = COMPRESSION_HEADER_SIZE as usize + table;
        // The final byte may carry padding bits that are never read.
        for at in start..packed.len() - 1 {
            for mask in [0x01u8, 0x80, 0xFF] {
                let mut damaged = packed.clone();
                damaged[at] ^= mask;
                let err = decompress_bytes(&damaged).unwrap_err();
                assert!(
                    matches!(err, Error::ChecksumMismatch { .. }),
                    "byte {at} mask {mask:#04x}: {err}"
                );
            }
        }
    }

    #[test]
    fn test_single_symbol_one_bit_hits_placeholder() {
        let mut packed = compress_bytes(b"zzzz");
        let last = packed.len() - 1;
        packed[last] = 0xF0;
        let err = decompress_bytes(&packed).unwrap_err();
        assert!(matches!(
            err,
            Error::ChecksumMismatch { expected, .. } if expected == Crc32::compute(b"zzzz")
        ));
    }

    #[test]
    fn test_truncated_payload() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(10);
        let mut packed = compress_bytes(&data);
        packed.truncate(packed.len() - 5);
        let err = decompress_bytes(&packed).unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_table_sum_mismatch() {
        let mut packed = compress_bytes(b"AAAAABBBCC");
        packed[12..20].copy_from_slice(&11u64.to_le_bytes());
        let err = decompress_bytes(&packed).unwrap_err();
        assert!(matches!(err, Error::CorruptHeader { offset: 12, .. }));
    }

    #[test]
    fn test_wrong_tag() {
        let mut packed = compress_bytes(b"abc");
        packed[1] = 0x09;
        let err = decompress_bytes(&packed).unwrap_err();
        assert!(matches!(err, Error::FormatMismatch { tag: 0x09, .. }));
    }

    #[test]
    fn test_checksum_mismatch_removes_output() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("data.bin");
        std::fs::write(&src, b"AAAAABBBCC").unwrap();
        let compressor = HuffmanCompressor::new();
        let packed = compressor.compress_file(&src).unwrap();
        assert_eq!(packed, dir.path().join("data.bin.huff"));

        let mut bytes = std::fs::read(&packed).unwrap();
        bytes[20] ^= 0x01;
        std::fs::write(&packed, &bytes).unwrap();

        let dest = dir.path().join("restored.bin");
        let err = compressor.decompress_file(&packed, &dest).unwrap_err();
        match err {
            Error::ChecksumMismatch { path, .. } => assert_eq!(path.as_deref(), Some(packed.as_path())),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!dest.exists());
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("notes.txt");
        std::fs::write(&src, b"hello hello hello").unwrap();
        let compressor = HuffmanCompressor::new();
        let packed = compressor.compress_file(&src).unwrap();
        let dest = dir.path().join("out.txt");
        compressor.decompress_file(&packed, &dest).unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello hello hello");
    }
}
