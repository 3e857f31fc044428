//! Bit-level packing for the Huffman payload.
//!
//! Bits are packed most-significant first. A partially filled final byte is
//! padded with zero bits in its low positions; the number of padding bits
//! is what the header stores as `valid_bits`.

use std::io::{self, Read, Write};

use crate::CHUNK_SIZE;
use crate::format::reader::read_full;

/// Longest code the tree can produce: 256 leaves give at most 255 levels.
const MAX_CODE_BITS: usize = 256;

/// A variable-length prefix code of up to 256 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Code {
    words: [u64; MAX_CODE_BITS / 64],
    len: u16,
}

impl Code {
    /// Returns the number of bits in the code.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Returns `true` for the empty code (an absent symbol).
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns this code extended by one bit.
    pub fn with_bit(mut self, bit: bool) -> Self {
        let i = self.len as usize;
        debug_assert!(i < MAX_CODE_BITS);
        if bit {
            self.words[i / 64] |= 1 << (63 - i % 64);
        }
        self.len += 1;
        self
    }

    /// Returns bit `i`, counting from the first emitted bit.
    pub fn bit(&self, i: usize) -> bool {
        (self.words[i / 64] >> (63 - i % 64)) & 1 == 1
    }

    /// Renders the code as a string of `0` and `1`.
    pub fn to_bit_string(&self) -> String {
        (0..self.len()).map(|i| if self.bit(i) { '1' } else { '0' }).collect()
    }
}

/// Packs bits MSB-first into bytes and writes them to an inner writer.
pub struct BitWriter<W> {
    inner: W,
    current: u8,
    used: u8,
    bytes_written: u64,
}

impl<W: Write> BitWriter<W> {
    /// Creates a bit writer on top of `inner`.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            current: 0,
            used: 0,
            bytes_written: 0,
        }
    }

    /// Appends one bit.
    pub fn write_bit(&mut self, bit: bool) -> io::Result<()> {
        if bit {
            self.current |= 0x80 >> self.used;
        }
        self.used += 1;
        if self.used == 8 {
            self.inner.write_all(&[self.current])?;
            self.bytes_written += 1;
            self.current = 0;
            self.used = 0;
        }
        Ok(())
    }

    /// Appends every bit of `code`.
    pub fn write_code(&mut self, code: &Code) -> io::Result<()> {
        for i in 0..code.len() {
            self.write_bit(code.bit(i))?;
        }
        Ok(())
    }

    /// Returns the number of complete bytes emitted so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Flushes a partial final byte and returns the writer and padding count.
    ///
    /// The padding count is `8 - bits_used` for a partial byte and 0 when
    /// the stream ended on a byte boundary.
    pub fn finish(mut self) -> io::Result<(W, u8)> {
        let padding = if self.used == 0 {
            0
        } else {
            self.inner.write_all(&[self.current])?;
            self.bytes_written += 1;
            8 - self.used
        };
        self.inner.flush()?;
        Ok((self.inner, padding))
    }
}

/// Yields the meaningful bits of a payload of known length.
///
/// In the final payload byte only `8 - valid_bits` bits are yielded.
pub struct PayloadBits<'a, R> {
    reader: &'a mut R,
    payload_len: u64,
    consumed: u64,
    valid_bits: u8,
    buffer: Vec<u8>,
    pos: usize,
    filled: usize,
    byte: u8,
    bits_left: u8,
}

impl<'a, R: Read> PayloadBits<'a, R> {
    /// Reads up to `payload_len` bytes from `reader`.
    pub fn new(reader: &'a mut R, payload_len: u64, valid_bits: u8) -> Self {
        Self {
            reader,
            payload_len,
            consumed: 0,
            valid_bits,
            buffer: vec![0u8; CHUNK_SIZE],
            pos: 0,
            filled: 0,
            byte: 0,
            bits_left: 0,
        }
    }

    /// Returns the next bit, or `None` once the payload is exhausted.
    pub fn next_bit(&mut self) -> io::Result<Option<bool>> {
        if self.bits_left == 0 && !self.load_byte()? {
            return Ok(None);
        }
        let bit = self.byte & 0x80 != 0;
        self.byte <<= 1;
        self.bits_left -= 1;
        Ok(Some(bit))
    }

    fn load_byte(&mut self) -> io::Result<bool> {
        if self.consumed == self.payload_len {
            return Ok(false);
        }
        if self.pos == self.filled {
            let want = (self.payload_len - self.consumed).min(self.buffer.len() as u64) as usize;
            self.filled = read_full(self.reader, &mut self.buffer[..want])?;
            self.pos = 0;
            if self.filled == 0 {
                return Ok(false);
            }
        }
        self.byte = self.buffer[self.pos];
        self.pos += 1;
        self.consumed += 1;
        self.bits_left = if self.consumed == self.payload_len && self.valid_bits != 0 {
            8 - self.valid_bits
        } else {
            8
        };
        Ok(true)
    }
}
