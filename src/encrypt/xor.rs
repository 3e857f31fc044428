//! Repeating-key XOR stream cipher.
//!
//! This is obfuscation, not confidentiality: anyone with a known plaintext
//! prefix recovers the key. The plaintext checksum in the header is what
//! makes a wrong key detectable.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::debug;

use super::{ENCRYPTION_HEADER_SIZE, EncryptionHeader, Encryptor, effective_key};
use crate::checksum::{Checksum, Crc32, Crc32Reader, VerifyResult};
use crate::format::{ENCRYPT_MARKER, StageKind, names, tag};
use crate::fs::{append_extension, discard_untrusted};
use crate::{CHUNK_SIZE, Error, Result};

/// Extension appended to encrypted files.
pub const XOR_EXTENSION: &str = "enc";

/// Keystream position that persists across chunk boundaries.
#[derive(Debug, Clone)]
pub struct XorKeystream<'k> {
    key: &'k [u8],
    index: usize,
}

impl<'k> XorKeystream<'k> {
    /// Starts a keystream; an empty key is replaced by the default key.
    pub fn new(key: &'k [u8]) -> Self {
        Self {
            key: effective_key(key),
            index: 0,
        }
    }

    /// XORs `buf` in place and advances the key position.
    pub fn apply(&mut self, buf: &mut [u8]) {
        for byte in buf {
            *byte ^= self.key[self.index];
            self.index += 1;
            if self.index == self.key.len() {
                self.index = 0;
            }
        }
    }
}

/// XOR encryptor writing `<file>.enc` artifacts.
#[derive(Debug, Clone, Copy, Default)]
pub struct XorEncryptor;

impl XorEncryptor {
    /// Creates the encryptor.
    pub fn new() -> Self {
        Self
    }

    /// Encrypts everything `input` yields into `output`.
    pub fn encrypt_stream<R, W>(&self, input: &mut R, output: &mut W, key: &[u8]) -> Result<EncryptionHeader>
    where
        R: Read,
        W: Write + Seek,
    {
        let mut header = EncryptionHeader {
            tag: tag::SIM_XOR,
            header_size: ENCRYPTION_HEADER_SIZE,
            crc32: 0,
        };
        let header_pos = output.stream_position()?;
        header.write_to(output)?;

        let mut keystream = XorKeystream::new(key);
        let mut plain = Crc32Reader::new(input);
        let mut buffer = vec![0u8; CHUNK_SIZE];
        {
            let mut writer = BufWriter::with_capacity(CHUNK_SIZE, &mut *output);
            loop {
                let n = plain.read(&mut buffer)?;
                if n == 0 {
                    break;
                }
                keystream.apply(&mut buffer[..n]);
                writer.write_all(&buffer[..n])?;
            }
            writer.flush()?;
        }

        header.crc32 = plain.crc();
        let total = plain.bytes_read();
        let end = output.stream_position()?;
        output.seek(SeekFrom::Start(header_pos))?;
        header.write_to(output)?;
        output.seek(SeekFrom::Start(end))?;
        output.flush()?;
        debug!("xor: encrypted {} bytes, crc {:#010x}", total, header.crc32);
        Ok(header)
    }

    /// Decrypts a stream into `output` and verifies the plaintext checksum.
    pub fn decrypt_stream<R, W>(&self, input: &mut R, output: &mut W, key: &[u8]) -> Result<EncryptionHeader>
    where
        R: Read,
        W: Write,
    {
        let header = EncryptionHeader::read_from(input)?;
        if header.tag != tag::SIM_XOR {
            return Err(Error::FormatMismatch {
                expected: StageKind::Encrypted,
                marker: ENCRYPT_MARKER,
                tag: header.tag,
            });
        }
        let extra = u64::from(header.header_size - ENCRYPTION_HEADER_SIZE);
        if extra > 0 {
            std::io::copy(&mut input.by_ref().take(extra), &mut std::io::sink())?;
        }

        let mut keystream = XorKeystream::new(key);
        let mut crc = Crc32::new();
        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut writer = BufWriter::with_capacity(CHUNK_SIZE, output);
        loop {
            let n = input.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            keystream.apply(&mut buffer[..n]);
            crc.update(&buffer[..n]);
            writer.write_all(&buffer[..n])?;
        }
        writer.flush()?;

        match VerifyResult::compare(header.crc32, crc.finalize()) {
            VerifyResult::Match => Ok(header),
            VerifyResult::Mismatch { expected, actual } => Err(Error::ChecksumMismatch {
                path: None,
                expected,
                actual,
            }),
        }
    }
}

impl Encryptor for XorEncryptor {
    fn name(&self) -> &'static str {
        names::SIM_XOR
    }

    fn tag(&self) -> u8 {
        tag::SIM_XOR
    }

    fn extension(&self) -> &'static str {
        XOR_EXTENSION
    }

    fn encrypt_file(&self, path: &Path, key: &[u8]) -> Result<PathBuf> {
        let dest = append_extension(path, XOR_EXTENSION);
        let mut input = BufReader::with_capacity(CHUNK_SIZE, File::open(path)?);
        let mut output = File::create(&dest)?;
        self.encrypt_stream(&mut input, &mut output, key)?;
        output.sync_all()?;
        debug!("encrypted {} -> {}", path.display(), dest.display());
        Ok(dest)
    }

    fn decrypt_file(&self, src: &Path, dest: &Path, key: &[u8]) -> Result<()> {
        let mut input = BufReader::with_capacity(CHUNK_SIZE, File::open(src)?);
        let mut output = File::create(dest)?;
        match self.decrypt_stream(&mut input, &mut output, key) {
            Ok(_) => {
                debug!("decrypted {} -> {}", src.display(), dest.display());
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

    fn encrypt_bytes(data: &[u8], key: &[u8]) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        XorEncryptor::new()
            .encrypt_stream(&mut Cursor::new(data), &mut out, key)
            .unwrap();
        out.into_inner()
    }

    fn decrypt_bytes(data: &[u8], key: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        XorEncryptor::new().decrypt_stream(&mut Cursor::new(data), &mut out, key)?;
        Ok(out)
    }

    #[test]
    fn test_known_ciphertext() {
        let sealed = encrypt_bytes(b"secret", b"k");
        assert_eq!(sealed.len(), 16);
        assert_eq!(&sealed[..2], &[0x31, 0x01]);
        assert_eq!(&sealed[6..10], &Crc32::compute(b"secret").to_le_bytes());
        let expected: Vec<u8> = b"secret".iter().map(|b| b ^ b'k').collect();
        assert_eq!(&sealed[10..], expected.as_slice());
    }

    #[test]
    fn test_wrong_key_is_checksum_mismatch() {
        let sealed = encrypt_bytes(b"secret", b"k");
        let err = decrypt_bytes(&sealed, b"x").unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch { .. }));
        assert_eq!(decrypt_bytes(&sealed, b"k").unwrap(), b"secret");
    }

    #[test]
    fn test_empty_key_uses_default() {
        let a = encrypt_bytes(b"payload", b"");
        let b = encrypt_bytes(b"payload", super::super::DEFAULT_KEY);
        assert_eq!(a, b);
        assert_eq!(decrypt_bytes(&a, b"").unwrap(), b"payload");
    }

    #[test]
    fn test_keystream_persists_across_chunks() {
        let data: Vec<u8> = (0..CHUNK_SIZE + 3).map(|i| i as u8).collect();
        let key = b"abcde";
        let sealed = encrypt_bytes(&data, key);
        for (i, (&c, &p)) in sealed[10..].iter().zip(&data).enumerate() {
            assert_eq!(c, p ^ key[i % key.len()], "byte {i}");
        }
    }

    #[test]
    fn test_key_longer_than_data() {
        let sealed = encrypt_bytes(b"ab", b"a much longer key");
        assert_eq!(decrypt_bytes(&sealed, b"a much longer key").unwrap(), b"ab");
    }

    #[test]
    fn test_empty_input() {
        let sealed = encrypt_bytes(b"", b"k");
        assert_eq!(sealed.len(), ENCRYPTION_HEADER_SIZE as usize);
        assert!(decrypt_bytes(&sealed, b"k").unwrap().is_empty());
    }

    #[test]
    fn test_decrypt_file_removes_output_on_wrong_key() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("backup.huff");
        std::fs::write(&src, b"some content").unwrap();
        let enc = XorEncryptor::new();
        let sealed = enc.encrypt_file(&src, b"right").unwrap();
        assert_eq!(sealed, dir.path().join("backup.huff.enc"));

        let dest = dir.path().join("plain");
        let err = enc.decrypt_file(&sealed, &dest, b"wrong").unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch { path: Some(_), .. }));
        assert!(!dest.exists());

        enc.decrypt_file(&sealed, &dest, b"right").unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"some content");
    }
}
