//! The `Basic` container layout.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use super::{
    ContainerHeader, FileEntryMeta, FileKind, LARGE_ENTRY_WARNING, MAX_EXTRACT_CHUNK, PackOptions,
    Packer, UnpackSummary,
};
use crate::format::reader::read_full;
use crate::format::{StageKind, names, tag};
use crate::fs::{ensure_dir, long_path, relative_name};
use crate::safety::resolve_entry_path;
use crate::{CHUNK_SIZE, Error, Result};

/// Packer for the `Basic` container layout.
///
/// # Example
///
/// ```rust,no_run
/// use backpipe::pack::{BasicPacker, PackOptions, Packer};
/// use std::path::{Path, PathBuf};
///
/// let packer = BasicPacker::new();
/// let files = vec![PathBuf::from("/data/project"), PathBuf::from("/data/project/a.txt")];
/// let container = packer.pack(&files, Path::new("/backups"), &PackOptions::default())?;
/// packer.unpack(&container, Path::new("/restore"))?;
/// # Ok::<(), backpipe::Error>(())
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicPacker;

impl BasicPacker {
    /// Creates a new packer.
    pub fn new() -> Self {
        Self
    }

    /// Builds the metadata for `files`, stored relative to `root`.
    fn build_entries(
        &self,
        root: &Path,
        files: &[PathBuf],
        options: &PackOptions,
    ) -> Result<Vec<FileEntryMeta>> {
        let mut entries = Vec::with_capacity(files.len());
        let mut offset = 0u64;
        for path in files {
            let meta = if options.follow_symlinks {
                fs::metadata(long_path(path))
            } else {
                fs::symlink_metadata(long_path(path))
            }
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::NotFound { path: path.clone() }
                } else {
                    Error::Io(e)
                }
            })?;
            let kind = FileKind::from_file_type(&meta.file_type());
            let size = if kind == FileKind::Regular { meta.len() } else { 0 };
            entries.push(FileEntryMeta {
                name: relative_name(root, path)?,
                size,
                offset: if kind == FileKind::Regular { offset } else { 0 },
                kind,
            });
            offset += size;
        }
        Ok(entries)
    }

    /// Reads the header and all metadata entries.
    fn read_index<R: Read>(&self, reader: &mut R) -> Result<(ContainerHeader, Vec<FileEntryMeta>)> {
        let header = ContainerHeader::read_from(reader)?;
        if header.tag != self.tag() {
            return Err(Error::FormatMismatch {
                expected: StageKind::Packed,
                marker: crate::format::PACK_MARKER,
                tag: header.tag,
            });
        }

        let limit = header.content_start as u64;
        let mut pos = super::CONTAINER_HEADER_SIZE as u64;
        let mut entries = Vec::with_capacity(header.entry_count.min(4096) as usize);
        for _ in 0..header.entry_count {
            let entry = FileEntryMeta::read_from(reader, pos, limit)?;
            pos += entry.encoded_len();
            entries.push(entry);
        }
        if pos != limit {
            log::warn!(
                "container metadata ends at {} but content starts at {}",
                pos,
                limit
            );
        }
        Ok((header, entries))
    }
}

/// Seconds since the Unix epoch, used in container file names.
fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Streams exactly `size` bytes from `src` into `dst`.
fn copy_exact<R: Read, W: Write>(
    src: &mut R,
    dst: &mut W,
    size: u64,
    chunk: usize,
    context: &str,
) -> Result<u64> {
    let mut buffer = vec![0u8; chunk.min(size.max(1) as usize)];
    let mut remaining = size;
    while remaining > 0 {
        let want = buffer.len().min(remaining as usize);
        let n = read_full(src, &mut buffer[..want])?;
        if n == 0 {
            return Err(Error::TruncatedData {
                context: context.to_string(),
                expected: size,
                actual: size - remaining,
            });
        }
        dst.write_all(&buffer[..n])?;
        remaining -= n as u64;
    }
    Ok(size)
}

impl Packer for BasicPacker {
    fn name(&self) -> &'static str {
        names::BASIC
    }

    fn tag(&self) -> u8 {
        tag::BASIC
    }

    fn pack(&self, files: &[PathBuf], dest_dir: &Path, options: &PackOptions) -> Result<PathBuf> {
        let first = files.first().ok_or(Error::EmptyInput)?;
        let files: Vec<PathBuf> = files
            .iter()
            .map(std::path::absolute)
            .collect::<std::io::Result<_>>()?;
        let first_abs = &files[0];
        let root = match first_abs.parent() {
            Some(parent) => parent.to_path_buf(),
            None => first_abs.clone(),
        };
        log::debug!(
            "packing {} entries from {} (root {})",
            files.len(),
            first.display(),
            root.display()
        );

        let entries = self.build_entries(&root, &files, options)?;
        let header = ContainerHeader::for_entries(self.tag(), &entries)?;

        ensure_dir(dest_dir)?;
        let output = dest_dir.join(format!("backup_{}.{}", unix_timestamp(), self.name()));
        let mut writer = BufWriter::with_capacity(CHUNK_SIZE, File::create(long_path(&output))?);

        header.write_to(&mut writer)?;
        for entry in &entries {
            entry.write_to(&mut writer)?;
        }
        for (entry, path) in entries.iter().zip(&files) {
            if entry.kind != FileKind::Regular {
                continue;
            }
            let mut input = File::open(long_path(path))?;
            copy_exact(&mut input, &mut writer, entry.size, CHUNK_SIZE, &entry.name)?;
        }
        writer.flush()?;

        log::info!("packed {} entries into {}", entries.len(), output.display());
        Ok(output)
    }

    fn unpack(&self, container: &Path, dest_dir: &Path) -> Result<UnpackSummary> {
        let file = File::open(long_path(container)).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound {
                    path: container.to_path_buf(),
                }
            } else {
                Error::Io(e)
            }
        })?;
        let mut reader = BufReader::with_capacity(CHUNK_SIZE, file);
        let (header, entries) = self.read_index(&mut reader)?;
        let content_start = header.content_start as u64;

        let mut summary = UnpackSummary::default();
        for entry in &entries {
            let target = resolve_entry_path(dest_dir, &entry.name)?;
            match entry.kind {
                FileKind::Directory => {
                    ensure_dir(&target)?;
                    summary.directories += 1;
                }
                FileKind::Regular => {
                    if entry.size > LARGE_ENTRY_WARNING {
                        log::warn!(
                            "entry {} declares {} bytes; extracting anyway",
                            entry.name,
                            entry.size
                        );
                    }
                    let start = content_start.checked_add(entry.offset).ok_or_else(|| Error::CorruptHeader {
                        offset: content_start,
                        reason: format!("entry {} has content offset {} out of range", entry.name, entry.offset),
                    })?;
                    reader.seek(SeekFrom::Start(start))?;
                    if let Some(parent) = target.parent() {
                        ensure_dir(parent)?;
                    }
                    let mut output = BufWriter::new(File::create(long_path(&target))?);
                    copy_exact(&mut reader, &mut output, entry.size, MAX_EXTRACT_CHUNK, &entry.name)?;
                    output.flush()?;
                    summary.files += 1;
                    summary.bytes += entry.size;
                }
                other => {
                    log::warn!("skipping {} entry {}", other.name(), entry.name);
                    summary.skipped += 1;
                }
            }
        }

        log::info!(
            "unpacked {} files and {} directories into {}",
            summary.files,
            summary.directories,
            dest_dir.display()
        );
        Ok(summary)
    }

    fn list(&self, container: &Path) -> Result<Vec<FileEntryMeta>> {
        let mut reader = BufReader::new(File::open(long_path(container))?);
        let (_, entries) = self.read_index(&mut reader)?;
        Ok(entries)
    }
}
