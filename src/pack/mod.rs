//! Container format: many files and directories in one self-describing file.
//!
//! # Layout
//!
//! ```text
//! +--------+-----+-------------+---------------+
//! | marker | tag | entry count | content start |   header, 10 bytes
//! +--------+-----+-------------+---------------+
//! | name len | name | size | offset | kind |       repeated entry count times
//! +----------+------+------+--------+------+
//! | content of every regular entry, in entry order |
//! +------------------------------------------------+
//! ```
//!
//! `content start` is the absolute file offset of the first content byte,
//! i.e. the header size plus the size of all metadata entries. Each regular
//! entry's `offset` is relative to it, and the offsets of regular entries
//! tile the content region without gaps in the order they were written.
//!
//! All integers are little-endian; `entry count`, `content start` and
//! `name len` are 4 bytes, `size` and `offset` are 8 bytes.

mod basic;

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

pub use basic::BasicPacker;

use crate::format::reader::{read_bytes, read_u8, read_u32_le, read_u64_le, write_u32_le, write_u64_le};
use crate::format::{PACK_MARKER, StageKind};
use crate::{Error, Result, truncated_on_eof};

/// Size of the fixed container header in bytes.
pub const CONTAINER_HEADER_SIZE: u32 = 10;

/// Largest read issued while extracting a single entry.
pub const MAX_EXTRACT_CHUNK: usize = 1024 * 1024;

/// Entries larger than this are extracted with a warning.
pub const LARGE_ENTRY_WARNING: u64 = 1024 * 1024 * 1024;

/// Encoded size of an entry, excluding its name bytes.
const ENTRY_FIXED_SIZE: u64 = 4 + 8 + 8 + 1;

/// The kind of filesystem object an entry describes.
///
/// Only [`Regular`][Self::Regular] and [`Directory`][Self::Directory] are
/// restored; the remaining kinds are recorded so a listing is faithful, and
/// skipped with a warning on unpack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FileKind {
    /// A regular file with content.
    Regular = 0,
    /// A directory.
    Directory = 1,
    /// A symbolic link that was not followed.
    SymbolicLink = 2,
    /// A character device.
    CharacterDevice = 3,
    /// A block device.
    BlockDevice = 4,
    /// A named pipe.
    Fifo = 5,
    /// A Unix domain socket.
    Socket = 6,
}

impl FileKind {
    /// Returns the byte stored in the entry metadata.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Parses a stored kind byte.
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => FileKind::Regular,
            1 => FileKind::Directory,
            2 => FileKind::SymbolicLink,
            3 => FileKind::CharacterDevice,
            4 => FileKind::BlockDevice,
            5 => FileKind::Fifo,
            6 => FileKind::Socket,
            _ => return None,
        })
    }

    /// Classifies a filesystem object without following symlinks.
    pub fn from_file_type(file_type: &std::fs::FileType) -> Self {
        if file_type.is_symlink() {
            return FileKind::SymbolicLink;
        }
        if file_type.is_dir() {
            return FileKind::Directory;
        }
        if file_type.is_file() {
            return FileKind::Regular;
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileTypeExt;
            if file_type.is_char_device() {
                return FileKind::CharacterDevice;
            }
            if file_type.is_block_device() {
                return FileKind::BlockDevice;
            }
            if file_type.is_fifo() {
                return FileKind::Fifo;
            }
            if file_type.is_socket() {
                return FileKind::Socket;
            }
        }
        FileKind::Regular
    }

    /// Returns a short human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            FileKind::Regular => "file",
            FileKind::Directory => "directory",
            FileKind::SymbolicLink => "symlink",
            FileKind::CharacterDevice => "char device",
            FileKind::BlockDevice => "block device",
            FileKind::Fifo => "fifo",
            FileKind::Socket => "socket",
        }
    }
}

/// Metadata for one packed item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntryMeta {
    /// Path relative to the parent of the packed root, `/`-separated.
    pub name: String,
    /// Content length in bytes; 0 for everything but regular files.
    pub size: u64,
    /// Position of the content relative to the content region.
    pub offset: u64,
    /// What kind of object this is.
    pub kind: FileKind,
}

impl FileEntryMeta {
    /// Returns the number of bytes this entry occupies in the metadata region.
    pub fn encoded_len(&self) -> u64 {
        ENTRY_FIXED_SIZE + self.name.len() as u64
    }

    /// Writes this entry in container layout.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        let name_len = u32::try_from(self.name.len()).map_err(|_| Error::CorruptHeader {
            offset: 0,
            reason: format!("entry name too long: {} bytes", self.name.len()),
        })?;
        write_u32_le(w, name_len)?;
        w.write_all(self.name.as_bytes())?;
        write_u64_le(w, self.size)?;
        write_u64_le(w, self.offset)?;
        w.write_all(&[self.kind.tag()])?;
        Ok(())
    }

    /// Reads one entry starting at metadata offset `pos`.
    ///
    /// `limit` is the content start; an entry that would extend past it is
    /// rejected before its name is allocated.
    pub fn read_from<R: Read>(r: &mut R, pos: u64, limit: u64) -> Result<Self> {
        let name_len = read_u32_le(r).map_err(truncated_on_eof("entry metadata", 4))? as u64;
        if pos + ENTRY_FIXED_SIZE + name_len > limit {
            return Err(Error::CorruptHeader {
                offset: pos,
                reason: format!("entry of {} name bytes overruns the content start {}", name_len, limit),
            });
        }
        let name = read_bytes(r, name_len as usize).map_err(truncated_on_eof("entry name", name_len))?;
        let name = String::from_utf8(name).map_err(|_| Error::CorruptHeader {
            offset: pos + 4,
            reason: "entry name is not valid UTF-8".into(),
        })?;
        let size = read_u64_le(r).map_err(truncated_on_eof("entry metadata", 8))?;
        let offset = read_u64_le(r).map_err(truncated_on_eof("entry metadata", 8))?;
        let kind_tag = read_u8(r).map_err(truncated_on_eof("entry metadata", 1))?;
        let kind = FileKind::from_tag(kind_tag).ok_or_else(|| Error::CorruptHeader {
            offset: pos + ENTRY_FIXED_SIZE + name_len - 1,
            reason: format!("unknown entry kind {}", kind_tag),
        })?;
        Ok(Self {
            name,
            size,
            offset,
            kind,
        })
    }
}

/// The fixed header at the start of every container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHeader {
    /// Algorithm tag of the packer that wrote the container.
    pub tag: u8,
    /// Number of metadata entries.
    pub entry_count: u32,
    /// Absolute offset of the content region.
    pub content_start: u32,
}

impl ContainerHeader {
    /// Builds the header for a container with the given entries.
    pub fn for_entries(tag: u8, entries: &[FileEntryMeta]) -> Result<Self> {
        let metadata: u64 = entries.iter().map(FileEntryMeta::encoded_len).sum();
        let content_start = u32::try_from(CONTAINER_HEADER_SIZE as u64 + metadata).map_err(|_| {
            Error::CorruptHeader {
                offset: 0,
                reason: format!("metadata region of {} bytes exceeds the 4-byte limit", metadata),
            }
        })?;
        let entry_count = u32::try_from(entries.len()).map_err(|_| Error::CorruptHeader {
            offset: 2,
            reason: format!("{} entries exceed the 4-byte limit", entries.len()),
        })?;
        Ok(Self {
            tag,
            entry_count,
            content_start,
        })
    }

    /// Writes the header in container layout.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&[PACK_MARKER, self.tag])?;
        write_u32_le(w, self.entry_count)?;
        write_u32_le(w, self.content_start)?;
        Ok(())
    }

    /// Reads and validates the header marker.
    ///
    /// The algorithm tag is returned as-is; the packer checks it.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let mut head = [0u8; 2];
        r.read_exact(&mut head)
            .map_err(truncated_on_eof("container header", CONTAINER_HEADER_SIZE as u64))?;
        if head[0] != PACK_MARKER {
            return Err(Error::FormatMismatch {
                expected: StageKind::Packed,
                marker: head[0],
                tag: head[1],
            });
        }
        let entry_count = read_u32_le(r)
            .map_err(truncated_on_eof("container header", CONTAINER_HEADER_SIZE as u64))?;
        let content_start = read_u32_le(r)
            .map_err(truncated_on_eof("container header", CONTAINER_HEADER_SIZE as u64))?;
        if content_start < CONTAINER_HEADER_SIZE {
            return Err(Error::CorruptHeader {
                offset: 6,
                reason: format!("content start {} lies inside the header", content_start),
            });
        }
        let minimum = CONTAINER_HEADER_SIZE as u64 + entry_count as u64 * ENTRY_FIXED_SIZE;
        if minimum > content_start as u64 {
            return Err(Error::CorruptHeader {
                offset: 2,
                reason: format!(
                    "{} entries cannot fit before content start {}",
                    entry_count, content_start
                ),
            });
        }
        Ok(Self {
            tag: head[1],
            entry_count,
            content_start,
        })
    }
}

/// Counts of what an unpack produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnpackSummary {
    /// Directory entries created.
    pub directories: usize,
    /// Regular files written.
    pub files: usize,
    /// Entries of other kinds that were skipped.
    pub skipped: usize,
    /// Content bytes written.
    pub bytes: u64,
}

/// Options controlling how [`Packer::pack`] reads its inputs.
#[derive(Debug, Clone, Default)]
pub struct PackOptions {
    /// Store the target of a symlink instead of the link itself.
    pub follow_symlinks: bool,
}

/// A container algorithm.
///
/// Implementations are registered by name in a
/// [`Registry`](crate::Registry); the pipeline only talks to this trait.
pub trait Packer: Send + Sync {
    /// Returns the registered algorithm name.
    fn name(&self) -> &'static str;

    /// Returns the algorithm tag written into byte 1.
    fn tag(&self) -> u8;

    /// Bundles `files` into a new container inside `dest_dir`.
    ///
    /// Entries are stored relative to the parent of the first path, in the
    /// order given. Returns the path of the new container.
    fn pack(&self, files: &[PathBuf], dest_dir: &Path, options: &PackOptions) -> Result<PathBuf>;

    /// Restores every entry of `container` below `dest_dir`.
    fn unpack(&self, container: &Path, dest_dir: &Path) -> Result<UnpackSummary>;

    /// Reads the entry metadata of `container` without extracting.
    fn list(&self, container: &Path) -> Result<Vec<FileEntryMeta>>;
}
