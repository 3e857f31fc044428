//! Filesystem helpers used by the pipeline.
//!
//! These cover the collaborator operations the pipeline needs around the
//! codecs: enumerating a source tree, mirroring it, probing a destination
//! for write access and naming intermediate artifacts.

use std::borrow::Cow;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use filetime::FileTime;
use walkdir::WalkDir;

use crate::{Error, Result};

/// Name of the probe file created by [`is_writable_dir`].
pub const WRITE_PROBE_NAME: &str = ".test_write_permission.tmp";

/// Paths at least this long get the extended-length prefix on Windows.
const LONG_PATH_THRESHOLD: usize = 240;

/// Returns `true` if `dir` is a directory this process can create files in.
///
/// The check creates and removes [`WRITE_PROBE_NAME`] inside `dir`.
pub fn is_writable_dir(dir: &Path) -> bool {
    if !dir.is_dir() {
        return false;
    }
    let probe = dir.join(WRITE_PROBE_NAME);
    match fs::File::create(&probe) {
        Ok(file) => {
            drop(file);
            if let Err(e) = fs::remove_file(&probe) {
                log::warn!("cannot remove write probe {}: {}", probe.display(), e);
            }
            true
        }
        Err(e) => {
            log::debug!("{} is not writable: {}", dir.display(), e);
            false
        }
    }
}

/// Creates `dir` and all missing parents.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(long_path(dir)).map_err(|source| Error::DirCreateFailed {
        path: dir.to_path_buf(),
        source,
    })
}

/// Copies one regular file byte-for-byte and carries over its mtime.
///
/// Returns the number of bytes copied.
pub fn copy_file(src: &Path, dst: &Path) -> Result<u64> {
    let bytes = fs::copy(long_path(src), long_path(dst))?;
    let meta = fs::metadata(src)?;
    let mtime = FileTime::from_last_modification_time(&meta);
    if let Err(e) = filetime::set_file_mtime(long_path(dst), mtime) {
        log::debug!("cannot preserve mtime of {}: {}", dst.display(), e);
    }
    Ok(bytes)
}

/// Copies `src` to `dst`, recursing into directories.
///
/// Directories are created before their children. Symlinks are recreated
/// on Unix and skipped with a warning elsewhere. Returns the number of
/// regular files copied.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<usize> {
    if !src.is_dir() {
        copy_file(src, dst)?;
        return Ok(1);
    }

    let mut files = 0;
    for entry in WalkDir::new(src).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|_| Error::PathTraversal {
                path: entry.path().display().to_string(),
            })?;
        let target = dst.join(relative);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            ensure_dir(&target)?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            copy_file(entry.path(), &target)?;
            files += 1;
        }
    }
    Ok(files)
}

/// Recreates the symlink `src` at `dst` without following it.
#[cfg(unix)]
pub(crate) fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    let target = fs::read_link(src)?;
    std::os::unix::fs::symlink(target, dst)?;
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn copy_symlink(src: &Path, _dst: &Path) -> Result<()> {
    log::warn!("skipping symlink {}", src.display());
    Ok(())
}

/// Removes a file, symlink or whole directory tree.
pub fn remove_path(path: &Path) -> Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.is_dir() {
        fs::remove_dir_all(long_path(path))?;
    } else {
        fs::remove_file(long_path(path))?;
    }
    Ok(())
}

/// Removes a file whose content failed verification.
///
/// Failures are logged rather than returned so the verification error
/// stays the one the caller sees.
pub(crate) fn discard_untrusted(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            log::warn!("could not remove untrusted output {}: {}", path.display(), e);
        }
    }
}

/// Enumerates `root` in pre-order: `root` first, each directory before its
/// children, siblings sorted by file name.
///
/// Without `recursive` only the direct children of `root` are listed.
/// `keep` receives each entry's `/`-separated path relative to `root` and
/// whether it is a directory; a rejected directory is pruned with its whole
/// subtree. Entries that cannot be read for lack of permission are skipped
/// with a warning.
pub fn collect_entries<F>(
    root: &Path,
    recursive: bool,
    follow_symlinks: bool,
    mut keep: F,
) -> Result<Vec<PathBuf>>
where
    F: FnMut(&str, bool) -> bool,
{
    if fs::symlink_metadata(root).is_err() {
        return Err(Error::NotFound {
            path: root.to_path_buf(),
        });
    }

    let walker = WalkDir::new(root)
        .follow_links(follow_symlinks)
        .max_depth(if recursive { usize::MAX } else { 1 })
        .sort_by_file_name();

    let mut entries = Vec::new();
    let mut iter = walker.into_iter();
    while let Some(next) = iter.next() {
        let entry = match next {
            Ok(entry) => entry,
            Err(e) => {
                let denied = e
                    .io_error()
                    .is_some_and(|io| io.kind() == io::ErrorKind::PermissionDenied);
                if denied {
                    log::warn!("skipping unreadable entry: {}", e);
                    continue;
                }
                return Err(io::Error::from(e).into());
            }
        };

        if entry.depth() > 0 {
            let relative = relative_name(root, entry.path())?;
            let is_dir = entry.file_type().is_dir();
            if !keep(&relative, is_dir) {
                if is_dir {
                    iter.skip_current_dir();
                }
                continue;
            }
        }
        entries.push(entry.into_path());
    }
    Ok(entries)
}

/// Returns `path` relative to `root`, `/`-separated, with `"."` for the root.
///
/// # Errors
///
/// Returns [`Error::PathTraversal`] if `path` is not below `root`, or
/// [`Error::InvalidConfig`] if a component is not valid UTF-8.
pub fn relative_name(root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(root).map_err(|_| Error::PathTraversal {
        path: path.display().to_string(),
    })?;
    let mut parts = Vec::new();
    for component in relative.components() {
        let part = component.as_os_str().to_str().ok_or_else(|| {
            Error::InvalidConfig(format!("path is not valid UTF-8: {}", path.display()))
        })?;
        if part != "." {
            parts.push(part);
        }
    }
    if parts.is_empty() {
        Ok(".".to_string())
    } else {
        Ok(parts.join("/"))
    }
}

/// Drops the last extension of an artifact path.
///
/// `backup_1.Basic.huff` becomes `backup_1.Basic`. A path without an
/// extension gets `.restored` appended instead so the result never equals
/// the input.
pub fn strip_last_extension(path: &Path) -> PathBuf {
    if path.extension().is_some() {
        path.with_extension("")
    } else {
        let mut name = path.as_os_str().to_owned();
        name.push(".restored");
        PathBuf::from(name)
    }
}

/// Appends `.ext` to a path without replacing an existing extension.
pub fn append_extension(path: &Path, ext: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

/// Rewrites a long absolute path into its extended-length form.
///
/// `C:\dir\...` becomes `\\?\C:\dir\...` and `\\server\share\...` becomes
/// `\\?\UNC\server\share\...`. Paths that already carry the prefix are
/// returned unchanged.
pub fn extended_length_form(path: &str) -> String {
    if path.starts_with(r"\\?\") {
        path.to_string()
    } else if let Some(unc) = path.strip_prefix(r"\\") {
        format!(r"\\?\UNC\{}", unc)
    } else {
        format!(r"\\?\{}", path)
    }
}

/// Returns a path usable even when it exceeds the platform's length limit.
///
/// On Windows, long paths are made absolute and given the extended-length
/// prefix. Elsewhere the path is returned as-is.
pub fn long_path(path: &Path) -> Cow<'_, Path> {
    if cfg!(windows) && path.as_os_str().len() >= LONG_PATH_THRESHOLD {
        let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        let text = absolute.to_string_lossy();
        return Cow::Owned(PathBuf::from(extended_length_form(&text)));
    }
    Cow::Borrowed(path)
}
