//! Path validation for extraction.
//!
//! Container entry names come from a file that may have been tampered with.
//! Before anything is written, each name is resolved against the
//! destination directory and rejected if it could land outside it.

use std::path::{Component, Path, PathBuf};

use crate::{Error, Result};

/// Resolves a stored entry name to a path below `dest_root`.
///
/// The name `"."` maps to `dest_root` itself. Names are `/`-separated;
/// empty and `.` segments are ignored.
///
/// # Errors
///
/// Returns [`Error::PathTraversal`] when the name is absolute, carries a
/// drive prefix, contains a `..` segment, or resolves through an existing
/// symlink to a location outside `dest_root`.
pub fn resolve_entry_path(dest_root: &Path, name: &str) -> Result<PathBuf> {
    let traversal = || Error::PathTraversal {
        path: name.to_string(),
    };

    if name.starts_with('/') || name.starts_with('\\') {
        return Err(traversal());
    }

    let mut relative = PathBuf::new();
    for segment in name.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(traversal()),
            _ => {}
        }
        // A segment must be a single normal component on this platform.
        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) => relative.push(part),
            _ => return Err(traversal()),
        }
    }

    if relative.as_os_str().is_empty() {
        return Ok(dest_root.to_path_buf());
    }
    let full = dest_root.join(&relative);
    ensure_contained(dest_root, &full).map_err(|e| match e {
        Error::PathTraversal { .. } => traversal(),
        other => other,
    })?;
    Ok(full)
}

/// Verifies that the deepest existing ancestor of `full` stays inside `root`.
///
/// Catches symlinks planted inside the destination that point elsewhere.
fn ensure_contained(root: &Path, full: &Path) -> Result<()> {
    if !root.exists() {
        // Nothing below a missing root can be a planted link.
        return Ok(());
    }
    let canonical_root = root.canonicalize()?;

    let mut ancestor = full;
    while !ancestor.exists() {
        match ancestor.parent() {
            Some(parent) => ancestor = parent,
            None => return Ok(()),
        }
    }
    let canonical = ancestor.canonicalize()?;
    if !canonical.starts_with(&canonical_root) {
        return Err(Error::PathTraversal {
            path: full.display().to_string(),
        });
    }
    Ok(())
}
