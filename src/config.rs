//! Backup configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use regex::Regex;

use crate::format::names;
use crate::fs::{ensure_dir, is_writable_dir};
use crate::{Error, Result};

/// Default compression level.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 1;

/// Everything a backup run needs to know.
///
/// Built in the usual builder style; fallible setters validate eagerly.
///
/// # Example
///
/// ```rust
/// use backpipe::BackupConfig;
///
/// let config = BackupConfig::new("/home/me/docs", "/mnt/backups")
///     .exclude(r"\.tmp$")?
///     .compress("Huffman")
///     .encrypt("SimXOR", "hunter2");
/// assert!(config.is_packing());
/// assert_eq!(config.packer_name(), "Basic");
/// # Ok::<(), backpipe::Error>(())
/// ```
#[derive(Clone)]
pub struct BackupConfig {
    /// The file or directory to back up.
    pub source: PathBuf,
    /// Additional roots. Accepted but not backed up; only `source` is.
    pub extra_sources: Vec<PathBuf>,
    /// Directory receiving the backup.
    pub destination: PathBuf,
    /// Descend into subdirectories (default `true`).
    pub recursive: bool,
    /// Follow symbolic links while enumerating and packing (default `false`).
    pub follow_symlinks: bool,
    /// Packer name, if packing was requested explicitly.
    pub pack: Option<String>,
    /// Compressor name.
    pub compress: Option<String>,
    /// Compression level, 1-9.
    pub compression_level: u32,
    /// Encryptor name.
    pub encrypt: Option<String>,
    /// Encryption key.
    pub key: String,
    /// Free-form description stored with the backup record.
    pub description: String,
    /// Free-form options for custom algorithms.
    pub options: BTreeMap<String, String>,
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl BackupConfig {
    /// Creates a mirror-copy configuration from `source` to `destination`.
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            extra_sources: Vec::new(),
            destination: destination.into(),
            recursive: true,
            follow_symlinks: false,
            pack: None,
            compress: None,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            encrypt: None,
            key: String::new(),
            description: String::new(),
            options: BTreeMap::new(),
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }

    /// Adds another source root.
    pub fn extra_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.extra_sources.push(path.into());
        self
    }

    /// Sets whether subdirectories are walked.
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Sets whether symbolic links are followed.
    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Adds an include pattern, matched against paths relative to the source.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRegex`] if the pattern does not compile.
    pub fn include(mut self, pattern: &str) -> Result<Self> {
        self.include.push(compile(pattern)?);
        Ok(self)
    }

    /// Adds an exclude pattern, matched against paths relative to the source.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRegex`] if the pattern does not compile.
    pub fn exclude(mut self, pattern: &str) -> Result<Self> {
        self.exclude.push(compile(pattern)?);
        Ok(self)
    }

    /// Packs the source with the named packer.
    pub fn pack(mut self, name: impl Into<String>) -> Self {
        self.pack = Some(name.into());
        self
    }

    /// Compresses the packed container with the named compressor.
    pub fn compress(mut self, name: impl Into<String>) -> Self {
        self.compress = Some(name.into());
        self
    }

    /// Sets the compression level.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCompressionLevel`] outside 1-9.
    pub fn compression_level(mut self, level: u32) -> Result<Self> {
        check_level(level)?;
        self.compression_level = level;
        Ok(self)
    }

    /// Encrypts the last artifact with the named encryptor and key.
    pub fn encrypt(mut self, name: impl Into<String>, key: impl Into<String>) -> Self {
        self.encrypt = Some(name.into());
        self.key = key.into();
        self
    }

    /// Sets the record description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets a free-form option.
    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Returns `true` if the run produces a container rather than a mirror.
    ///
    /// Compression and encryption operate on a container, so either implies
    /// packing.
    pub fn is_packing(&self) -> bool {
        self.pack.is_some() || self.compress.is_some() || self.encrypt.is_some()
    }

    /// Returns the packer to use, defaulting to `Basic` when packing is implied.
    pub fn packer_name(&self) -> &str {
        self.pack.as_deref().unwrap_or(names::BASIC)
    }

    /// Returns the include patterns as written.
    pub fn include_patterns(&self) -> Vec<&str> {
        self.include.iter().map(Regex::as_str).collect()
    }

    /// Returns the exclude patterns as written.
    pub fn exclude_patterns(&self) -> Vec<&str> {
        self.exclude.iter().map(Regex::as_str).collect()
    }

    /// Decides whether an enumerated entry takes part in the backup.
    ///
    /// `rel_path` is relative to the source and `/`-separated. Exclusion
    /// wins; include patterns only restrict files, so directories stay
    /// walkable.
    pub fn should_include(&self, rel_path: &str, is_dir: bool) -> bool {
        if self.exclude.iter().any(|re| re.is_match(rel_path)) {
            return false;
        }
        if is_dir || self.include.is_empty() {
            return true;
        }
        self.include.iter().any(|re| re.is_match(rel_path))
    }

    /// Checks the configuration and prepares the destination.
    ///
    /// The destination directory is created when missing.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidConfig`] for an empty source or destination, or a
    ///   missing key when encrypting
    /// - [`Error::NotFound`] if the source does not exist
    /// - [`Error::InvalidCompressionLevel`] for a level outside 1-9
    /// - [`Error::DestinationNotWritable`] if the destination rejects writes
    pub fn validate(&self) -> Result<()> {
        if self.source.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("source path is empty".into()));
        }
        if self.destination.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("destination path is empty".into()));
        }
        if self.compress.is_some() {
            check_level(self.compression_level)?;
        }
        if self.encrypt.is_some() && self.key.is_empty() {
            return Err(Error::InvalidConfig("encryption requires a key".into()));
        }
        if std::fs::symlink_metadata(&self.source).is_err() {
            return Err(Error::NotFound {
                path: self.source.clone(),
            });
        }
        ensure_dir(&self.destination)?;
        if !is_writable_dir(&self.destination) {
            return Err(Error::DestinationNotWritable {
                path: self.destination.clone(),
            });
        }
        Ok(())
    }

    /// Returns the name the source is mirrored under in the destination.
    pub fn source_name(&self) -> Option<&std::ffi::OsStr> {
        self.source.file_name()
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::InvalidRegex {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

fn check_level(level: u32) -> Result<()> {
    if (1..=9).contains(&level) {
        Ok(())
    } else {
        Err(Error::InvalidCompressionLevel { level })
    }
}

impl fmt::Debug for BackupConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackupConfig")
            .field("source", &self.source)
            .field("extra_sources", &self.extra_sources)
            .field("destination", &self.destination)
            .field("recursive", &self.recursive)
            .field("follow_symlinks", &self.follow_symlinks)
            .field("include", &self.include_patterns())
            .field("exclude", &self.exclude_patterns())
            .field("pack", &self.pack)
            .field("compress", &self.compress)
            .field("compression_level", &self.compression_level)
            .field("encrypt", &self.encrypt)
            .field("key", &if self.key.is_empty() { "" } else { "<redacted>" })
            .field("description", &self.description)
            .field("options", &self.options)
            .finish()
    }
}

impl fmt::Display for BackupConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Source:       {}", self.source.display())?;
        writeln!(f, "Destination:  {}", self.destination.display())?;
        writeln!(
            f,
            "Walk:         {}{}",
            if self.recursive { "recursive" } else { "top level only" },
            if self.follow_symlinks { ", following symlinks" } else { "" }
        )?;
        if !self.include.is_empty() {
            writeln!(f, "Include:      {}", self.include_patterns().join(", "))?;
        }
        if !self.exclude.is_empty() {
            writeln!(f, "Exclude:      {}", self.exclude_patterns().join(", "))?;
        }
        if self.is_packing() {
            writeln!(f, "Pack:         {}", self.packer_name())?;
        } else {
            writeln!(f, "Pack:         no (mirror copy)")?;
        }
        match &self.compress {
            Some(name) => writeln!(f, "Compress:     {} (level {})", name, self.compression_level)?,
            None => writeln!(f, "Compress:     no")?,
        }
        match &self.encrypt {
            Some(name) => writeln!(f, "Encrypt:      {}", name)?,
            None => writeln!(f, "Encrypt:      no")?,
        }
        if !self.description.is_empty() {
            writeln!(f, "Description:  {}", self.description)?;
        }
        Ok(())
    }
}
