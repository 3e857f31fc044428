//! Name-keyed constructors for every stage algorithm.
//!
//! The pipeline never names a concrete codec type. It asks the registry for
//! a packer, compressor or encryptor by name, and during recovery maps the
//! tag byte of an artifact back to a registered name.

use std::collections::BTreeMap;
use std::path::Path;

use super::detect::{Signature, StageKind, detect_signature};
use super::{names, tag};
use crate::compress::{Compressor, HuffmanCompressor};
use crate::encrypt::{Encryptor, XorEncryptor};
use crate::pack::{BasicPacker, Packer};
use crate::{Error, Result};

type Factory<T> = Box<dyn Fn() -> Box<T> + Send + Sync>;

struct Entry<T: ?Sized> {
    tag: u8,
    factory: Factory<T>,
}

/// Detected stage of an artifact plus the registered algorithm name for its
/// tag, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactClass {
    /// Marker and tag read from the file.
    pub signature: Signature,
    /// Registered name for the tag, or `None` if nothing is registered.
    pub algorithm: Option<String>,
}

/// Constructor tables for packers, compressors and encryptors.
pub struct Registry {
    packers: BTreeMap<String, Entry<dyn Packer>>,
    compressors: BTreeMap<String, Entry<dyn Compressor>>,
    encryptors: BTreeMap<String, Entry<dyn Encryptor>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("packers", &self.packers())
            .field("compressors", &self.compressors())
            .field("encryptors", &self.encryptors())
            .finish()
    }
}

impl Registry {
    /// Creates a registry with the built-in algorithms: `Basic`, `Huffman`
    /// and `SimXOR`.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register_packer(names::BASIC, tag::BASIC, || Box::new(BasicPacker::new()));
        registry.register_compressor(names::HUFFMAN, tag::HUFFMAN, || {
            Box::new(HuffmanCompressor::new())
        });
        registry.register_encryptor(names::SIM_XOR, tag::SIM_XOR, || Box::new(XorEncryptor::new()));
        registry
    }

    /// Creates a registry with nothing registered.
    pub fn empty() -> Self {
        Self {
            packers: BTreeMap::new(),
            compressors: BTreeMap::new(),
            encryptors: BTreeMap::new(),
        }
    }

    /// Registers a packer; a previous registration under `name` is replaced.
    pub fn register_packer<F>(&mut self, name: &str, tag: u8, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn Packer> + Send + Sync + 'static,
    {
        self.packers.insert(
            name.to_string(),
            Entry {
                tag,
                factory: Box::new(factory),
            },
        );
        self
    }

    /// Registers a compressor; a previous registration under `name` is replaced.
    pub fn register_compressor<F>(&mut self, name: &str, tag: u8, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn Compressor> + Send + Sync + 'static,
    {
        self.compressors.insert(
            name.to_string(),
            Entry {
                tag,
                factory: Box::new(factory),
            },
        );
        self
    }

    /// Registers an encryptor; a previous registration under `name` is replaced.
    pub fn register_encryptor<F>(&mut self, name: &str, tag: u8, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn Encryptor> + Send + Sync + 'static,
    {
        self.encryptors.insert(
            name.to_string(),
            Entry {
                tag,
                factory: Box::new(factory),
            },
        );
        self
    }

    /// Creates the packer registered as `name`.
    pub fn create_packer(&self, name: &str) -> Result<Box<dyn Packer>> {
        self.packers
            .get(name)
            .map(|entry| (entry.factory)())
            .ok_or_else(|| unsupported(StageKind::Packed, name))
    }

    /// Creates the compressor registered as `name`.
    pub fn create_compressor(&self, name: &str) -> Result<Box<dyn Compressor>> {
        self.compressors
            .get(name)
            .map(|entry| (entry.factory)())
            .ok_or_else(|| unsupported(StageKind::Compressed, name))
    }

    /// Creates the encryptor registered as `name`.
    pub fn create_encryptor(&self, name: &str) -> Result<Box<dyn Encryptor>> {
        self.encryptors
            .get(name)
            .map(|entry| (entry.factory)())
            .ok_or_else(|| unsupported(StageKind::Encrypted, name))
    }

    /// Returns the registered packer names in sorted order.
    pub fn packers(&self) -> Vec<&str> {
        self.packers.keys().map(String::as_str).collect()
    }

    /// Returns the registered compressor names in sorted order.
    pub fn compressors(&self) -> Vec<&str> {
        self.compressors.keys().map(String::as_str).collect()
    }

    /// Returns the registered encryptor names in sorted order.
    pub fn encryptors(&self) -> Vec<&str> {
        self.encryptors.keys().map(String::as_str).collect()
    }

    /// Returns `true` if `name` is registered for `kind`.
    pub fn supports(&self, kind: StageKind, name: &str) -> bool {
        match kind {
            StageKind::Packed => self.packers.contains_key(name),
            StageKind::Compressed => self.compressors.contains_key(name),
            StageKind::Encrypted => self.encryptors.contains_key(name),
        }
    }

    /// Returns the registered name whose tag is `tag` within `kind`.
    pub fn name_for_tag(&self, kind: StageKind, tag: u8) -> Option<&str> {
        fn find<T: ?Sized>(map: &BTreeMap<String, Entry<T>>, tag: u8) -> Option<&str> {
            map.iter()
                .find(|(_, entry)| entry.tag == tag)
                .map(|(name, _)| name.as_str())
        }
        match kind {
            StageKind::Packed => find(&self.packers, tag),
            StageKind::Compressed => find(&self.compressors, tag),
            StageKind::Encrypted => find(&self.encryptors, tag),
        }
    }

    /// Maps the tag byte of `path` to a registered name, if the file carries
    /// the marker of `kind`.
    pub fn algorithm_name_of(&self, path: &Path, kind: StageKind) -> Result<Option<String>> {
        Ok(detect_signature(path)?
            .filter(|sig| sig.kind == kind)
            .and_then(|sig| self.name_for_tag(kind, sig.tag))
            .map(str::to_string))
    }

    /// Reads the signature of `path` and resolves its algorithm name.
    ///
    /// Returns `None` for directories, short files and unknown markers.
    pub fn classify(&self, path: &Path) -> Result<Option<ArtifactClass>> {
        Ok(detect_signature(path)?.map(|signature| ArtifactClass {
            algorithm: self
                .name_for_tag(signature.kind, signature.tag)
                .map(str::to_string),
            signature,
        }))
    }
}

fn unsupported(kind: StageKind, name: &str) -> Error {
    Error::UnsupportedAlgorithm {
        kind,
        name: name.to_string(),
    }
}
