//! Marker bytes, algorithm tags and artifact classification.
//!
//! Every artifact produced by a pipeline stage starts with two bytes: a
//! marker naming the stage and a tag naming the algorithm inside that
//! stage. Recovery reads only these two bytes to decide which stage to undo
//! next.
//!
//! | Stage | Marker | Algorithms |
//! |-------|--------|------------|
//! | Packed | `0x01` | Basic = `0x00` |
//! | Compressed | `0x21` | Huffman = `0x01` |
//! | Encrypted | `0x31` | SimXOR = `0x01` |

pub mod detect;
pub mod reader;
pub mod registry;

pub use detect::{
    Signature, StageKind, detect_signature, is_compressed, is_encrypted, is_packed,
};
pub use registry::{ArtifactClass, Registry};

/// Marker byte of a packed container.
pub const PACK_MARKER: u8 = 0x01;

/// Marker byte of a compressed artifact.
pub const COMPRESS_MARKER: u8 = 0x21;

/// Marker byte of an encrypted artifact.
pub const ENCRYPT_MARKER: u8 = 0x31;

/// Algorithm tags stored in byte 1 of each artifact.
pub mod tag {
    /// Basic container layout.
    pub const BASIC: u8 = 0x00;
    /// Byte-oriented Huffman coding.
    pub const HUFFMAN: u8 = 0x01;
    /// Repeating-key XOR stream cipher.
    pub const SIM_XOR: u8 = 0x01;
}

/// Canonical algorithm names, as accepted by the [`Registry`].
pub mod names {
    /// Name of the basic container layout.
    pub const BASIC: &str = "Basic";
    /// Name of the Huffman codec.
    pub const HUFFMAN: &str = "Huffman";
    /// Name of the XOR stream cipher.
    pub const SIM_XOR: &str = "SimXOR";
}
