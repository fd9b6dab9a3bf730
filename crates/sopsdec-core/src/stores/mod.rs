//! Store implementations
//!
//! A store converts between the on-disk bytes of one format and the
//! document [`Tree`] plus its [`Metadata`]. Stores never decrypt anything.

pub mod binary;
pub mod dotenv;
pub mod flatten;
pub mod ini;
pub mod json;
pub mod yaml;

pub use binary::BinaryStore;
pub use dotenv::DotenvStore;
pub use ini::IniStore;
pub use json::JsonStore;
pub use yaml::YamlStore;

use crate::error::{Error, Result};
use crate::format::Format;
use crate::metadata::Metadata;
use crate::tree::{Encrypted, Plaintext, Tree};

/// Name of the metadata section in structured formats
pub const METADATA_KEY: &str = "sops";

/// Trait for format-specific parsing and serialization
pub trait Store {
    /// Format handled by this store
    fn format(&self) -> Format;

    /// Parse an encrypted document and its metadata
    fn load_encrypted(&self, bytes: &[u8]) -> Result<(Tree<Encrypted>, Metadata)>;

    /// Parse a cleartext document
    fn load_plain(&self, bytes: &[u8]) -> Result<Tree<Plaintext>>;

    /// Serialize a decrypted tree
    fn emit_plain(&self, tree: &Tree<Plaintext>) -> Result<Vec<u8>>;

    /// Serialize an encrypted tree together with its metadata
    fn emit_encrypted(&self, tree: &Tree<Encrypted>, metadata: &Metadata) -> Result<Vec<u8>>;
}

/// Decode the metadata section, reporting problems as format errors
pub(crate) fn metadata_from_json(format: Format, value: serde_json::Value) -> Result<Metadata> {
    serde_json::from_value(value)
        .map_err(|e| Error::format(format, format!("invalid sops metadata: {}", e)))
}

pub(crate) fn missing_metadata(format: Format) -> Error {
    Error::format(
        format,
        "sops metadata not found; the file does not look encrypted",
    )
}

pub(crate) fn utf8(format: Format, bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| Error::format(format, format!("not valid UTF-8: {}", e)))
}
