//! Decrypt-and-verify pipeline
//!
//! A [`Decryptor`] is only constructed after every stage succeeded:
//! load, data key recovery, tree decryption and MAC verification. The
//! sinks (print, dump, environment export) are methods on it, so output
//! from an unverified document cannot be produced.

use crate::engine;
use crate::error::{Error, Result};
use crate::export::{write_owner_only, EnvExport};
use crate::format::Format;
use crate::keys::{KeyBackend, KeyResolver};
use crate::mac;
use crate::security::AuditLog;
use crate::tree::{Plaintext, Tree, TreeKey, TreeValue};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zeroize::Zeroizing;

/// A decrypted and verified document
pub struct Decryptor {
    source: PathBuf,
    format: Format,
    tree: Tree<Plaintext>,
    plaintext: Zeroizing<Vec<u8>>,
}

impl Decryptor {
    /// Decrypt the file at `path`, inferring the format from its name
    pub fn open(path: impl AsRef<Path>, resolver: &KeyResolver) -> Result<Self> {
        let path = path.as_ref();
        Self::open_as(path, Format::for_path(path), resolver)
    }

    /// Decrypt the file at `path` as `format`
    pub fn open_as(path: impl AsRef<Path>, format: Format, resolver: &KeyResolver) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), %format, "Opening encrypted document");

        let result = std::fs::read(path)
            .map_err(|e| Error::read(path, e))
            .and_then(|bytes| Self::run(path, &bytes, format, resolver));
        Self::audit(path, format, result)
    }

    /// Decrypt an in-memory document
    pub fn from_bytes(bytes: &[u8], format: Format, resolver: &KeyResolver) -> Result<Self> {
        let source = Path::new("<memory>");
        let result = Self::run(source, bytes, format, resolver);
        Self::audit(source, format, result)
    }

    fn run(
        source: &Path,
        bytes: &[u8],
        format: Format,
        resolver: &KeyResolver,
    ) -> Result<(Self, KeyBackend)> {
        let store = format.store();
        let (encrypted, metadata) = store.load_encrypted(bytes)?;
        let (key, backend) = resolver.resolve_with_backend(&metadata)?;

        let tree = engine::decrypt_tree(&encrypted, &metadata, &key)?;
        mac::verify(&tree, &metadata, &key)?;

        let plaintext = Zeroizing::new(store.emit_plain(&tree)?);
        let decryptor = Self {
            source: source.to_path_buf(),
            format,
            tree,
            plaintext,
        };
        Ok((decryptor, backend))
    }

    fn audit(source: &Path, format: Format, result: Result<(Self, KeyBackend)>) -> Result<Self> {
        match result {
            Ok((decryptor, backend)) => {
                AuditLog::new("decrypt", source, format)
                    .with_backend(backend)
                    .log();
                Ok(decryptor)
            }
            Err(e) => {
                AuditLog::new("decrypt", source, format)
                    .with_error(&e.to_string())
                    .log();
                Err(e)
            }
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn tree(&self) -> &Tree<Plaintext> {
        &self.tree
    }

    /// Serialized cleartext document
    pub fn plaintext(&self) -> &[u8] {
        &self.plaintext
    }

    /// Write the cleartext document to `writer` as-is
    pub fn print_to(&self, writer: &mut impl Write) -> Result<()> {
        let stream = Path::new("<output stream>");
        writer
            .write_all(&self.plaintext)
            .and_then(|()| writer.flush())
            .map_err(|e| Error::write(stream, e))
    }

    /// Write the cleartext document to `path` with owner-only permissions
    pub fn dump(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        write_owner_only(path, &self.plaintext)?;
        info!(path = %path.display(), "Dumped decrypted document");
        Ok(())
    }

    /// Key/value pairs of a dotenv document, in file order
    pub fn env_vars(&self) -> Result<EnvExport> {
        if !self.format.is_flat() {
            return Err(Error::usage(format!(
                "environment export needs a dotenv document, got {}",
                self.format
            )));
        }

        let mut export = EnvExport::new();
        for branch in self.tree.branches() {
            for item in branch {
                match (&item.key, &item.value) {
                    (TreeKey::Comment(_), _) => {}
                    (TreeKey::Name(name), TreeValue::String(value)) => {
                        export.push(name.clone(), value.clone())
                    }
                    (TreeKey::Name(name), other) => {
                        return Err(Error::usage(format!(
                            "'{}' is a {} and cannot be exported",
                            name,
                            other.kind()
                        )))
                    }
                }
            }
        }
        Ok(export)
    }
}

impl fmt::Debug for Decryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decryptor")
            .field("source", &self.source)
            .field("format", &self.format)
            .field("tree", &self.tree)
            .field("plaintext", &format_args!("[REDACTED {} bytes]", self.plaintext.len()))
            .finish()
    }
}
