//! Decrypt and verify SOPS-encrypted documents
//!
//! The pipeline runs in fixed stages:
//! - **Format**: pick a store from the file name (dotenv, YAML, JSON, INI, binary)
//! - **Load**: parse the encrypted tree and its `sops` metadata
//! - **Keys**: unwrap the data key through a configured key service (age)
//! - **Decrypt**: AES-256-GCM per value, bound to the value's path
//! - **Verify**: recompute the SHA-512 MAC and compare with the stored one
//! - **Export**: print, dump to an owner-only file, or build an environment
//!   mapping
//!
//! Any failure aborts the run; no partial plaintext is ever returned.
//!
//! ```no_run
//! use sopsdec_core::{config::KeyConfig, Decryptor, KeyResolver};
//!
//! # fn main() -> sopsdec_core::Result<()> {
//! let resolver = KeyResolver::from_config(&KeyConfig::from_env())?;
//! let decryptor = Decryptor::open("secrets.env", &resolver)?;
//! decryptor.print_to(&mut std::io::stdout())?;
//! # Ok(())
//! # }
//! ```

pub mod cipher;
pub mod config;
pub mod decryptor;
pub mod encrypt;
pub mod engine;
pub mod error;
pub mod export;
pub mod format;
pub mod keys;
pub mod mac;
pub mod metadata;
pub mod security;
pub mod stores;
pub mod tree;

pub use decryptor::Decryptor;
pub use encrypt::{encrypt_document, EncryptOptions};
pub use error::{Error, Result};
pub use export::EnvExport;
pub use format::Format;
pub use keys::{AgeKeyService, DataKey, KeyBackend, KeyResolver, KeyService, MasterKey};
pub use metadata::{EncryptionRules, Metadata};
pub use security::{AuditLog, SecureString};
pub use tree::{Encrypted, Plaintext, Tree, TreeBranch, TreeItem, TreeValue};

use std::path::Path;

/// Decrypt `path` with key sources taken from the environment
pub fn decrypt_file(path: impl AsRef<Path>) -> Result<Decryptor> {
    let resolver = KeyResolver::from_config(&config::KeyConfig::from_env())?;
    Decryptor::open(path, &resolver)
}

/// Decrypt the file named by `ENC_FILE_PATH`
pub fn decrypt_from_env() -> Result<Decryptor> {
    decrypt_file(config::encrypted_file_path()?)
}
