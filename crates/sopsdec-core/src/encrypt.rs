//! Producing encrypted documents
//!
//! A fresh data key is generated per document, wrapped for every age
//! recipient, and used to encrypt the tree and its MAC.

use crate::engine;
use crate::error::{Error, Result};
use crate::format::Format;
use crate::keys::{AgeKeyService, DataKey};
use crate::metadata::{EncryptionRules, KeyWrapping, Metadata};
use crate::security::AuditLog;
use std::path::Path;
use tracing::debug;

/// Recipients and rules for a new encrypted document
#[derive(Debug, Clone, Default)]
pub struct EncryptOptions {
    pub recipients: Vec<String>,
    pub rules: EncryptionRules,
}

impl EncryptOptions {
    pub fn new(recipients: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            recipients: recipients.into_iter().map(Into::into).collect(),
            rules: EncryptionRules::new(),
        }
    }

    pub fn with_rules(mut self, rules: EncryptionRules) -> Self {
        self.rules = rules;
        self
    }
}

/// Encrypt a cleartext document of `format`
pub fn encrypt_document(plaintext: &[u8], format: Format, options: &EncryptOptions) -> Result<Vec<u8>> {
    let result = seal_document(plaintext, format, options);
    let audit = AuditLog::new("encrypt", Path::new("<memory>"), format);
    match &result {
        Ok(_) => audit.with_backend("age").log(),
        Err(e) => audit.with_error(&e.to_string()).log(),
    }
    result
}

fn seal_document(plaintext: &[u8], format: Format, options: &EncryptOptions) -> Result<Vec<u8>> {
    if options.recipients.is_empty() {
        return Err(Error::usage("at least one age recipient is required"));
    }

    let store = format.store();
    let tree = store.load_plain(plaintext)?;

    let data_key = DataKey::generate();
    let keys = KeyWrapping {
        age: AgeKeyService::wrap(&data_key, &options.recipients)?,
        ..Default::default()
    };
    let metadata = Metadata::new(keys, options.rules.clone());

    let (encrypted, metadata) = engine::seal(&tree, &data_key, metadata)?;
    debug!(
        %format,
        recipients = options.recipients.len(),
        "Encrypted document"
    );
    store.emit_encrypted(&encrypted, &metadata)
}
