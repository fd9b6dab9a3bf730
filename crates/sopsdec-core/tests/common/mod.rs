//! Shared helpers for pipeline integration tests

#![allow(dead_code)]

use age::x25519::Identity;
use chrono::DateTime;
use sopsdec_core::metadata::KeyWrapping;
use sopsdec_core::{
    encrypt_document, engine, AgeKeyService, DataKey, EncryptOptions, EncryptionRules, Format,
    KeyResolver, Metadata,
};

/// A fresh identity and a resolver that can use it
pub fn keypair() -> (Identity, KeyResolver) {
    let identity = Identity::generate();
    let resolver = KeyResolver::new().with_service(AgeKeyService::new(vec![identity.clone()]));
    (identity, resolver)
}

pub fn recipient(identity: &Identity) -> String {
    identity.to_public().to_string()
}

/// Encrypt `plain` for `identity` with default rules
pub fn encrypt(plain: &str, format: Format, identity: &Identity) -> String {
    encrypt_with(plain, format, identity, EncryptionRules::new())
}

pub fn encrypt_with(plain: &str, format: Format, identity: &Identity, rules: EncryptionRules) -> String {
    let options = EncryptOptions::new([recipient(identity)]).with_rules(rules);
    let bytes = encrypt_document(plain.as_bytes(), format, &options).unwrap();
    String::from_utf8(bytes).unwrap()
}

/// Seal a dotenv document under a known data key and timestamp
pub fn seal_dotenv_at(plain: &str, key: &DataKey, identity: &Identity, last_modified: &str) -> String {
    let store = Format::Dotenv.store();
    let tree = store.load_plain(plain.as_bytes()).unwrap();
    let keys = KeyWrapping {
        age: AgeKeyService::wrap(key, &[recipient(identity)]).unwrap(),
        ..Default::default()
    };
    let metadata = Metadata::new(keys, EncryptionRules::new())
        .with_last_modified(DateTime::parse_from_rfc3339(last_modified).unwrap());
    let (encrypted, metadata) = engine::seal(&tree, key, metadata).unwrap();
    String::from_utf8(store.emit_encrypted(&encrypted, &metadata).unwrap()).unwrap()
}

/// The line starting with `prefix`
pub fn line<'a>(document: &'a str, prefix: &str) -> &'a str {
    document
        .lines()
        .find(|l| l.starts_with(prefix))
        .unwrap_or_else(|| panic!("no line starting with {prefix}"))
}

/// Replace the line starting with `prefix`
pub fn replace_line(document: &str, prefix: &str, replacement: &str) -> String {
    document
        .lines()
        .map(|l| if l.starts_with(prefix) { replacement } else { l })
        .map(|l| format!("{l}\n"))
        .collect()
}
