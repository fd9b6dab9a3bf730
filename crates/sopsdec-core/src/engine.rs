//! Tree decryption and encryption
//!
//! Each encrypted leaf is authenticated against its path in the tree, so a
//! value moved to another key fails to decrypt even under the right data
//! key.

use crate::cipher::{self, ValueType};
use crate::error::{Error, Result};
use crate::keys::DataKey;
use crate::mac;
use crate::metadata::{EncryptionRules, Metadata};
use crate::tree::{format_float, Encrypted, LeafVisitor, Plaintext, Tree, TreeValue};
use tracing::debug;

/// Additional authenticated data for a leaf at `path`
pub fn leaf_aad(path: &[String]) -> String {
    let mut aad = path.join(":");
    aad.push(':');
    aad
}

struct Decrypt<'a> {
    key: &'a DataKey,
    rules: &'a EncryptionRules,
}

impl LeafVisitor for Decrypt<'_> {
    fn value(&mut self, path: &[String], value: &TreeValue) -> Result<TreeValue> {
        if !self.rules.should_encrypt(path) {
            return Ok(value.clone());
        }

        let ciphertext = match value {
            TreeValue::String(s) => s,
            // null carries nothing to encrypt
            TreeValue::Null => return Ok(TreeValue::Null),
            other => {
                return Err(Error::decryption(
                    path.join(":"),
                    format!("expected an encrypted value, found {}", other.kind()),
                ))
            }
        };

        let (plaintext, value_type) = cipher::decrypt(ciphertext, self.key, &leaf_aad(path))
            .map_err(|e| Error::decryption(path.join(":"), e.to_string()))?;

        typed_value(&plaintext, value_type).map_err(|msg| Error::decryption(path.join(":"), msg))
    }

    fn comment(&mut self, path: &[String], text: &str) -> Result<String> {
        if !cipher::is_encrypted(text) {
            return Ok(text.to_string());
        }
        let (plaintext, _) = cipher::decrypt(text, self.key, &leaf_aad(path)).map_err(|e| {
            Error::decryption(format!("{} (comment)", path.join(":")), e.to_string())
        })?;
        String::from_utf8(plaintext.to_vec())
            .map_err(|_| Error::decryption(path.join(":"), "comment is not valid UTF-8"))
    }
}

/// Rebuild a scalar from decrypted bytes and its recorded type.
///
/// Strings that are not valid UTF-8 come back as raw bytes.
fn typed_value(plaintext: &[u8], value_type: ValueType) -> std::result::Result<TreeValue, String> {
    if matches!(value_type, ValueType::Str | ValueType::Bytes) {
        return Ok(TreeValue::from(plaintext.to_vec()));
    }

    let text = std::str::from_utf8(plaintext).map_err(|_| "value is not valid UTF-8".to_string())?;
    match value_type {
        ValueType::Str | ValueType::Bytes | ValueType::Comment => {
            Ok(TreeValue::String(text.to_string()))
        }
        ValueType::Int => text
            .parse::<i64>()
            .map(TreeValue::Int)
            .map_err(|_| "value tagged int is not an integer".to_string()),
        ValueType::Float => text
            .parse::<f64>()
            .map(TreeValue::Float)
            .map_err(|_| "value tagged float is not a number".to_string()),
        ValueType::Bool => match text {
            "True" | "true" => Ok(TreeValue::Bool(true)),
            "False" | "false" => Ok(TreeValue::Bool(false)),
            _ => Err("value tagged bool is not a boolean".to_string()),
        },
    }
}

/// Decrypt every leaf the rules mark as encrypted.
///
/// Leaves excluded by the rules are copied unchanged. The first failure
/// aborts; no partially decrypted tree is returned.
pub fn decrypt_tree(
    tree: &Tree<Encrypted>,
    metadata: &Metadata,
    key: &DataKey,
) -> Result<Tree<Plaintext>> {
    let mut visitor = Decrypt {
        key,
        rules: metadata.rules(),
    };
    let plain = tree.transform(&mut visitor)?;
    debug!(branches = plain.branches().len(), "Decrypted document tree");
    Ok(plain)
}

struct Encrypt<'a> {
    key: &'a DataKey,
    rules: &'a EncryptionRules,
}

impl LeafVisitor for Encrypt<'_> {
    fn value(&mut self, path: &[String], value: &TreeValue) -> Result<TreeValue> {
        if !self.rules.should_encrypt(path) {
            return Ok(value.clone());
        }

        let (plaintext, value_type): (Vec<u8>, _) = match value {
            TreeValue::String(s) => (s.clone().into_bytes(), ValueType::Str),
            TreeValue::Bytes(b) => (b.clone(), ValueType::Str),
            TreeValue::Int(i) => (i.to_string().into_bytes(), ValueType::Int),
            TreeValue::Float(f) => (format_float(*f).into_bytes(), ValueType::Float),
            TreeValue::Bool(true) => (b"True".to_vec(), ValueType::Bool),
            TreeValue::Bool(false) => (b"False".to_vec(), ValueType::Bool),
            TreeValue::Null => return Ok(TreeValue::Null),
            other => {
                return Err(Error::usage(format!(
                    "cannot encrypt {} at '{}'",
                    other.kind(),
                    path.join(":")
                )))
            }
        };

        let plaintext = zeroize::Zeroizing::new(plaintext);
        cipher::encrypt(&plaintext, value_type, self.key, &leaf_aad(path))
            .map(TreeValue::String)
            .map_err(|e| Error::usage(format!("cannot encrypt '{}': {}", path.join(":"), e)))
    }

    fn comment(&mut self, path: &[String], text: &str) -> Result<String> {
        if text.is_empty() {
            return Ok(String::new());
        }
        cipher::encrypt(text.as_bytes(), ValueType::Comment, self.key, &leaf_aad(path))
            .map_err(|e| Error::usage(format!("cannot encrypt comment: {}", e)))
    }
}

/// Encrypt every leaf the rules mark as encrypted
pub fn encrypt_tree(
    tree: &Tree<Plaintext>,
    rules: &EncryptionRules,
    key: &DataKey,
) -> Result<Tree<Encrypted>> {
    tree.transform(&mut Encrypt { key, rules })
}

/// Encrypt `tree` and fill in the metadata MAC
pub fn seal(
    tree: &Tree<Plaintext>,
    key: &DataKey,
    mut metadata: Metadata,
) -> Result<(Tree<Encrypted>, Metadata)> {
    let digest = mac::compute(tree, metadata.rules());
    metadata.mac = cipher::encrypt(digest.as_bytes(), ValueType::Str, key, &metadata.mac_aad())
        .map_err(|e| Error::usage(format!("cannot encrypt mac: {}", e)))?;

    let encrypted = encrypt_tree(tree, metadata.rules(), key)?;
    Ok((encrypted, metadata))
}
