//! Binary store
//!
//! The whole file is one opaque value under the `data` key. Encrypted, it
//! is written as JSON: `{"data": "ENC[...]", "sops": {...}}`. The payload
//! may be any bytes; only UTF-8 content is held as a string.

use super::json::{object_to_branch, JsonStore};
use super::Store;
use crate::error::{Error, Result};
use crate::format::Format;
use crate::metadata::Metadata;
use crate::tree::{Encrypted, Plaintext, Tree, TreeBranch, TreeValue};

const DATA_KEY: &str = "data";

/// Store for files of any other type
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryStore;

impl Store for BinaryStore {
    fn format(&self) -> Format {
        Format::Binary
    }

    fn load_encrypted(&self, bytes: &[u8]) -> Result<(Tree<Encrypted>, Metadata)> {
        let map = JsonStore::parse_object(Format::Binary, bytes)?;
        let (map, metadata) = JsonStore::split_metadata(Format::Binary, map)?;
        if !map.contains_key(DATA_KEY) {
            return Err(Error::format(Format::Binary, "missing 'data' member"));
        }
        Ok((Tree::new(vec![object_to_branch(map)]), metadata))
    }

    fn load_plain(&self, bytes: &[u8]) -> Result<Tree<Plaintext>> {
        Ok(Tree::new(vec![TreeBranch::new().with(DATA_KEY, bytes.to_vec())]))
    }

    fn emit_plain(&self, tree: &Tree<Plaintext>) -> Result<Vec<u8>> {
        let data = tree
            .branches()
            .first()
            .and_then(|branch| branch.get(DATA_KEY));
        match data {
            Some(TreeValue::String(s)) => Ok(s.as_bytes().to_vec()),
            Some(TreeValue::Bytes(b)) => Ok(b.clone()),
            Some(other) => Err(Error::format(
                Format::Binary,
                format!("'data' must be a string, found {}", other.kind()),
            )),
            None => Err(Error::format(Format::Binary, "missing 'data' member")),
        }
    }

    fn emit_encrypted(&self, tree: &Tree<Encrypted>, metadata: &Metadata) -> Result<Vec<u8>> {
        JsonStore::encode(Format::Binary, tree, Some(metadata))
    }
}
