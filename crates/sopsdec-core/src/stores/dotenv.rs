//! Dotenv store
//!
//! One `KEY=VALUE` per line, split at the first `=`. Lines starting with
//! `#` are comments, blank lines are dropped. Metadata is stored in
//! `sops_`-prefixed keys using the flat encoding from
//! [`flatten`](super::flatten).

use super::flatten::{flatten, restore_types, unflatten};
use super::{metadata_from_json, missing_metadata, utf8, Store};
use crate::error::{Error, Result};
use crate::format::Format;
use crate::metadata::Metadata;
use crate::tree::{Encrypted, Plaintext, Tree, TreeBranch, TreeItem, TreeKey, TreeState, TreeValue};

const METADATA_PREFIX: &str = "sops_";

/// Store for `.env` files
#[derive(Debug, Clone, Copy, Default)]
pub struct DotenvStore;

impl DotenvStore {
    fn parse(bytes: &[u8]) -> Result<Vec<TreeItem>> {
        let content = utf8(Format::Dotenv, bytes)?;
        let mut items = Vec::new();

        for (idx, line) in content.lines().enumerate() {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.trim().is_empty() {
                continue;
            }
            if let Some(comment) = line.strip_prefix('#') {
                items.push(TreeItem::comment(comment));
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(Error::format(
                    Format::Dotenv,
                    format!("line {}: expected KEY=VALUE", idx + 1),
                ));
            };
            items.push(TreeItem::new(key, value.replace("\\n", "\n")));
        }

        Ok(items)
    }

    fn emit<S: TreeState>(tree: &Tree<S>, extra: &[(String, String)]) -> Result<Vec<u8>> {
        let mut out = String::new();
        for branch in tree.branches() {
            for item in branch {
                match (&item.key, &item.value) {
                    (TreeKey::Comment(text), _) => {
                        out.push('#');
                        out.push_str(text);
                        out.push('\n');
                    }
                    (TreeKey::Name(key), TreeValue::String(value)) => push_line(&mut out, key, value),
                    (TreeKey::Name(key), other) => {
                        return Err(Error::format(
                            Format::Dotenv,
                            format!("'{}' is a {}; only flat string values are supported", key, other.kind()),
                        ))
                    }
                }
            }
        }
        for (key, value) in extra {
            push_line(&mut out, key, value);
        }
        Ok(out.into_bytes())
    }
}

fn push_line(out: &mut String, key: &str, value: &str) {
    out.push_str(key);
    out.push('=');
    out.push_str(&value.replace('\n', "\\n"));
    out.push('\n');
}

impl Store for DotenvStore {
    fn format(&self) -> Format {
        Format::Dotenv
    }

    fn load_encrypted(&self, bytes: &[u8]) -> Result<(Tree<Encrypted>, Metadata)> {
        let mut branch = TreeBranch::new();
        let mut metadata = Vec::new();

        for item in Self::parse(bytes)? {
            match item.name().and_then(|n| n.strip_prefix(METADATA_PREFIX)) {
                Some(key) => {
                    let TreeValue::String(value) = &item.value else {
                        continue;
                    };
                    metadata.push((key.to_string(), value.clone()));
                }
                None => branch.push(item),
            }
        }

        if metadata.is_empty() {
            return Err(missing_metadata(Format::Dotenv));
        }

        let value = unflatten(metadata.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .map_err(|e| Error::format(Format::Dotenv, e))?;
        let metadata = metadata_from_json(Format::Dotenv, restore_types(value))?;

        Ok((Tree::new(vec![branch]), metadata))
    }

    fn load_plain(&self, bytes: &[u8]) -> Result<Tree<Plaintext>> {
        let branch = Self::parse(bytes)?.into_iter().collect::<TreeBranch>();
        Ok(Tree::new(vec![branch]))
    }

    fn emit_plain(&self, tree: &Tree<Plaintext>) -> Result<Vec<u8>> {
        Self::emit(tree, &[])
    }

    fn emit_encrypted(&self, tree: &Tree<Encrypted>, metadata: &Metadata) -> Result<Vec<u8>> {
        let value = serde_json::to_value(metadata)
            .map_err(|e| Error::format(Format::Dotenv, format!("cannot encode metadata: {}", e)))?;
        let extra = flatten(&value)
            .into_iter()
            .map(|(k, v)| (format!("{}{}", METADATA_PREFIX, k), v))
            .collect::<Vec<_>>();
        Self::emit(tree, &extra)
    }
}
