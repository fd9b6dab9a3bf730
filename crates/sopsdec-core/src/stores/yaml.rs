//! YAML store
//!
//! Each YAML document becomes one branch. Metadata is read from the first
//! document that has a `sops` mapping and stripped from all of them; on
//! encrypted output it is written into every document.

use super::{metadata_from_json, missing_metadata, utf8, Store, METADATA_KEY};
use crate::error::{Error, Result};
use crate::format::Format;
use crate::metadata::Metadata;
use crate::tree::{Encrypted, Plaintext, Tree, TreeBranch, TreeItem, TreeKey, TreeState, TreeValue};
use serde::Deserialize;
use serde_yaml_ng::{Mapping, Value};

/// Store for `.yaml` / `.yml` files
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlStore;

fn yaml_err(e: impl std::fmt::Display) -> Error {
    Error::format(Format::Yaml, e.to_string())
}

impl YamlStore {
    fn parse_documents(bytes: &[u8]) -> Result<Vec<Mapping>> {
        let text = utf8(Format::Yaml, bytes)?;
        let mut documents = Vec::new();

        for (idx, document) in serde_yaml_ng::Deserializer::from_str(text).enumerate() {
            match Value::deserialize(document).map_err(yaml_err)? {
                Value::Mapping(map) => documents.push(map),
                Value::Null => documents.push(Mapping::new()),
                other => {
                    return Err(Error::format(
                        Format::Yaml,
                        format!("document {} must be a mapping, found {}", idx + 1, yaml_kind(&other)),
                    ))
                }
            }
        }

        Ok(documents)
    }

    fn encode<S: TreeState>(tree: &Tree<S>, metadata: Option<&Metadata>) -> Result<Vec<u8>> {
        let metadata = metadata
            .map(|m| serde_yaml_ng::to_value(m).map_err(yaml_err))
            .transpose()?;

        let mut out = String::new();
        for (idx, branch) in tree.branches().iter().enumerate() {
            let mut map = branch_to_mapping(branch)?;
            if let Some(metadata) = &metadata {
                map.insert(Value::String(METADATA_KEY.to_string()), metadata.clone());
            }
            if idx > 0 {
                out.push_str("---\n");
            }
            out.push_str(&serde_yaml_ng::to_string(&Value::Mapping(map)).map_err(yaml_err)?);
        }
        Ok(out.into_bytes())
    }
}

fn yaml_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

fn key_to_string(key: &Value) -> Result<String> {
    match key {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok("null".to_string()),
        Value::Tagged(tagged) => key_to_string(&tagged.value),
        other => Err(Error::format(
            Format::Yaml,
            format!("unsupported {} mapping key", yaml_kind(other)),
        )),
    }
}

fn mapping_to_branch(map: Mapping) -> Result<TreeBranch> {
    map.into_iter()
        .map(|(key, value)| Ok(TreeItem::new(key_to_string(&key)?, yaml_to_value(value)?)))
        .collect()
}

fn yaml_to_value(value: Value) -> Result<TreeValue> {
    Ok(match value {
        Value::Null => TreeValue::Null,
        Value::Bool(b) => TreeValue::Bool(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => TreeValue::Int(i),
            None => TreeValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => TreeValue::String(s),
        Value::Sequence(items) => TreeValue::Sequence(
            items
                .into_iter()
                .map(yaml_to_value)
                .collect::<Result<_>>()?,
        ),
        Value::Mapping(map) => TreeValue::Branch(mapping_to_branch(map)?),
        Value::Tagged(tagged) => yaml_to_value(tagged.value)?,
    })
}

fn branch_to_mapping(branch: &TreeBranch) -> Result<Mapping> {
    let mut map = Mapping::new();
    for item in branch {
        if let TreeKey::Name(key) = &item.key {
            map.insert(Value::String(key.clone()), value_to_yaml(&item.value)?);
        }
    }
    Ok(map)
}

fn value_to_yaml(value: &TreeValue) -> Result<Value> {
    Ok(match value {
        TreeValue::Null => Value::Null,
        TreeValue::Bool(b) => Value::Bool(*b),
        TreeValue::Int(i) => Value::Number((*i).into()),
        TreeValue::Float(f) => Value::Number((*f).into()),
        TreeValue::String(s) => Value::String(s.clone()),
        TreeValue::Bytes(_) => return Err(yaml_err("value is not valid UTF-8")),
        TreeValue::Sequence(items) => {
            Value::Sequence(items.iter().map(value_to_yaml).collect::<Result<_>>()?)
        }
        TreeValue::Branch(branch) => Value::Mapping(branch_to_mapping(branch)?),
    })
}

impl Store for YamlStore {
    fn format(&self) -> Format {
        Format::Yaml
    }

    fn load_encrypted(&self, bytes: &[u8]) -> Result<(Tree<Encrypted>, Metadata)> {
        let mut metadata = None;
        let mut branches = Vec::new();

        for mut document in Self::parse_documents(bytes)? {
            if let Some(raw) = document.shift_remove(METADATA_KEY) {
                if metadata.is_none() {
                    let json = serde_json::to_value(&raw).map_err(yaml_err)?;
                    metadata = Some(metadata_from_json(Format::Yaml, json)?);
                }
            }
            branches.push(mapping_to_branch(document)?);
        }

        let metadata = metadata.ok_or_else(|| missing_metadata(Format::Yaml))?;
        Ok((Tree::new(branches), metadata))
    }

    fn load_plain(&self, bytes: &[u8]) -> Result<Tree<Plaintext>> {
        let branches = Self::parse_documents(bytes)?
            .into_iter()
            .map(mapping_to_branch)
            .collect::<Result<Vec<_>>>()?;
        Ok(Tree::new(branches))
    }

    fn emit_plain(&self, tree: &Tree<Plaintext>) -> Result<Vec<u8>> {
        Self::encode(tree, None)
    }

    fn emit_encrypted(&self, tree: &Tree<Encrypted>, metadata: &Metadata) -> Result<Vec<u8>> {
        Self::encode(tree, Some(metadata))
    }
}
