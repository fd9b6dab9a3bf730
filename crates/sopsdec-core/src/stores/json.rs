//! JSON store
//!
//! A single top-level object. Member order is preserved both ways.

use super::{metadata_from_json, missing_metadata, utf8, Store, METADATA_KEY};
use crate::error::{Error, Result};
use crate::format::Format;
use crate::metadata::Metadata;
use crate::tree::{Encrypted, Plaintext, Tree, TreeBranch, TreeItem, TreeKey, TreeState, TreeValue};
use serde_json::{Map, Number, Value};

/// Store for `.json` files
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonStore;

impl JsonStore {
    pub(crate) fn parse_object(format: Format, bytes: &[u8]) -> Result<Map<String, Value>> {
        let text = utf8(format, bytes)?;
        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(Error::format(
                format,
                format!("top level must be an object, found {}", json_kind(&other)),
            )),
            Err(e) => Err(Error::format(format, e.to_string())),
        }
    }

    pub(crate) fn split_metadata(
        format: Format,
        mut map: Map<String, Value>,
    ) -> Result<(Map<String, Value>, Metadata)> {
        let raw = map
            .shift_remove(METADATA_KEY)
            .ok_or_else(|| missing_metadata(format))?;
        Ok((map, metadata_from_json(format, raw)?))
    }

    pub(crate) fn encode<S: TreeState>(
        format: Format,
        tree: &Tree<S>,
        metadata: Option<&Metadata>,
    ) -> Result<Vec<u8>> {
        let mut object = match tree.branches() {
            [] => Map::new(),
            [branch] => branch_to_json(format, branch)?,
            _ => {
                return Err(Error::format(
                    format,
                    "multiple documents cannot be written as JSON",
                ))
            }
        };

        if let Some(metadata) = metadata {
            let value = serde_json::to_value(metadata)
                .map_err(|e| Error::format(format, format!("cannot encode metadata: {}", e)))?;
            object.insert(METADATA_KEY.to_string(), value);
        }

        let mut out = serde_json::to_vec_pretty(&Value::Object(object))
            .map_err(|e| Error::format(format, e.to_string()))?;
        out.push(b'\n');
        Ok(out)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub(crate) fn object_to_branch(map: Map<String, Value>) -> TreeBranch {
    map.into_iter()
        .map(|(key, value)| TreeItem::new(key, json_to_value(value)))
        .collect()
}

fn json_to_value(value: Value) -> TreeValue {
    match value {
        Value::Null => TreeValue::Null,
        Value::Bool(b) => TreeValue::Bool(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => TreeValue::Int(i),
            None => TreeValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => TreeValue::String(s),
        Value::Array(items) => TreeValue::Sequence(items.into_iter().map(json_to_value).collect()),
        Value::Object(map) => TreeValue::Branch(object_to_branch(map)),
    }
}

fn branch_to_json(format: Format, branch: &TreeBranch) -> Result<Map<String, Value>> {
    let mut map = Map::new();
    for item in branch {
        // JSON has no comments
        if let TreeKey::Name(key) = &item.key {
            map.insert(key.clone(), value_to_json(format, &item.value)?);
        }
    }
    Ok(map)
}

fn value_to_json(format: Format, value: &TreeValue) -> Result<Value> {
    Ok(match value {
        TreeValue::Null => Value::Null,
        TreeValue::Bool(b) => Value::Bool(*b),
        TreeValue::Int(i) => Value::Number((*i).into()),
        TreeValue::Float(f) => Number::from_f64(*f)
            .map(Value::Number)
            .ok_or_else(|| Error::format(format, "non-finite float cannot be written"))?,
        TreeValue::String(s) => Value::String(s.clone()),
        TreeValue::Bytes(_) => return Err(Error::format(format, "value is not valid UTF-8")),
        TreeValue::Sequence(items) => Value::Array(
            items
                .iter()
                .map(|v| value_to_json(format, v))
                .collect::<Result<_>>()?,
        ),
        TreeValue::Branch(branch) => Value::Object(branch_to_json(format, branch)?),
    })
}

impl Store for JsonStore {
    fn format(&self) -> Format {
        Format::Json
    }

    fn load_encrypted(&self, bytes: &[u8]) -> Result<(Tree<Encrypted>, Metadata)> {
        let map = Self::parse_object(Format::Json, bytes)?;
        let (map, metadata) = Self::split_metadata(Format::Json, map)?;
        Ok((Tree::new(vec![object_to_branch(map)]), metadata))
    }

    fn load_plain(&self, bytes: &[u8]) -> Result<Tree<Plaintext>> {
        let map = Self::parse_object(Format::Json, bytes)?;
        Ok(Tree::new(vec![object_to_branch(map)]))
    }

    fn emit_plain(&self, tree: &Tree<Plaintext>) -> Result<Vec<u8>> {
        Self::encode(Format::Json, tree, None)
    }

    fn emit_encrypted(&self, tree: &Tree<Encrypted>, metadata: &Metadata) -> Result<Vec<u8>> {
        Self::encode(Format::Json, tree, Some(metadata))
    }
}
