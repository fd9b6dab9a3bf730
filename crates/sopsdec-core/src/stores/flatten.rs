//! Flat key encoding of nested metadata
//!
//! Flat formats cannot nest, so the `sops` section is written as
//! individual keys: `age__list_0__map_recipient` is `age[0].recipient`.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

const MAP_SEPARATOR: &str = "__map_";
const LIST_SEPARATOR: &str = "__list_";

/// Flatten a JSON object into sorted `(key, text)` pairs.
///
/// Scalars become their display text; null becomes empty.
pub fn flatten(value: &Value) -> Vec<(String, String)> {
    let mut out = Vec::new();
    if let Value::Object(map) = value {
        for (key, v) in map {
            flatten_into(key.clone(), v, &mut out);
        }
    }
    out.sort_by(|a, b| a.0.cmp(&b.0));
    out
}

fn flatten_into(prefix: String, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, v) in map {
                flatten_into(format!("{}{}{}", prefix, MAP_SEPARATOR, key), v, out);
            }
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                flatten_into(format!("{}{}{}", prefix, LIST_SEPARATOR, i), v, out);
            }
        }
        Value::String(s) => out.push((prefix, s.clone())),
        Value::Null => out.push((prefix, String::new())),
        other => out.push((prefix, other.to_string())),
    }
}

enum Segment {
    Key(String),
    Index(usize),
}

#[derive(Debug)]
enum Node {
    Leaf(String),
    Map(Vec<(String, Node)>),
    List(BTreeMap<usize, Node>),
}

impl Node {
    fn into_value(self) -> Value {
        match self {
            Node::Leaf(s) => Value::String(s),
            Node::Map(entries) => Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, v.into_value()))
                    .collect::<Map<_, _>>(),
            ),
            Node::List(items) => Value::Array(items.into_values().map(Node::into_value).collect()),
        }
    }
}

/// Split `age__list_0__map_enc` into its segments
fn segments(key: &str) -> Result<Vec<Segment>, String> {
    let mut out = Vec::new();
    let (head, mut rest) = split_next(key);
    out.push(Segment::Key(head.to_string()));

    while !rest.is_empty() {
        if let Some(tail) = rest.strip_prefix(MAP_SEPARATOR) {
            let (name, next) = split_next(tail);
            out.push(Segment::Key(name.to_string()));
            rest = next;
        } else if let Some(tail) = rest.strip_prefix(LIST_SEPARATOR) {
            let (index, next) = split_next(tail);
            let index = index
                .parse::<usize>()
                .map_err(|_| format!("invalid list index in '{}'", key))?;
            out.push(Segment::Index(index));
            rest = next;
        } else {
            return Err(format!("cannot parse flattened key '{}'", key));
        }
    }
    Ok(out)
}

/// Split at the next separator, returning the text before it and the rest
fn split_next(s: &str) -> (&str, &str) {
    let pos = [s.find(MAP_SEPARATOR), s.find(LIST_SEPARATOR)]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(s.len());
    s.split_at(pos)
}

fn insert(node: &mut Node, path: &[Segment], value: String, key: &str) -> Result<(), String> {
    let Some((first, rest)) = path.split_first() else {
        *node = Node::Leaf(value);
        return Ok(());
    };

    let empty_child = || match rest.first() {
        Some(Segment::Index(_)) => Node::List(BTreeMap::new()),
        Some(Segment::Key(_)) => Node::Map(Vec::new()),
        None => Node::Leaf(String::new()),
    };

    match (node, first) {
        (Node::Map(entries), Segment::Key(name)) => {
            let pos = match entries.iter().position(|(k, _)| k == name) {
                Some(pos) => pos,
                None => {
                    entries.push((name.clone(), empty_child()));
                    entries.len() - 1
                }
            };
            insert(&mut entries[pos].1, rest, value, key)
        }
        (Node::List(items), Segment::Index(i)) => {
            let child = items.entry(*i).or_insert_with(empty_child);
            insert(child, rest, value, key)
        }
        _ => Err(format!("conflicting structure at '{}'", key)),
    }
}

/// Rebuild the nested object from flat pairs.
///
/// Every leaf comes back as a string.
pub fn unflatten<'a>(
    pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Result<Value, String> {
    let mut root = Node::Map(Vec::new());
    for (key, value) in pairs {
        let path = segments(key)?;
        insert(&mut root, &path, value.to_string(), key)?;
    }
    Ok(root.into_value())
}

/// Flat metadata comes back as strings; restore the non-string fields
pub fn restore_types(mut value: Value) -> Value {
    if let Some(flag) = value.get_mut("mac_only_encrypted") {
        let enabled = flag.as_str().map(|s| s.eq_ignore_ascii_case("true"));
        if let Some(enabled) = enabled {
            *flag = Value::Bool(enabled);
        }
    }
    value
}
