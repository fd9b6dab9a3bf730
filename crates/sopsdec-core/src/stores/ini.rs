//! INI store
//!
//! Every `[section]` becomes a nested branch, so a value's path is
//! `section:key`. Keys before the first header belong to `DEFAULT`. Lines
//! starting with `;` or `#` are kept as comments and written back with `;`.
//! Metadata lives in a trailing `[sops]` section using the flat encoding
//! from [`flatten`](super::flatten).
//!
//! Values are trimmed. Surrounding backticks or double quotes are removed,
//! and `"""` opens a value that runs until the next closing `"""`.

use super::flatten::{flatten, restore_types, unflatten};
use super::{metadata_from_json, missing_metadata, utf8, Store, METADATA_KEY};
use crate::error::{Error, Result};
use crate::format::Format;
use crate::metadata::Metadata;
use crate::tree::{Encrypted, Plaintext, Tree, TreeBranch, TreeItem, TreeKey, TreeState, TreeValue};

/// Section holding keys that appear before any header
pub const DEFAULT_SECTION: &str = "DEFAULT";

const MULTILINE_QUOTE: &str = "\"\"\"";

/// Store for `.ini` files
#[derive(Debug, Clone, Copy, Default)]
pub struct IniStore;

fn ini_err(line: usize, message: impl std::fmt::Display) -> Error {
    Error::format(Format::Ini, format!("line {}: {}", line, message))
}

/// Sections in file order; a repeated header continues the earlier section
#[derive(Default)]
struct Sections {
    entries: Vec<(String, TreeBranch)>,
}

impl Sections {
    fn open(&mut self, name: &str) -> usize {
        match self.entries.iter().position(|(n, _)| n == name) {
            Some(idx) => idx,
            None => {
                self.entries.push((name.to_string(), TreeBranch::new()));
                self.entries.len() - 1
            }
        }
    }

    fn into_branch(self) -> TreeBranch {
        self.entries
            .into_iter()
            .filter(|(name, items)| name != DEFAULT_SECTION || !items.is_empty())
            .map(|(name, items)| TreeItem::new(name, items))
            .collect()
    }
}

impl IniStore {
    fn parse(bytes: &[u8]) -> Result<TreeBranch> {
        let content = utf8(Format::Ini, bytes)?;
        let mut sections = Sections::default();
        let mut current = sections.open(DEFAULT_SECTION);
        let mut lines = content.lines().enumerate();

        while let Some((idx, line)) = lines.next() {
            let line_no = idx + 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(comment) = line.strip_prefix([';', '#']) {
                sections.entries[current].1.push(TreeItem::comment(comment));
                continue;
            }

            if let Some(header) = line.strip_prefix('[') {
                let name = header
                    .strip_suffix(']')
                    .map(str::trim)
                    .ok_or_else(|| ini_err(line_no, "unterminated section header"))?;
                if name.is_empty() {
                    return Err(ini_err(line_no, "empty section name"));
                }
                current = sections.open(name);
                continue;
            }

            let split = line
                .find(['=', ':'])
                .ok_or_else(|| ini_err(line_no, "expected key = value"))?;
            let key = line[..split].trim();
            if key.is_empty() {
                return Err(ini_err(line_no, "empty key"));
            }
            let raw = line[split + 1..].trim();

            let value = match raw.strip_prefix(MULTILINE_QUOTE) {
                Some(rest) => {
                    let mut value = rest.to_string();
                    while !value.ends_with(MULTILINE_QUOTE) {
                        let (_, next) = lines
                            .next()
                            .ok_or_else(|| ini_err(line_no, "unterminated \"\"\" value"))?;
                        value.push('\n');
                        value.push_str(next);
                    }
                    value.truncate(value.len() - MULTILINE_QUOTE.len());
                    value
                }
                None => unquote(raw).to_string(),
            };

            sections.entries[current].1.push(TreeItem::new(key, value));
        }

        Ok(sections.into_branch())
    }

    fn emit<S: TreeState>(tree: &Tree<S>, metadata: &[(String, String)]) -> Result<Vec<u8>> {
        let mut out = String::new();

        for branch in tree.branches() {
            for item in branch {
                let name = match &item.key {
                    TreeKey::Comment(text) => {
                        push_comment(&mut out, text);
                        continue;
                    }
                    TreeKey::Name(name) => name,
                };
                let TreeValue::Branch(section) = &item.value else {
                    return Err(Error::format(
                        Format::Ini,
                        format!("'{}' is a {}; top-level entries must be sections", name, item.value.kind()),
                    ));
                };

                if !out.is_empty() {
                    out.push('\n');
                }
                if !(out.is_empty() && name == DEFAULT_SECTION) {
                    out.push_str(&format!("[{}]\n", name));
                }
                for entry in section {
                    match (&entry.key, &entry.value) {
                        (TreeKey::Comment(text), _) => push_comment(&mut out, text),
                        (TreeKey::Name(key), TreeValue::String(value)) => {
                            push_pair(&mut out, key, &quote(value))
                        }
                        (TreeKey::Name(key), other) => {
                            return Err(Error::format(
                                Format::Ini,
                                format!("'{}:{}' is a {}; only string values are supported", name, key, other.kind()),
                            ))
                        }
                    }
                }
            }
        }

        if !metadata.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!("[{}]\n", METADATA_KEY));
            for (key, value) in metadata {
                push_pair(&mut out, key, &quote(&value.replace('\n', "\\n")));
            }
        }

        Ok(out.into_bytes())
    }
}

fn unquote(value: &str) -> &str {
    for mark in ['`', '"'] {
        if value.len() >= 2 && value.starts_with(mark) && value.ends_with(mark) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn quote(value: &str) -> String {
    if value.contains('\n') || value.contains('`') {
        format!("{}{}{}", MULTILINE_QUOTE, value, MULTILINE_QUOTE)
    } else if value.contains(['#', ';']) || value.starts_with('"') {
        format!("`{}`", value)
    } else if value.trim() != value {
        format!("\"{}\"", value)
    } else {
        value.to_string()
    }
}

fn push_pair(out: &mut String, key: &str, value: &str) {
    out.push_str(key);
    out.push_str(" = ");
    out.push_str(value);
    out.push('\n');
}

fn push_comment(out: &mut String, text: &str) {
    out.push(';');
    out.push_str(text);
    out.push('\n');
}

impl Store for IniStore {
    fn format(&self) -> Format {
        Format::Ini
    }

    fn load_encrypted(&self, bytes: &[u8]) -> Result<(Tree<Encrypted>, Metadata)> {
        let mut branch = Self::parse(bytes)?;
        let Some(TreeValue::Branch(section)) = branch.remove(METADATA_KEY) else {
            return Err(missing_metadata(Format::Ini));
        };

        let pairs = section
            .iter()
            .filter_map(|item| match (item.name(), &item.value) {
                (Some(key), TreeValue::String(value)) => Some((key, value.replace("\\n", "\n"))),
                _ => None,
            })
            .collect::<Vec<_>>();
        if pairs.is_empty() {
            return Err(missing_metadata(Format::Ini));
        }

        let value = unflatten(pairs.iter().map(|(k, v)| (*k, v.as_str())))
            .map_err(|e| Error::format(Format::Ini, e))?;
        let metadata = metadata_from_json(Format::Ini, restore_types(value))?;

        Ok((Tree::new(vec![branch]), metadata))
    }

    fn load_plain(&self, bytes: &[u8]) -> Result<Tree<Plaintext>> {
        Ok(Tree::new(vec![Self::parse(bytes)?]))
    }

    fn emit_plain(&self, tree: &Tree<Plaintext>) -> Result<Vec<u8>> {
        Self::emit(tree, &[])
    }

    fn emit_encrypted(&self, tree: &Tree<Encrypted>, metadata: &Metadata) -> Result<Vec<u8>> {
        let value = serde_json::to_value(metadata)
            .map_err(|e| Error::format(Format::Ini, format!("cannot encode metadata: {}", e)))?;
        Self::emit(tree, &flatten(&value))
    }
}
