//! File format resolution
//!
//! The format decides which [`Store`] parses and emits a document. It is
//! inferred from the file extension; names without a known extension fall
//! back to [`Format::Binary`], which treats the whole file as one opaque
//! value. Resolution never fails.

use crate::error::{Error, Result};
use crate::stores::{BinaryStore, DotenvStore, IniStore, JsonStore, Store, YamlStore};
use std::path::Path;
use std::str::FromStr;

/// Supported document formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// Flat `KEY=value` lines
    Dotenv,
    /// YAML, possibly multi-document
    Yaml,
    /// JSON object
    Json,
    /// INI sections of `key = value` pairs
    Ini,
    /// Arbitrary bytes stored as a single value
    Binary,
}

impl Format {
    /// Resolve the format from the suffix of a file name.
    ///
    /// A bare `.env` counts as dotenv. Unknown or missing extensions map to
    /// [`Format::Binary`].
    pub fn for_path(path: impl AsRef<Path>) -> Self {
        let name = path
            .as_ref()
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        if name.ends_with(".env") {
            Format::Dotenv
        } else if name.ends_with(".yaml") || name.ends_with(".yml") {
            Format::Yaml
        } else if name.ends_with(".json") {
            Format::Json
        } else if name.ends_with(".ini") {
            Format::Ini
        } else {
            Format::Binary
        }
    }

    /// The store that parses and emits this format
    pub fn store(&self) -> Box<dyn Store> {
        match self {
            Format::Dotenv => Box::new(DotenvStore),
            Format::Yaml => Box::new(YamlStore),
            Format::Json => Box::new(JsonStore),
            Format::Ini => Box::new(IniStore),
            Format::Binary => Box::new(BinaryStore),
        }
    }

    /// Whether documents of this format are a flat list of key/value pairs
    pub fn is_flat(&self) -> bool {
        matches!(self, Format::Dotenv)
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Format::Dotenv => write!(f, "dotenv"),
            Format::Yaml => write!(f, "yaml"),
            Format::Json => write!(f, "json"),
            Format::Ini => write!(f, "ini"),
            Format::Binary => write!(f, "binary"),
        }
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "dotenv" | "env" => Ok(Format::Dotenv),
            "yaml" | "yml" => Ok(Format::Yaml),
            "json" => Ok(Format::Json),
            "ini" => Ok(Format::Ini),
            "binary" => Ok(Format::Binary),
            other => Err(Error::usage(format!(
                "Unknown format: {}. Valid formats: dotenv, yaml, json, ini, binary",
                other
            ))),
        }
    }
}
