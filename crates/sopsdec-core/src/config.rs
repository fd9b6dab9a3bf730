//! Runtime configuration read from the process environment
//!
//! Nothing here mutates the environment; values are read once and carried
//! in plain structs so callers (and tests) can override them.

use crate::error::{Error, Result};
use crate::security::SecureString;
use std::path::{Path, PathBuf};

/// Path of the encrypted document to open
pub const ENC_FILE_PATH_VAR: &str = "ENC_FILE_PATH";

/// Inline age identities, one per line
pub const SOPS_AGE_KEY_VAR: &str = "SOPS_AGE_KEY";

/// File holding age identities
pub const SOPS_AGE_KEY_FILE_VAR: &str = "SOPS_AGE_KEY_FILE";

/// Read the document path from `ENC_FILE_PATH`.
///
/// Unset or empty is a usage error.
pub fn encrypted_file_path() -> Result<PathBuf> {
    match std::env::var(ENC_FILE_PATH_VAR) {
        Ok(value) if !value.trim().is_empty() => Ok(expand(&value)),
        _ => Err(Error::usage(format!(
            "{} is not set; point it at the encrypted file to decrypt",
            ENC_FILE_PATH_VAR
        ))),
    }
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path.trim()).to_string())
}

/// Where key services find their private material
#[derive(Debug, Clone)]
pub struct KeyConfig {
    /// Inline age identities (`SOPS_AGE_KEY`)
    pub age_keys: Option<SecureString>,
    age_key_file: Option<PathBuf>,
    use_default_key_file: bool,
}

impl KeyConfig {
    /// Empty configuration: no inline keys, no key file, no default lookup
    pub fn new() -> Self {
        Self {
            age_keys: None,
            age_key_file: None,
            use_default_key_file: false,
        }
    }

    /// Configuration from `SOPS_AGE_KEY` and `SOPS_AGE_KEY_FILE`, falling
    /// back to the default key file location
    pub fn from_env() -> Self {
        let age_keys = std::env::var(SOPS_AGE_KEY_VAR)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(SecureString::new);
        let age_key_file = std::env::var(SOPS_AGE_KEY_FILE_VAR)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(|v| expand(&v));

        Self {
            age_keys,
            age_key_file,
            use_default_key_file: true,
        }
    }

    pub fn with_age_keys(mut self, keys: impl Into<SecureString>) -> Self {
        self.age_keys = Some(keys.into());
        self
    }

    pub fn with_age_key_file(mut self, path: impl AsRef<Path>) -> Self {
        self.age_key_file = Some(expand(&path.as_ref().to_string_lossy()));
        self
    }

    pub fn with_default_key_file(mut self, enabled: bool) -> Self {
        self.use_default_key_file = enabled;
        self
    }

    /// Explicitly configured key file
    pub fn age_key_file(&self) -> Option<PathBuf> {
        self.age_key_file.clone()
    }

    /// `<config dir>/sops/age/keys.txt`, if default lookup is enabled
    pub fn default_age_key_file(&self) -> Option<PathBuf> {
        if !self.use_default_key_file {
            return None;
        }
        dirs::config_dir().map(|dir| dir.join("sops").join("age").join("keys.txt"))
    }
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self::new()
    }
}
