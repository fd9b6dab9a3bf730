//! Result sinks
//!
//! Decrypted output leaves the pipeline only through these: an environment
//! mapping the caller applies explicitly, or an owner-only file.

use crate::error::{Error, Result};
use crate::security::SecureString;
use std::io::Write;
use std::path::Path;
use std::process::Command;
use tracing::debug;

/// Ordered environment variables taken from a flat document
#[derive(Debug, Clone, Default)]
pub struct EnvExport {
    vars: Vec<(String, SecureString)>,
}

impl EnvExport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<SecureString>) {
        self.vars.push((name.into(), value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SecureString)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Value of `name`; the last occurrence wins, as when applied
    pub fn get(&self, name: &str) -> Option<&SecureString> {
        self.vars
            .iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vars.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    fn check_name(name: &str) -> Result<()> {
        if name.is_empty() || name.contains('=') || name.contains('\0') {
            return Err(Error::usage(format!(
                "'{}' cannot be used as an environment variable name",
                name
            )));
        }
        Ok(())
    }

    /// Set every variable in the current process
    pub fn apply(&self) -> Result<()> {
        for (name, _) in &self.vars {
            Self::check_name(name)?;
        }
        for (name, value) in &self.vars {
            std::env::set_var(name, value.as_str());
        }
        debug!(count = self.vars.len(), "Exported variables to process environment");
        Ok(())
    }

    /// Add every variable to a child process command
    pub fn apply_to(&self, command: &mut Command) -> Result<()> {
        for (name, _) in &self.vars {
            Self::check_name(name)?;
        }
        command.envs(self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        Ok(())
    }
}

/// Write `bytes` to `path`, readable and writable by the owner only.
///
/// An existing file is truncated and its permissions tightened.
pub fn write_owner_only(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path).map_err(|e| Error::write(path, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .map_err(|e| Error::write(path, e))?;
    }

    file.write_all(bytes).map_err(|e| Error::write(path, e))?;
    file.flush().map_err(|e| Error::write(path, e))?;

    debug!(path = %path.display(), bytes = bytes.len(), "Wrote decrypted output");
    Ok(())
}
