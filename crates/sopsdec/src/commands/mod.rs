//! Command implementations

pub mod decrypt;
pub mod dump;
pub mod encrypt;
pub mod exec_env;

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::Args;
use sopsdec_core::config::{self, KeyConfig};
use sopsdec_core::{Decryptor, Format, KeyResolver};
use std::path::PathBuf;

/// Where the encrypted document comes from and how to open it
#[derive(Args, Debug)]
pub struct SourceArgs {
    /// Encrypted file (defaults to $ENC_FILE_PATH)
    #[arg(env = "ENC_FILE_PATH")]
    pub file: Option<Utf8PathBuf>,

    /// Format to use instead of the one inferred from the file name
    #[arg(long, value_parser = parse_format)]
    pub input_type: Option<Format>,

    /// age identity file (overrides SOPS_AGE_KEY_FILE)
    #[arg(long)]
    pub age_key_file: Option<Utf8PathBuf>,
}

impl SourceArgs {
    pub fn path(&self) -> Result<PathBuf> {
        match &self.file {
            Some(file) => Ok(file.clone().into_std_path_buf()),
            None => Ok(config::encrypted_file_path()?),
        }
    }

    /// Run the full decrypt-and-verify pipeline
    pub fn open(&self) -> Result<Decryptor> {
        let path = self.path()?;

        let mut keys = KeyConfig::from_env();
        if let Some(key_file) = &self.age_key_file {
            keys = keys.with_age_key_file(key_file);
        }
        let resolver = KeyResolver::from_config(&keys).context("Failed to load age identities")?;

        let format = self.input_type.unwrap_or_else(|| Format::for_path(&path));
        Decryptor::open_as(&path, format, &resolver)
            .with_context(|| format!("Failed to decrypt {}", path.display()))
    }
}

pub fn parse_format(s: &str) -> std::result::Result<Format, String> {
    s.parse::<Format>().map_err(|e| e.to_string())
}
