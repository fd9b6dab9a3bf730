//! Encrypt a plaintext file

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::Args;
use sopsdec_core::{encrypt_document, EncryptOptions, EncryptionRules, Format};
use std::io::Write;

use super::parse_format;
use crate::output;

#[derive(Args, Debug)]
pub struct EncryptArgs {
    /// Plaintext file to encrypt
    pub file: Utf8PathBuf,

    /// age recipients (repeat or separate with commas)
    #[arg(long, env = "SOPS_AGE_RECIPIENTS", value_delimiter = ',', required = true)]
    pub age: Vec<String>,

    /// Format to use instead of the one inferred from the file name
    #[arg(long, value_parser = parse_format)]
    pub input_type: Option<Format>,

    /// Write the encrypted document here instead of stdout
    #[arg(short, long)]
    pub output: Option<Utf8PathBuf>,

    /// Leave values whose key ends with this suffix unencrypted
    #[arg(long)]
    pub unencrypted_suffix: Option<String>,

    /// Encrypt only values whose key ends with this suffix
    #[arg(long)]
    pub encrypted_suffix: Option<String>,

    /// Leave values whose key matches this regex unencrypted
    #[arg(long)]
    pub unencrypted_regex: Option<String>,

    /// Encrypt only values whose key matches this regex
    #[arg(long)]
    pub encrypted_regex: Option<String>,

    /// Compute the MAC over encrypted values only
    #[arg(long)]
    pub mac_only_encrypted: bool,
}

impl EncryptArgs {
    fn rules(&self) -> Result<EncryptionRules> {
        let mut rules = EncryptionRules::new().with_mac_only_encrypted(self.mac_only_encrypted);
        if let Some(suffix) = &self.unencrypted_suffix {
            rules = rules.with_unencrypted_suffix(suffix);
        }
        if let Some(suffix) = &self.encrypted_suffix {
            rules = rules.with_encrypted_suffix(suffix);
        }
        if let Some(pattern) = &self.unencrypted_regex {
            rules = rules
                .with_unencrypted_regex(pattern)
                .context("Invalid --unencrypted-regex")?;
        }
        if let Some(pattern) = &self.encrypted_regex {
            rules = rules
                .with_encrypted_regex(pattern)
                .context("Invalid --encrypted-regex")?;
        }
        Ok(rules)
    }
}

pub fn run(args: EncryptArgs, quiet: bool) -> Result<()> {
    let plaintext = std::fs::read(&args.file)
        .with_context(|| format!("Failed to read file: {}", args.file))?;
    let format = args
        .input_type
        .unwrap_or_else(|| Format::for_path(&args.file));

    let options = EncryptOptions::new(args.age.iter().map(String::as_str)).with_rules(args.rules()?);
    let encrypted = encrypt_document(&plaintext, format, &options)
        .with_context(|| format!("Failed to encrypt {}", args.file))?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, &encrypted)
                .with_context(|| format!("Failed to write to: {}", path))?;
            if !quiet {
                output::success(&format!("Encrypted {} to {}", args.file, path));
                output::kv("Format", &format.to_string());
                output::kv("Recipients", &args.age.len().to_string());
            }
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(&encrypted)
                .and_then(|()| stdout.flush())
                .context("Failed to write to stdout")?;
        }
    }

    if format == Format::Binary && args.input_type.is_none() && !quiet {
        output::warning("Unknown file extension, encrypted as binary");
    }
    Ok(())
}
