//! Write the decrypted document to a file

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::Args;

use super::SourceArgs;
use crate::output;

#[derive(Args, Debug)]
pub struct DumpArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Destination file; created with mode 0600, truncated if it exists
    #[arg(short, long)]
    pub output: Utf8PathBuf,
}

pub fn run(args: DumpArgs, quiet: bool) -> Result<()> {
    let decryptor = args.source.open()?;
    decryptor
        .dump(&args.output)
        .with_context(|| format!("Failed to dump plaintext to {}", args.output))?;

    if !quiet {
        output::success(&format!("Decrypted document written to {}", args.output));
        output::kv("Source", &decryptor.source().display().to_string());
        output::kv("Format", &decryptor.format().to_string());
    }
    Ok(())
}
