//! Print the decrypted document

use anyhow::{Context, Result};
use clap::Args;

use super::SourceArgs;

#[derive(Args, Debug)]
pub struct DecryptArgs {
    #[command(flatten)]
    pub source: SourceArgs,
}

pub fn run(args: DecryptArgs) -> Result<()> {
    let decryptor = args.source.open()?;

    let mut stdout = std::io::stdout().lock();
    decryptor
        .print_to(&mut stdout)
        .context("Failed to write plaintext to stdout")?;
    Ok(())
}
