//! Run a child process with the decrypted variables
//!
//! The variables are passed to the child only; this process's own
//! environment is left untouched.

use anyhow::{anyhow, Context, Result};
use clap::Args;
use std::process::Command;
use tracing::debug;

use super::SourceArgs;

#[derive(Args, Debug)]
pub struct ExecEnvArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Command and arguments to run, after `--`
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

/// Returns the child's exit code
pub fn run(args: ExecEnvArgs) -> Result<i32> {
    let (program, program_args) = args
        .command
        .split_first()
        .ok_or_else(|| anyhow!("No command given"))?;

    let decryptor = args.source.open()?;
    let vars = decryptor.env_vars()?;

    let mut command = Command::new(program);
    command.args(program_args);
    vars.apply_to(&mut command)?;

    debug!(program = %program, vars = vars.len(), "Running command with decrypted environment");
    let status = command
        .status()
        .with_context(|| format!("Failed to run {}", program))?;

    Ok(status.code().unwrap_or(1))
}
