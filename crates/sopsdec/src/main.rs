//! sopsdec CLI - decrypt and verify SOPS encrypted files
//!
//! Plaintext only ever goes to stdout (or the file given to `dump`);
//! logs and status lines go to stderr.

mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Decrypt(args) => commands::decrypt::run(args),
        Commands::Dump(args) => commands::dump::run(args, cli.quiet),
        Commands::ExecEnv(args) => {
            let code = commands::exec_env::run(args)?;
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }
        Commands::Encrypt(args) => commands::encrypt::run(args, cli.quiet),
    }
}

/// Initialize tracing with appropriate verbosity
fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            // Audit records and warnings only
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}
