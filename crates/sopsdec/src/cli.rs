//! CLI argument parsing with clap

use clap::{Parser, Subcommand};

pub use crate::commands::decrypt::DecryptArgs;
pub use crate::commands::dump::DumpArgs;
pub use crate::commands::encrypt::EncryptArgs;
pub use crate::commands::exec_env::ExecEnvArgs;

/// sopsdec - decrypt and verify SOPS encrypted files
#[derive(Parser, Debug)]
#[command(name = "sopsdec")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Decrypt a file and print the plaintext to stdout
    Decrypt(DecryptArgs),

    /// Decrypt a file into another file (owner read/write only)
    Dump(DumpArgs),

    /// Run a command with the variables of a decrypted dotenv file
    ExecEnv(ExecEnvArgs),

    /// Encrypt a file for one or more age recipients
    Encrypt(EncryptArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use sopsdec_core::Format;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_decrypt_with_file_and_type() {
        let cli = Cli::try_parse_from(["sopsdec", "decrypt", "secret.bin", "--input-type", "yaml"])
            .unwrap();
        let Commands::Decrypt(args) = cli.command else {
            panic!("expected decrypt");
        };
        assert_eq!(args.source.file.as_deref().map(|p| p.as_str()), Some("secret.bin"));
        assert_eq!(args.source.input_type, Some(Format::Yaml));
    }

    #[test]
    fn test_unknown_input_type_rejected() {
        assert!(Cli::try_parse_from(["sopsdec", "decrypt", "x", "--input-type", "toml"]).is_err());
    }

    #[test]
    fn test_dump_requires_output() {
        assert!(Cli::try_parse_from(["sopsdec", "dump", "app.env"]).is_err());
        let cli = Cli::try_parse_from(["sopsdec", "dump", "app.env", "-o", "out.env"]).unwrap();
        assert!(matches!(cli.command, Commands::Dump(_)));
    }

    #[test]
    fn test_exec_env_collects_command() {
        let cli = Cli::try_parse_from(["sopsdec", "exec-env", "app.env", "--", "env", "-0"]).unwrap();
        let Commands::ExecEnv(args) = cli.command else {
            panic!("expected exec-env");
        };
        assert_eq!(args.command, vec!["env".to_string(), "-0".to_string()]);
    }

    #[test]
    fn test_encrypt_recipients() {
        let cli = Cli::try_parse_from([
            "sopsdec", "encrypt", "app.env", "--age", "age1a,age1b", "--mac-only-encrypted",
        ])
        .unwrap();
        let Commands::Encrypt(args) = cli.command else {
            panic!("expected encrypt");
        };
        assert_eq!(args.age, vec!["age1a".to_string(), "age1b".to_string()]);
        assert!(args.mac_only_encrypted);
    }
}
