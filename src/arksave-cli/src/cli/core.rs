//! Core CLI definitions

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "arksave")]
#[command(about = "ARK save object blob inspector", long_about = None)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Decompress a compressed object blob and print its name table
    #[command(visible_alias = "x")]
    Expand {
        /// Compressed blob (e.g. cryopod contents)
        input: PathBuf,

        /// Where to write the expanded stream (defaults to the export directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the name table as JSON
        #[arg(long)]
        json: bool,
    },

    /// Decompress a blob and print its property stream
    #[command(visible_alias = "i")]
    Inspect {
        /// Compressed blob
        input: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Print the properties read before a decode error instead of failing
        #[arg(long)]
        skip_invalid: bool,
    },

    /// List every name id referenced by a compressed blob's property stream
    #[command(visible_alias = "n")]
    Names {
        /// Compressed blob
        input: PathBuf,

        /// Write the offset → name map as a JSON side file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Search a file for a hex byte pattern
    #[command(visible_alias = "s")]
    Search {
        /// File to search
        input: PathBuf,

        /// Pattern as hex, spaces allowed (e.g. "06 04 00 00")
        pattern: String,

        /// Decompress the file first and search the expanded stream
        #[arg(long)]
        expand: bool,
    },

    /// Configure default settings
    #[command(visible_alias = "c")]
    Configure {
        /// Default directory for expanded output
        #[arg(long)]
        export_dir: Option<PathBuf>,

        /// Default for --skip-invalid
        #[arg(long)]
        skip_invalid: Option<bool>,

        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_search() {
        let cli = Cli::try_parse_from(["arksave", "-vv", "search", "blob.bin", "06 04", "--expand"])
            .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Search {
                pattern, expand, ..
            } => {
                assert_eq!(pattern, "06 04");
                assert!(expand);
            }
            _ => panic!("expected search"),
        }
    }

    #[test]
    fn test_parse_configure() {
        let cli = Cli::try_parse_from(["arksave", "configure", "--skip-invalid", "true"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Configure {
                skip_invalid: Some(true),
                show: false,
                ..
            }
        ));
    }
}
