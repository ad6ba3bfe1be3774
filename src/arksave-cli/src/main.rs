mod cli;
mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::*;

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "arksave=info",
        1 => "arksave=debug",
        _ => "arksave=trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Expand {
            input,
            output,
            json,
        } => {
            commands::blob::expand(&input, output.as_deref(), json)?;
        }

        Commands::Inspect {
            input,
            json,
            skip_invalid,
        } => {
            commands::blob::inspect(&input, json, skip_invalid)?;
        }

        Commands::Names { input, output } => {
            commands::blob::names(&input, output.as_deref())?;
        }

        Commands::Search {
            input,
            pattern,
            expand,
        } => {
            commands::search::handle(&input, &pattern, expand)?;
        }

        Commands::Configure {
            export_dir,
            skip_invalid,
            show,
        } => {
            commands::configure::handle(export_dir, skip_invalid, show)?;
        }
    }

    Ok(())
}
