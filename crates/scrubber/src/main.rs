//! Scrubber CLI - Strip metadata from photos and videos.
//!
//! Scrubber re-encodes images as upright JPEGs and re-muxes videos to MP4
//! with all embedded metadata removed. Files are processed in concurrent,
//! content-deduplicated batches and named so they sort in submission order.
//!
//! # Usage
//!
//! ```bash
//! # Scrub a directory and collect the results in ./clean
//! scrubber process ./photos -o ./clean
//!
//! # Continue a named session (duplicates of earlier files are skipped)
//! scrubber process ./more-photos -o ./clean --session trip
//!
//! # View configuration
//! scrubber config show
//! ```

use clap::{Parser, Subcommand};

mod cli;
mod logging;

/// Scrubber - Strip metadata from photos and videos.
#[derive(Parser, Debug)]
#[command(name = "scrubber")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Strip metadata from a file or every file in a directory
    Process(cli::process::ProcessArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so use eprintln for config warnings.
    let config = match scrubber_core::Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `scrubber config path`."
            );
            scrubber_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("Scrubber v{}", scrubber_core::VERSION);

    match cli.command {
        Commands::Process(args) => cli::process::execute(args, config).await,
        Commands::Config(args) => cli::config::execute(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_process_with_globals() {
        let cli = Cli::try_parse_from([
            "scrubber",
            "--verbose",
            "process",
            "./photos",
            "-o",
            "./clean",
            "--parallel",
            "3",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Process(args) => {
                assert_eq!(args.input, std::path::PathBuf::from("./photos"));
                assert_eq!(args.parallel, Some(3));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_parses_config_init() {
        let cli = Cli::try_parse_from(["scrubber", "config", "init", "--force"]).unwrap();
        assert!(matches!(cli.command, Commands::Config(_)));
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["scrubber"]).is_err());
    }
}
