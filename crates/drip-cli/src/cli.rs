use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "drip",
    about = "Drip: replay and inspect time-based payment streams",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Replay a scenario file against a fresh in-memory ledger
    Run(RunArgs),
    /// Show the stream math for a deposit and schedule
    Quote(QuoteArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// Path to the scenario TOML file
    pub scenario: PathBuf,
}

#[derive(Args)]
pub struct QuoteArgs {
    #[arg(long)]
    pub deposit: u128,
    #[arg(long)]
    pub start: u64,
    #[arg(long)]
    pub stop: u64,
    /// Instant to evaluate the earned amount at
    #[arg(long)]
    pub at: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_with_global_flags() {
        let cli = Cli::try_parse_from(["drip", "run", "demo.toml", "--format", "json", "-v"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Command::Run(args) => assert_eq!(args.scenario, PathBuf::from("demo.toml")),
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn quote_requires_schedule() {
        assert!(Cli::try_parse_from(["drip", "quote", "--deposit", "100"]).is_err());
        let cli = Cli::try_parse_from([
            "drip", "quote", "--deposit", "101", "--start", "0", "--stop", "100",
        ])
        .unwrap();
        match cli.command {
            Command::Quote(args) => {
                assert_eq!(args.deposit, 101);
                assert_eq!(args.at, None);
            }
            _ => panic!("expected quote"),
        }
    }

    #[test]
    fn command_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
