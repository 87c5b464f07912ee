use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "tally",
    about = "Tally: game economy ledger and settlement engine",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Configuration file (defaults to ./tally.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a sample game session against a fresh ledger
    Demo(DemoArgs),
    /// Check a ledger dump: entry hashes, balance chains, projections
    Verify(DumpArgs),
    /// Show one balance from a ledger dump
    Balance(BalanceArgs),
    /// Show an account's entries from a ledger dump
    History(HistoryArgs),
    /// Run the fraud heuristics for an account in a ledger dump
    Fraud(FraudArgs),
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Args)]
pub struct DemoArgs {
    #[arg(long, default_value = "4")]
    pub players: usize,
    #[arg(long, default_value = "100")]
    pub fee: i64,
    /// Currency code (defaults to the first configured currency)
    #[arg(long)]
    pub currency: Option<String>,
    /// Write the resulting ledger dump here
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct DumpArgs {
    pub dump: PathBuf,
}

#[derive(Args)]
pub struct BalanceArgs {
    pub dump: PathBuf,
    pub account: String,
    pub currency: String,
}

#[derive(Args)]
pub struct HistoryArgs {
    pub dump: PathBuf,
    pub account: String,
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,
}

#[derive(Args)]
pub struct FraudArgs {
    pub dump: PathBuf,
    pub account: String,
    /// Trailing window (defaults to the configured window)
    #[arg(long)]
    pub window_secs: Option<u64>,
    /// End of the window in UNIX milliseconds (defaults to the account's
    /// latest entry)
    #[arg(long)]
    pub at_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_demo_defaults() {
        let cli = Cli::try_parse_from(["tally", "demo"]).unwrap();
        if let Command::Demo(args) = cli.command {
            assert_eq!(args.players, 4);
            assert_eq!(args.fee, 100);
            assert!(args.output.is_none());
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_demo_with_output() {
        let cli = Cli::try_parse_from(["tally", "demo", "--players", "6", "-o", "/tmp/l.json"]).unwrap();
        if let Command::Demo(args) = cli.command {
            assert_eq!(args.players, 6);
            assert_eq!(args.output, Some(PathBuf::from("/tmp/l.json")));
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_balance() {
        let cli = Cli::try_parse_from(["tally", "balance", "l.json", "alice", "COIN"]).unwrap();
        if let Command::Balance(args) = cli.command {
            assert_eq!(args.account, "alice");
            assert_eq!(args.currency, "COIN");
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_history_limit() {
        let cli = Cli::try_parse_from(["tally", "history", "l.json", "bob", "-n", "5"]).unwrap();
        if let Command::History(args) = cli.command {
            assert_eq!(args.limit, 5);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_fraud_window() {
        let cli =
            Cli::try_parse_from(["tally", "fraud", "l.json", "eve", "--window-secs", "600"]).unwrap();
        if let Command::Fraud(args) = cli.command {
            assert_eq!(args.window_secs, Some(600));
            assert!(args.at_ms.is_none());
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_global_flags() {
        let cli = Cli::try_parse_from(["tally", "--verbose", "--format", "json", "-c", "x.toml", "config"])
            .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        assert!(matches!(cli.command, Command::Config));
    }

    #[test]
    fn verify_requires_dump() {
        assert!(Cli::try_parse_from(["tally", "verify"]).is_err());
    }
}
