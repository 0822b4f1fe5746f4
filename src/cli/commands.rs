use clap::{Args, Parser, Subcommand};

use crate::config::HumanDuration;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (commit ",
    env!("GIT_HASH"),
    ", built ",
    env!("BUILD_TIMESTAMP"),
    ")"
);

#[derive(Parser)]
#[command(
    name = "cachesnake",
    version,
    long_version = LONG_VERSION,
    about = "Web cache poisoning and cache deception scanner"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress the progress spinner and summary
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Crawl subdomains and attack every discovered page
    Run(RunArgs),
    /// Validate a configuration file
    Validate(ValidateArgs),
}

#[derive(Args, Clone, Default)]
pub struct RunArgs {
    /// YAML configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Newline-separated hostnames to crawl (overrides subdomain_file)
    #[arg(long, conflicts_with = "targets")]
    pub subdomains: Option<String>,

    /// Newline-separated URLs to attack directly, skipping the crawler
    #[arg(long)]
    pub targets: Option<String>,

    /// Concurrent crawler workers
    #[arg(long)]
    pub crawler_workers: Option<usize>,

    /// Concurrent attack workers
    #[arg(long)]
    pub attack_workers: Option<usize>,

    /// Concurrent triage workers
    #[arg(long)]
    pub triage_workers: Option<usize>,

    /// Minimum gap between bursts on one subdomain (e.g. 500ms, 2s)
    #[arg(long)]
    pub backoff: Option<HumanDuration>,

    /// Per-request timeout for attack probes (e.g. 10s)
    #[arg(long)]
    pub timeout: Option<HumanDuration>,

    /// User-Agent sent with attack probes
    #[arg(long)]
    pub user_agent: Option<String>,

    /// JSON-lines file confirmed results are appended to
    #[arg(short, long)]
    pub output: Option<String>,

    /// Custom run identifier
    #[arg(long)]
    pub run_id: Option<String>,
}

#[derive(Args, Clone)]
pub struct ValidateArgs {
    /// YAML configuration file to validate
    pub config: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::try_parse_from([
            "cachesnake",
            "-vv",
            "run",
            "-c",
            "scan.yaml",
            "--subdomains",
            "subs.txt",
            "--attack-workers",
            "4",
            "--backoff",
            "500ms",
            "--json-logs",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(cli.json_logs);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.config.as_deref(), Some("scan.yaml"));
        assert_eq!(args.subdomains.as_deref(), Some("subs.txt"));
        assert_eq!(args.attack_workers, Some(4));
        assert_eq!(args.backoff.map(|b| b.get()), Some(Duration::from_millis(500)));
        assert!(args.timeout.is_none());
    }

    #[test]
    fn test_bad_duration_rejected() {
        assert!(Cli::try_parse_from(["cachesnake", "run", "--timeout", "fast"]).is_err());
        assert!(Cli::try_parse_from(["cachesnake", "run", "--backoff", "9999999999999999h"]).is_err());
    }

    #[test]
    fn test_subdomains_and_targets_conflict() {
        assert!(Cli::try_parse_from(["cachesnake", "run", "--subdomains", "a", "--targets", "b"]).is_err());
    }

    #[test]
    fn test_validate_takes_path() {
        let cli = Cli::try_parse_from(["cachesnake", "validate", "scan.yaml"]).unwrap();
        assert!(matches!(cli.command, Commands::Validate(ref a) if a.config == "scan.yaml"));
    }
}
