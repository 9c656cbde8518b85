use std::path::PathBuf;

use clap::Parser;

use crate::reports::Report;

/// Tails the chain for the configured token contract and keeps `user_balance` current.
///
/// With `--report` it prints a read-only report instead and exits.
#[derive(Parser, Debug, Clone)]
#[command(name = "balance-ingester", version, rename_all = "kebab-case")]
pub struct Cli {
    /// Path to the JSON config file
    #[arg(long, value_name = "PATH", default_value = "config/config.json")]
    pub config: PathBuf,

    /// Print a report (holders, top or weekly) instead of ingesting
    #[arg(long, value_name = "REPORT")]
    pub report: Option<Report>,

    /// Maximum number of report rows
    #[arg(long, value_name = "N", requires = "report")]
    pub limit: Option<u32>,
}

impl Cli {
    pub fn report_limit(&self) -> Option<i64> {
        self.limit.map(i64::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("balance-ingester").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults_run_the_ingester() {
        let cli = parse(&[]).unwrap();

        assert_eq!(cli.config, PathBuf::from("config/config.json"));
        assert_eq!(cli.report, None);
        assert_eq!(cli.report_limit(), None);
    }

    #[test]
    fn test_report_with_limit() {
        let cli = parse(&["--config", "prod.json", "--report", "top", "--limit", "5"]).unwrap();

        assert_eq!(cli.config, PathBuf::from("prod.json"));
        assert_eq!(cli.report, Some(Report::TopHolders));
        assert_eq!(cli.report_limit(), Some(5));
    }

    #[test]
    fn test_report_without_value_is_rejected() {
        assert!(parse(&["--report"]).is_err());
    }

    #[test]
    fn test_flag_is_not_taken_as_config_path() {
        assert!(parse(&["--config", "--report", "top"]).is_err());
    }

    #[test]
    fn test_unknown_flags_and_reports_are_rejected() {
        assert!(parse(&["--report", "top", "--limt", "5"]).is_err());
        assert!(parse(&["--report", "monthly"]).is_err());
    }

    #[test]
    fn test_limit_needs_a_report() {
        assert!(parse(&["--limit", "5"]).is_err());
        assert!(parse(&["--report", "holders", "--limit", "-3"]).is_err());
    }
}
