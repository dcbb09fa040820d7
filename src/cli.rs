//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::models::{SignalId, Tier};
use clap::Parser;
use std::path::PathBuf;

/// medsignal - Medicaid provider fraud-signal engine
///
/// Evaluates nineteen fraud archetypes over a pre-aggregated claims
/// snapshot, scores and ranks the flagged providers, and writes an
/// investigation-ready JSON or Markdown report.
///
/// Examples:
///   medsignal --input aggregates.json
///   medsignal --input aggregates.json --format markdown -o report.md
///   medsignal --input aggregates.json --signals 1,5,18 --fail-on high
///   medsignal --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Aggregate snapshot (JSON) to evaluate
    #[arg(short, long, value_name = "FILE", required_unless_present = "init_config")]
    pub input: Option<PathBuf>,

    /// Output file path for the report
    ///
    /// Defaults to the [general] output setting (medsignal_report.json).
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .medsignal.toml in the current directory
    #[arg(short, long, value_name = "FILE", env = "MEDSIGNAL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format (json, markdown)
    #[arg(long, default_value = "json", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Signals to evaluate, by number or name (comma-separated)
    ///
    /// Example: --signals 1,5,bust_out. All nineteen run by default.
    #[arg(long, value_name = "SIGNALS", value_delimiter = ',')]
    pub signals: Option<Vec<SignalId>>,

    /// Worker threads for provider evaluation (0 = one per core)
    #[arg(long, value_name = "NUM")]
    pub threads: Option<usize>,

    /// Fail if any provider lands at or above this tier
    ///
    /// Useful for scheduled pipelines. Exit code 2 when the threshold is met.
    /// Values: critical, high, medium, low
    #[arg(long, value_name = "TIER")]
    pub fail_on: Option<TierLevel>,

    /// Minimum tier to include in the report
    #[arg(long, value_name = "TIER")]
    pub min_tier: Option<TierLevel>,

    /// Disable the pandemic-era severity adjustment
    #[arg(long)]
    pub no_temporal_adjustment: bool,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .medsignal.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON format (default)
    #[default]
    Json,
    /// Markdown format
    Markdown,
}

/// Tier level for --fail-on and --min-tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, clap::ValueEnum)]
pub enum TierLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl TierLevel {
    pub fn tier(self) -> Tier {
        match self {
            TierLevel::Low => Tier::Low,
            TierLevel::Medium => Tier::Medium,
            TierLevel::High => Tier::High,
            TierLevel::Critical => Tier::Critical,
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        match self.input {
            None => return Err("An --input snapshot is required".to_string()),
            Some(ref path) if !path.is_file() => {
                return Err(format!("Input snapshot does not exist: {}", path.display()));
            }
            _ => {}
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref signals) = self.signals {
            if signals.is_empty() {
                return Err("--signals requires at least one signal".to_string());
            }
        }

        if let (Some(fail_on), Some(min_tier)) = (self.fail_on, self.min_tier) {
            if fail_on < min_tier {
                return Err(format!(
                    "--fail-on {:?} is below --min-tier {:?}; those cases would be filtered out",
                    fail_on, min_tier
                ));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// Signals to run, deduplicated, in identifier order.
    pub fn selected_signals(&self) -> Vec<SignalId> {
        let mut signals = self
            .signals
            .clone()
            .unwrap_or_else(|| SignalId::ALL.to_vec());
        signals.sort();
        signals.dedup();
        signals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            input: Some(PathBuf::from("Cargo.toml")),
            output: None,
            config: None,
            format: OutputFormat::Json,
            signals: None,
            threads: None,
            fail_on: None,
            min_tier: None,
            no_temporal_adjustment: false,
            no_progress: false,
            verbose: false,
            quiet: false,
            init_config: false,
        }
    }

    #[test]
    fn test_parse_signals_by_number_and_name() {
        let args = Args::try_parse_from([
            "medsignal",
            "--input",
            "snap.json",
            "--signals",
            "18,1,shared_official,1",
        ])
        .unwrap();
        assert_eq!(
            args.selected_signals(),
            vec![
                SignalId::ExcludedProvider,
                SignalId::SharedOfficial,
                SignalId::BustOut
            ]
        );

        assert!(Args::try_parse_from(["medsignal", "--input", "s.json", "--signals", "20"]).is_err());
    }

    #[test]
    fn test_default_selection_is_all_signals() {
        assert_eq!(make_args().selected_signals().len(), 19);
    }

    #[test]
    fn test_validation_missing_input() {
        let mut args = make_args();
        args.input = Some(PathBuf::from("does/not/exist.json"));
        assert!(args.validate().is_err());

        args.input = None;
        assert!(args.validate().is_err());

        args.init_config = true;
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.fail_on = Some(TierLevel::Medium);
        args.min_tier = Some(TierLevel::High);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_tier_levels() {
        assert_eq!(TierLevel::Critical.tier(), Tier::Critical);
        assert!(TierLevel::High > TierLevel::Medium);
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
