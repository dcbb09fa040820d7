//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.medsignal.toml` files. Every section and field has a default, so an
//! empty file (or no file) yields the calibrated defaults.

use crate::models::SignalId;
use crate::signals::thresholds::Thresholds;
use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Default configuration file name.
pub const CONFIG_FILE: &str = ".medsignal.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Signal calibration.
    #[serde(default)]
    pub thresholds: Thresholds,

    /// Composite score weights and caps.
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Historical anomaly window.
    #[serde(default)]
    pub temporal: TemporalConfig,

    /// Exempt and high-threshold entity tables.
    #[serde(default)]
    pub exemptions: ExemptionConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Worker threads for provider evaluation (0 = one per core).
    #[serde(default)]
    pub threads: usize,

    /// Show a progress bar while evaluating.
    #[serde(default = "default_true")]
    pub show_progress: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            threads: 0,
            show_progress: true,
        }
    }
}

fn default_output() -> String {
    "medsignal_report.json".to_string()
}

fn default_true() -> bool {
    true
}

/// Severity weights applied to each Evidence record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeverityWeights {
    #[serde(default = "default_critical_weight")]
    pub critical: f64,
    #[serde(default = "default_high_weight")]
    pub high: f64,
    #[serde(default = "default_medium_weight")]
    pub medium: f64,
}

impl Default for SeverityWeights {
    fn default() -> Self {
        Self {
            critical: default_critical_weight(),
            high: default_high_weight(),
            medium: default_medium_weight(),
        }
    }
}

fn default_critical_weight() -> f64 {
    1.0
}

fn default_high_weight() -> f64 {
    0.6
}

fn default_medium_weight() -> f64 {
    0.3
}

/// Composite score settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Breadth points per distinct signal.
    #[serde(default = "default_breadth_points")]
    pub breadth_points_per_signal: f64,

    #[serde(default = "default_breadth_cap")]
    pub breadth_cap: f64,

    /// Severity points per unit of (severity weight x risk weight).
    #[serde(default = "default_severity_points")]
    pub severity_points_per_unit: f64,

    #[serde(default = "default_severity_cap")]
    pub severity_cap: f64,

    /// Ratio points when overpayment equals lifetime billing.
    #[serde(default = "default_ratio_scale")]
    pub ratio_scale: f64,

    #[serde(default = "default_ratio_cap")]
    pub ratio_cap: f64,

    #[serde(default)]
    pub severity_weights: SeverityWeights,

    /// Per-signal risk weight overrides, keyed by signal name or number.
    #[serde(default)]
    pub risk_weights: BTreeMap<String, f64>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            breadth_points_per_signal: default_breadth_points(),
            breadth_cap: default_breadth_cap(),
            severity_points_per_unit: default_severity_points(),
            severity_cap: default_severity_cap(),
            ratio_scale: default_ratio_scale(),
            ratio_cap: default_ratio_cap(),
            severity_weights: SeverityWeights::default(),
            risk_weights: BTreeMap::new(),
        }
    }
}

fn default_breadth_points() -> f64 {
    6.0
}

fn default_breadth_cap() -> f64 {
    30.0
}

fn default_severity_points() -> f64 {
    20.0
}

fn default_severity_cap() -> f64 {
    40.0
}

fn default_ratio_scale() -> f64 {
    30.0
}

fn default_ratio_cap() -> f64 {
    30.0
}

/// Historical anomaly window for the temporal adjuster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_window_start")]
    pub window_start: NaiveDate,

    #[serde(default = "default_window_end")]
    pub window_end: NaiveDate,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_start: default_window_start(),
            window_end: default_window_end(),
        }
    }
}

fn default_window_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 3, 1).unwrap_or_default()
}

fn default_window_end() -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 12, 31).unwrap_or_default()
}

/// Entity classification tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExemptionConfig {
    /// NPIs whose Evidence is always suppressed.
    #[serde(default)]
    pub exempt_npis: Vec<String>,

    /// Taxonomy codes (or prefixes) that are always suppressed.
    #[serde(default)]
    pub exempt_taxonomies: Vec<String>,

    /// Case-insensitive substrings of provider names that are suppressed.
    #[serde(default)]
    pub exempt_name_patterns: Vec<String>,

    /// NPIs held to the elevated bar.
    #[serde(default)]
    pub high_threshold_npis: Vec<String>,

    /// Taxonomy codes (or prefixes) held to the elevated bar.
    #[serde(default = "default_high_threshold_taxonomies")]
    pub high_threshold_taxonomies: Vec<String>,

    /// Case-insensitive name substrings held to the elevated bar.
    #[serde(default)]
    pub high_threshold_name_patterns: Vec<String>,

    /// Bar multiplier for high-threshold entities.
    #[serde(default = "default_elevated_bar")]
    pub default_elevated_bar: f64,

    /// Per-signal bar multipliers, keyed by signal name or number.
    #[serde(default)]
    pub elevated_bars: BTreeMap<String, f64>,
}

impl Default for ExemptionConfig {
    fn default() -> Self {
        Self {
            exempt_npis: Vec::new(),
            exempt_taxonomies: Vec::new(),
            exempt_name_patterns: Vec::new(),
            high_threshold_npis: Vec::new(),
            high_threshold_taxonomies: default_high_threshold_taxonomies(),
            high_threshold_name_patterns: Vec::new(),
            default_elevated_bar: default_elevated_bar(),
            elevated_bars: BTreeMap::new(),
        }
    }
}

/// FQHC, rural health clinic and critical access hospital taxonomies.
fn default_high_threshold_taxonomies() -> Vec<String> {
    vec!["261QF0400X", "261QR1300X", "282NC0060X"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_elevated_bar() -> f64 {
    2.0
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Number of providers listed in the top-providers table.
    #[serde(default = "default_top_providers")]
    pub top_providers: usize,

    /// Include per-provider narratives in Markdown reports.
    #[serde(default = "default_true")]
    pub include_narratives: bool,

    /// Maximum signal pairs listed in the correlation table.
    #[serde(default = "default_max_pairs")]
    pub max_pairs: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            top_providers: default_top_providers(),
            include_narratives: true,
            max_pairs: default_max_pairs(),
        }
    }
}

fn default_top_providers() -> usize {
    25
}

fn default_max_pairs() -> usize {
    20
}

/// Resolves signal-keyed overrides (names or numbers) into a typed map.
pub fn signal_map(raw: &BTreeMap<String, f64>) -> Result<BTreeMap<SignalId, f64>, String> {
    raw.iter()
        .map(|(key, value)| Ok((key.parse::<SignalId>()?, *value)))
        .collect()
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(threads) = args.threads {
            self.general.threads = threads;
        }

        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }

        if args.no_temporal_adjustment {
            self.temporal.enabled = false;
        }

        if args.no_progress || args.quiet {
            self.general.show_progress = false;
        }
    }

    /// Checks cross-field consistency that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        self.thresholds
            .validate()
            .map_err(|e| anyhow::anyhow!(e))
            .context("Invalid [thresholds]")?;

        if self.temporal.window_start > self.temporal.window_end {
            bail!("[temporal] window_start must not be after window_end");
        }

        let exemptions = &self.exemptions;
        if exemptions.default_elevated_bar < 1.0 {
            bail!("[exemptions] default_elevated_bar must be at least 1.0");
        }
        let bars = signal_map(&exemptions.elevated_bars)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Invalid [exemptions.elevated_bars]")?;
        if let Some((signal, bar)) = bars.iter().find(|(_, bar)| **bar < 1.0) {
            bail!("[exemptions.elevated_bars] bar for {signal} is {bar}, must be at least 1.0");
        }

        let weights = signal_map(&self.scoring.risk_weights)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Invalid [scoring.risk_weights]")?;
        if let Some((signal, weight)) = weights.iter().find(|(_, w)| **w < 0.0) {
            bail!("[scoring.risk_weights] weight for {signal} is {weight}, must not be negative");
        }

        Ok(())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
