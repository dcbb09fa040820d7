//! medsignal - Medicaid provider fraud-signal engine
//!
//! A CLI tool that evaluates nineteen fraud archetypes over pre-aggregated
//! Medicaid billing data and produces scored, investigation-ready reports.
//!
//! Exit codes:
//!   0 - Success (no provider at or above --fail-on, or no --fail-on set)
//!   1 - Runtime error (config, snapshot, conflicting exemption tables, etc.)
//!   2 - Providers found at or above the --fail-on tier

mod aggregates;
mod analysis;
mod cli;
mod cohort;
mod config;
mod correlation;
mod engine;
mod error;
mod exemption;
mod models;
mod narrative;
mod report;
mod scoring;
mod signals;
mod temporal;

use aggregates::AggregateStore;
use anyhow::{Context, Result};
use chrono::Utc;
use cli::{Args, OutputFormat};
use config::{Config, CONFIG_FILE};
use engine::Engine;
use models::{ReportMetadata, RunReport, Tier, TierSummary};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("medsignal v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run_detection(args) {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .medsignal.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to tune thresholds, exemptions, scoring and the anomaly window.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run the complete detection workflow. Returns exit code (0 or 2).
fn run_detection(args: Args) -> Result<i32> {
    let start_time = Instant::now();

    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);
    config.validate()?;

    if config.general.threads > 0 {
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(config.general.threads)
            .build_global()
        {
            warn!("Could not size the worker pool: {}", e);
        }
    }

    // Step 1: Load the aggregates
    let input = args
        .input
        .clone()
        .context("An --input snapshot is required")?;
    println!("📥 Loading aggregate snapshot: {}", input.display());
    let store = AggregateStore::load(&input)?;
    println!("   Providers: {}", store.len());
    if store.is_empty() {
        warn!("Snapshot contains no providers");
    }

    // Step 2: Evaluate
    let signals = args.selected_signals();
    println!("\n🔬 Evaluating {} signals...", signals.len());
    if !config.temporal.enabled {
        println!("   Pandemic-era adjustment disabled");
    }

    let engine = Engine::new(&config).context("Invalid exemption tables")?;
    let output = engine
        .run(&store, &signals, config.general.show_progress)
        .context("Detection run aborted")?;

    let providers_scanned = output.providers_scanned;
    let total_estimated_overpayment = output.total_estimated_overpayment();
    let correlation = output.correlation;
    let mut cases: Vec<_> = output.cases.into_values().collect();
    analysis::sort_cases_by_score(&mut cases);

    // Apply --min-tier filter
    if let Some(min) = args.min_tier {
        let before = cases.len();
        cases = analysis::filter_by_min_tier(cases, min.tier());
        debug!("--min-tier removed {} cases", before - cases.len());
    }

    // Step 3: Build the report
    println!("\n📝 Generating report...");

    let duration = start_time.elapsed().as_secs_f64();
    let summary = TierSummary::from_cases(&cases);

    let metadata = ReportMetadata {
        generated_at: Utc::now(),
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        input: input.display().to_string(),
        signals_run: signals.iter().map(|s| s.number()).collect(),
        providers_scanned,
        providers_flagged: correlation.flagged_providers,
        total_estimated_overpayment,
        duration_seconds: duration,
    };

    let report = RunReport {
        metadata,
        summary: summary.clone(),
        cases,
        correlation,
    };

    let content = match args.format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&report, &config.report),
    };
    let output_path = Path::new(&config.general.output);
    report::write_report(&content, output_path)?;

    // Print summary
    println!("\n📊 Detection Summary:");
    println!("   Providers scanned: {}", providers_scanned);
    for line in analysis::generate_summary_text(&summary).lines() {
        println!("   {}", line);
    }
    println!(
        "   Estimated overpayment: {}",
        narrative::format_usd(total_estimated_overpayment)
    );
    println!("   Duration: {:.1}s", duration);
    println!(
        "\n✅ Run complete! Report saved to: {}",
        output_path.display()
    );

    // Check --fail-on threshold
    if let Some(fail_level) = args.fail_on {
        let threshold: Tier = fail_level.tier();
        if analysis::any_at_or_above(&report.cases, threshold) {
            eprintln!(
                "\n⛔ Providers found at or above {} tier. Failing (exit code 2).",
                threshold
            );
            return Ok(2);
        }
    }

    Ok(0)
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {:#}", e);
            Ok(Config::default())
        }
    }
}
