//! Report generation.
//!
//! This module renders a [`RunReport`] as an investigator-facing Markdown
//! document or as pretty-printed JSON.

use crate::analysis::{
    group_by_signal, overpayment_by_signal, state_distribution, top_by_overpayment, top_by_score,
};
use crate::config::ReportConfig;
use crate::models::{
    CorrelationSummary, Evidence, ProviderCase, ReportMetadata, RunReport, Tier, TierSummary,
};
use crate::narrative::format_usd;
use anyhow::{Context, Result};
use std::path::Path;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &RunReport, options: &ReportConfig) -> String {
    let mut output = String::new();

    // Title
    output.push_str("# Medicaid Fraud Signal Report\n\n");

    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_table_of_contents(report, options));
    output.push_str(&generate_summary_section(&report.summary, &report.cases));
    output.push_str(&generate_top_providers_section(&report.cases, options.top_providers));
    output.push_str(&generate_cases_section(&report.cases, options));
    output.push_str(&generate_correlation_section(&report.correlation, options.max_pairs));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Input:** `{}`\n", metadata.input));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Tool Version:** {}\n", metadata.tool_version));
    let signals: Vec<String> = metadata.signals_run.iter().map(|n| n.to_string()).collect();
    section.push_str(&format!("- **Signals Run:** {}\n", signals.join(", ")));
    section.push_str(&format!(
        "- **Providers Scanned:** {}\n",
        metadata.providers_scanned
    ));
    section.push_str(&format!(
        "- **Providers Flagged:** {}\n",
        metadata.providers_flagged
    ));
    section.push_str(&format!(
        "- **Total Estimated Overpayment:** {}\n",
        format_usd(metadata.total_estimated_overpayment)
    ));
    section.push_str(&format!(
        "- **Run Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

fn anchor(case: &ProviderCase) -> String {
    format!("npi-{}", case.provider.npi)
}

/// Generate the table of contents.
fn generate_table_of_contents(report: &RunReport, options: &ReportConfig) -> String {
    let mut toc = String::new();

    toc.push_str("## Table of Contents\n\n");
    toc.push_str("- [Metadata](#metadata)\n");
    toc.push_str("- [Summary](#summary)\n");
    toc.push_str("- [Top Providers](#top-providers)\n");
    toc.push_str("- [Provider Cases](#provider-cases)\n");

    for case in report.cases.iter().take(options.top_providers) {
        toc.push_str(&format!(
            "  - [{} ({})](#{})\n",
            case.provider.name,
            case.provider.npi,
            anchor(case)
        ));
    }

    toc.push_str("- [Cross-Signal Correlation](#cross-signal-correlation)\n\n");

    toc
}

/// Generate the summary section.
fn generate_summary_section(summary: &TierSummary, cases: &[ProviderCase]) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");

    // Tier breakdown
    section.push_str("### Tier Breakdown\n\n");
    section.push_str(&format!(
        "| {} Critical | {} High | {} Medium | {} Low | **Total** |\n",
        Tier::Critical.emoji(),
        Tier::High.emoji(),
        Tier::Medium.emoji(),
        Tier::Low.emoji(),
    ));
    section.push_str("|:---:|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | {} | **{}** |\n\n",
        summary.critical, summary.high, summary.medium, summary.low, summary.total
    ));

    // Signal frequency with attributed overpayment
    let by_signal = overpayment_by_signal(cases);
    if !by_signal.is_empty() {
        let providers = group_by_signal(cases);
        section.push_str("### Signals\n\n");
        section.push_str("| Signal | Providers | Evidence | Estimated Overpayment |\n");
        section.push_str("|:---|:---:|:---:|---:|\n");

        for (signal, amount) in by_signal {
            let count = summary.by_signal.get(signal.title()).copied().unwrap_or(0);
            section.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                signal,
                providers.get(&signal).map(Vec::len).unwrap_or(0),
                count,
                format_usd(amount)
            ));
        }
        section.push('\n');
    }

    // State distribution
    let states = state_distribution(cases);
    if !states.is_empty() {
        section.push_str("### Flagged Providers by State\n\n");
        section.push_str("| State | Providers |\n");
        section.push_str("|:---|:---:|\n");

        let mut states: Vec<_> = states.iter().collect();
        states.sort_by_key(|(_, count)| std::cmp::Reverse(*count));

        for (state, count) in states {
            section.push_str(&format!("| {} | {} |\n", state, count));
        }
        section.push('\n');
    }

    section
}

/// Generate the top providers tables.
fn generate_top_providers_section(cases: &[ProviderCase], n: usize) -> String {
    let mut section = String::new();

    section.push_str("## Top Providers\n\n");

    if cases.is_empty() {
        section.push_str("No providers were flagged.\n\n");
        return section;
    }

    section.push_str("### By Composite Score\n\n");
    section.push_str("| Rank | Provider | NPI | State | Tier | Score | Signals | Est. Overpayment |\n");
    section.push_str("|:---:|:---|:---|:---:|:---:|---:|:---:|---:|\n");
    for (i, case) in top_by_score(cases, n).into_iter().enumerate() {
        section.push_str(&format!(
            "| {} | [{}](#{}) | {} | {} | {} {} | {:.1} | {} | {} |\n",
            i + 1,
            case.provider.name,
            anchor(case),
            case.provider.npi,
            case.provider.state,
            case.score.tier.emoji(),
            case.score.tier,
            case.score.total,
            case.distinct_signals().len(),
            format_usd(case.estimated_overpayment)
        ));
    }
    section.push('\n');

    section.push_str("### By Estimated Overpayment\n\n");
    section.push_str("| Provider | NPI | Est. Overpayment | Lifetime Paid |\n");
    section.push_str("|:---|:---|---:|---:|\n");
    for case in top_by_overpayment(cases, n) {
        section.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            case.provider.name,
            case.provider.npi,
            format_usd(case.estimated_overpayment),
            format_usd(case.total_paid)
        ));
    }
    section.push('\n');

    section
}

/// Generate the per-provider case sections.
fn generate_cases_section(cases: &[ProviderCase], options: &ReportConfig) -> String {
    let mut section = String::new();

    section.push_str("## Provider Cases\n\n");

    for case in cases.iter().take(options.top_providers) {
        section.push_str(&generate_case_block(case, options.include_narratives));
    }

    if cases.len() > options.top_providers {
        section.push_str(&format!(
            "*{} further cases are included in the JSON report.*\n\n",
            cases.len() - options.top_providers
        ));
    }

    section
}

/// Generate a single provider case block.
fn generate_case_block(case: &ProviderCase, include_narrative: bool) -> String {
    let mut block = String::new();

    block.push_str(&format!(
        "### {} {} ({}) {{#{}}}\n\n",
        case.score.tier.emoji(),
        case.provider.name,
        case.provider.npi,
        anchor(case)
    ));

    let top = case
        .top_severity()
        .map(|s| format!("{} {}", s.emoji(), s))
        .unwrap_or_else(|| "-".to_string());
    block.push_str(&format!(
        "*Taxonomy: {} | State: {} | Top Severity: {} | Score: {:.1} ({}) | Breadth {:.1} / Severity {:.1} / Ratio {:.1}*\n\n",
        case.provider.taxonomy,
        case.provider.state,
        top,
        case.score.total,
        case.score.tier,
        case.score.breakdown.breadth,
        case.score.breakdown.severity,
        case.score.breakdown.overpayment_ratio
    ));

    if include_narrative && !case.narrative.is_empty() {
        for line in case.narrative.lines() {
            block.push_str(&format!("> {}\n", line));
        }
        block.push('\n');
    }

    if !case.claim_types.is_empty() {
        block.push_str("**Claim types:**\n\n");
        for claim_type in &case.claim_types {
            block.push_str(&format!("- {}\n", claim_type));
        }
        block.push('\n');
    }

    block.push_str("| Signal | Severity | Window | Group | Overpayment | Statute |\n");
    block.push_str("|:---|:---:|:---:|:---|---:|:---|\n");
    for evidence in &case.evidence {
        block.push_str(&evidence_row(evidence));
    }
    block.push('\n');

    let notes: Vec<_> = case
        .evidence
        .iter()
        .filter_map(|e| e.annotation.as_ref().map(|a| (e.signal, a)))
        .collect();
    for (signal, note) in notes {
        block.push_str(&format!("> ⚠️ {}: {}\n", signal, note));
    }

    block.push_str("\n---\n\n");

    block
}

fn evidence_row(evidence: &Evidence) -> String {
    format!(
        "| {} | {} {} | {} | {} | {} | {} |\n",
        evidence.signal,
        evidence.severity.emoji(),
        evidence.severity,
        evidence.window.map(|w| w.label()).unwrap_or_else(|| "-".to_string()),
        evidence.group.as_deref().unwrap_or("-"),
        format_usd(evidence.overpayment),
        evidence.statute
    )
}

/// Generate the correlation tables.
fn generate_correlation_section(correlation: &CorrelationSummary, max_pairs: usize) -> String {
    let mut section = String::new();

    section.push_str("## Cross-Signal Correlation\n\n");

    if correlation.flagged_providers == 0 {
        section.push_str("No providers were flagged.\n\n");
        return section;
    }

    section.push_str("### Providers by Distinct Signal Count\n\n");
    section.push_str("| Signals | Providers |\n");
    section.push_str("|:---:|:---:|\n");
    for (count, providers) in &correlation.signal_count_histogram {
        section.push_str(&format!("| {} | {} |\n", count, providers));
    }
    section.push('\n');

    if !correlation.pairs.is_empty() {
        section.push_str("### Most Frequent Signal Pairs\n\n");
        section.push_str("| Signal | Signal | Providers |\n");
        section.push_str("|:---|:---|:---:|\n");
        for pair in correlation.pairs.iter().take(max_pairs) {
            section.push_str(&format!(
                "| {} | {} | {} |\n",
                pair.first, pair.second, pair.providers
            ));
        }
        section.push('\n');
    }

    if !correlation.priority_candidates.is_empty() {
        section.push_str("### Priority Review Candidates\n\n");
        section.push_str("| Provider | NPI | Signals | Score | Tier |\n");
        section.push_str("|:---|:---|:---:|---:|:---:|\n");
        for candidate in &correlation.priority_candidates {
            section.push_str(&format!(
                "| {} | {} | {} | {:.1} | {} {} |\n",
                candidate.name,
                candidate.npi,
                candidate.distinct_signals,
                candidate.score,
                candidate.tier.emoji(),
                candidate.tier
            ));
        }
        section.push('\n');
    }

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str(
        "*Generated by medsignal. Signals are statistical leads for human review, not determinations of fraud.*\n",
    );

    footer
}

/// Generate a JSON report.
pub fn generate_json_report(report: &RunReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Write rendered report content to a file.
pub fn write_report(content: &str, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write report to {}", path.display()))
}
