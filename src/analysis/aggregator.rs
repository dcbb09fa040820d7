//! Case aggregation and statistics.
//!
//! This module provides utilities for ranking, filtering and grouping the
//! flagged provider cases and computing summary statistics.

use crate::models::{ProviderCase, SignalId, Tier, TierSummary};
use std::collections::BTreeMap;

/// Sort cases by composite score (highest first), ties by NPI.
pub fn sort_cases_by_score(cases: &mut [ProviderCase]) {
    cases.sort_by(|a, b| {
        b.score
            .total
            .total_cmp(&a.score.total)
            .then_with(|| a.provider.npi.cmp(&b.provider.npi))
    });
}

/// Drop cases below a minimum tier.
pub fn filter_by_min_tier(cases: Vec<ProviderCase>, min: Tier) -> Vec<ProviderCase> {
    cases.into_iter().filter(|c| c.score.tier >= min).collect()
}

/// True if any case is at or above the given tier.
pub fn any_at_or_above(cases: &[ProviderCase], tier: Tier) -> bool {
    cases.iter().any(|c| c.score.tier >= tier)
}

/// Group cases by each signal they triggered.
pub fn group_by_signal(cases: &[ProviderCase]) -> BTreeMap<SignalId, Vec<&ProviderCase>> {
    let mut grouped: BTreeMap<SignalId, Vec<&ProviderCase>> = BTreeMap::new();

    for case in cases {
        for signal in case.distinct_signals() {
            grouped.entry(signal).or_default().push(case);
        }
    }

    grouped
}

/// Get the top N cases by composite score.
pub fn top_by_score(cases: &[ProviderCase], n: usize) -> Vec<&ProviderCase> {
    let mut sorted: Vec<&ProviderCase> = cases.iter().collect();
    sorted.sort_by(|a, b| {
        b.score
            .total
            .total_cmp(&a.score.total)
            .then_with(|| a.provider.npi.cmp(&b.provider.npi))
    });
    sorted.truncate(n);
    sorted
}

/// Get the top N cases by estimated overpayment.
pub fn top_by_overpayment(cases: &[ProviderCase], n: usize) -> Vec<&ProviderCase> {
    let mut sorted: Vec<&ProviderCase> = cases.iter().collect();
    sorted.sort_by(|a, b| {
        b.estimated_overpayment
            .total_cmp(&a.estimated_overpayment)
            .then_with(|| a.provider.npi.cmp(&b.provider.npi))
    });
    sorted.truncate(n);
    sorted
}

/// Estimated overpayment attributed to each signal (highest first).
pub fn overpayment_by_signal(cases: &[ProviderCase]) -> Vec<(SignalId, f64)> {
    let mut totals: BTreeMap<SignalId, f64> = BTreeMap::new();

    for evidence in cases.iter().flat_map(|c| &c.evidence) {
        *totals.entry(evidence.signal).or_default() += evidence.overpayment;
    }

    let mut sorted: Vec<_> = totals.into_iter().collect();
    sorted.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    sorted
}

/// Flagged providers per state.
pub fn state_distribution(cases: &[ProviderCase]) -> BTreeMap<String, usize> {
    let mut dist: BTreeMap<String, usize> = BTreeMap::new();

    for case in cases {
        *dist.entry(case.provider.state.clone()).or_default() += 1;
    }

    dist
}

/// Generate a text summary of tier statistics.
pub fn generate_summary_text(summary: &TierSummary) -> String {
    let mut lines = Vec::new();

    lines.push(format!("Flagged Providers: {}", summary.total));
    lines.push(format!(
        "- {} Critical: {}",
        Tier::Critical.emoji(),
        summary.critical
    ));
    lines.push(format!("- {} High: {}", Tier::High.emoji(), summary.high));
    lines.push(format!(
        "- {} Medium: {}",
        Tier::Medium.emoji(),
        summary.medium
    ));
    lines.push(format!("- {} Low: {}", Tier::Low.emoji(), summary.low));

    if !summary.by_signal.is_empty() {
        lines.push(String::new());
        lines.push("By Signal:".to_string());

        let mut signals: Vec<_> = summary.by_signal.iter().collect();
        signals.sort_by_key(|(_, count)| std::cmp::Reverse(*count));

        for (signal, count) in signals {
            lines.push(format!("- {}: {}", signal, count));
        }
    }

    lines.join("\n")
}
