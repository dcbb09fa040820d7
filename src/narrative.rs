//! Case narrative synthesis.
//!
//! The narrative is a pure function of its inputs: no clock, no
//! randomness, and iteration only over ordered collections, so a case
//! always renders to the same text.

use crate::models::{CompositeScore, Evidence, Provider, Severity, SignalId, Tier};
use std::collections::{BTreeMap, BTreeSet};

/// Per-signal roll-up of a provider's evidence.
struct SignalLine {
    signal: SignalId,
    severity: Severity,
    overpayment: f64,
    adjusted: bool,
}

/// Formats a dollar amount as `$1,234,567.89`.
pub fn format_usd(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let dollars = (cents / 100).to_string();
    let mut grouped = String::new();
    for (i, ch) in dollars.chars().enumerate() {
        if i > 0 && (dollars.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!("{sign}${grouped}.{:02}", cents % 100)
}

fn next_action(tier: Tier) -> &'static str {
    match tier {
        Tier::Critical => {
            "Refer for qui tam review and notify the state Medicaid Fraud Control Unit"
        }
        Tier::High => "Refer for qui tam review",
        Tier::Medium => "Open a desk audit of the flagged claims",
        Tier::Low => "Monitor billing in subsequent periods",
    }
}

fn signal_lines(evidence: &[Evidence]) -> Vec<SignalLine> {
    let mut by_signal: BTreeMap<SignalId, SignalLine> = BTreeMap::new();
    for e in evidence {
        let line = by_signal.entry(e.signal).or_insert(SignalLine {
            signal: e.signal,
            severity: e.severity,
            overpayment: 0.0,
            adjusted: false,
        });
        line.severity = line.severity.max(e.severity);
        line.overpayment += e.overpayment;
        line.adjusted |= e.context_adjusted;
    }
    let mut lines: Vec<SignalLine> = by_signal.into_values().collect();
    // Highest severity first, then largest overpayment, then signal number.
    lines.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then(b.overpayment.total_cmp(&a.overpayment))
            .then(a.signal.cmp(&b.signal))
    });
    lines
}

/// Signal that leads the case: highest severity, then largest
/// overpayment, then lowest number.
pub fn lead_signal(evidence: &[Evidence]) -> Option<SignalId> {
    signal_lines(evidence).first().map(|l| l.signal)
}

/// False Claims Act theories for the distinct signals, in signal order.
pub fn claim_types(evidence: &[Evidence]) -> Vec<String> {
    let signals: BTreeSet<SignalId> = evidence.iter().map(|e| e.signal).collect();
    signals
        .into_iter()
        .map(|s| s.claim_type().to_string())
        .collect()
}

/// Investigation steps for the leading signal, naming the provider.
pub fn next_steps(provider: &Provider, evidence: &[Evidence]) -> Vec<String> {
    lead_signal(evidence)
        .map(|signal| signal.investigation_steps_for(provider))
        .unwrap_or_default()
}

/// Renders the case summary for one flagged provider.
pub fn synthesize(
    provider: &Provider,
    evidence: &[Evidence],
    score: &CompositeScore,
    lifetime_paid: f64,
) -> String {
    let lines = signal_lines(evidence);
    let mut out = String::new();

    let display_name = if provider.name.is_empty() {
        format!("NPI {}", provider.npi)
    } else {
        format!("{} (NPI {})", provider.name, provider.npi)
    };
    let leads: Vec<&str> = lines.iter().take(2).map(|l| l.signal.title()).collect();
    out.push_str(&format!(
        "{} is a {} priority case with a composite risk score of {:.1}/100, led by {}.\n",
        display_name,
        score.tier.to_string().to_uppercase(),
        score.total,
        leads.join(" and ")
    ));

    out.push_str(&format!(
        "It triggered {} distinct fraud signal{}:\n",
        lines.len(),
        if lines.len() == 1 { "" } else { "s" }
    ));
    for line in &lines {
        out.push_str(&format!(
            "- {} ({}): {}; estimated overpayment {}",
            line.signal,
            line.severity,
            line.signal.description(),
            format_usd(line.overpayment)
        ));
        if line.adjusted {
            out.push_str(" (pandemic-era context considered)");
        }
        out.push_str(&format!("\n  Claim type: {}\n", line.signal.claim_type()));
    }

    let total: f64 = lines.iter().map(|l| l.overpayment).sum();
    if lifetime_paid > 0.0 {
        out.push_str(&format!(
            "Estimated overpayment totals {} against lifetime Medicaid billing of {} ({:.1}%).\n",
            format_usd(total),
            format_usd(lifetime_paid),
            total / lifetime_paid * 100.0
        ));
    } else {
        out.push_str(&format!("Estimated overpayment totals {}.\n", format_usd(total)));
    }

    let statutes: BTreeSet<&str> = evidence.iter().map(|e| e.statute.as_str()).collect();
    out.push_str(&format!(
        "Statutory basis: {}.\n",
        statutes.into_iter().collect::<Vec<_>>().join("; ")
    ));
    out.push_str(&format!("Recommended action: {}.\n", next_action(score.tier)));

    let steps = next_steps(provider, evidence);
    if !steps.is_empty() {
        out.push_str("Next steps:\n");
        for (i, step) in steps.iter().enumerate() {
            out.push_str(&format!("{}. {}\n", i + 1, step));
        }
    }

    out.trim_end().to_string()
}
