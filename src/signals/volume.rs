//! Physical-capacity signals.
//!
//! Signal 4 converts claim volume into an implied claims-per-hour rate.
//! Signal 6 checks whether home health claims could plausibly have been
//! delivered to the beneficiaries and in the state on record.

use super::{round4, EvalContext, SignalResult};
use crate::models::{EntityKind, Evidence, Provider, Severity, SignalId};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};

/// Signal 4.
pub fn workforce_impossibility(ctx: &EvalContext<'_>, provider: &Provider) -> SignalResult {
    let signal = SignalId::WorkforceImpossibility;
    let t = &ctx.thresholds.workforce;
    let monthly = ctx.store.monthly(&provider.npi)?;

    // Distinct rendering practitioners per month for organizations.
    let mut workers: BTreeMap<chrono::NaiveDate, BTreeSet<&str>> = BTreeMap::new();
    if provider.kind == EntityKind::Organization {
        for link in ctx.store.servicing_for_billing(&provider.npi) {
            workers
                .entry(link.month)
                .or_default()
                .insert(link.servicing_npi.as_str());
        }
    }

    let ceiling = ctx.scaled(signal, t.max_claims_per_hour);
    let mut flagged = Vec::new();
    let mut overpayment = 0.0;
    let mut peak_rate: f64 = 0.0;
    for row in monthly.iter().filter(|m| m.claims > 0) {
        let staff = workers.get(&row.month).map(BTreeSet::len).unwrap_or(0).max(1);
        let hours = ctx.thresholds.hours_per_month * staff as f64;
        let rate = row.claims as f64 / hours;
        if rate <= ceiling {
            continue;
        }
        let excess_claims = row.claims as f64 - ceiling * hours;
        let avg_cost = row.paid / row.claims as f64;
        overpayment += excess_claims * avg_cost;
        peak_rate = peak_rate.max(rate);
        flagged.push((row.month, row.claims, staff, rate));
    }
    if flagged.is_empty() {
        return Ok(None);
    }

    let severity = if peak_rate > t.high_rate_multiple * ceiling {
        Severity::High
    } else {
        Severity::Medium
    };
    let months: Vec<_> = flagged
        .iter()
        .map(|(month, claims, staff, rate)| {
            json!({
                "month": month,
                "claims": claims,
                "workers": staff,
                "claims_per_hour": round4(*rate),
            })
        })
        .collect();
    let detail = json!({
        "ceiling_claims_per_hour": ceiling,
        "hours_per_month": ctx.thresholds.hours_per_month,
        "peak_claims_per_hour": round4(peak_rate),
        "flagged_months": months,
    });

    Ok(Some(
        Evidence::new(signal, severity, overpayment, detail)
            .with_months(flagged.iter().map(|f| f.0).collect()),
    ))
}

/// Signal 6. The excess is the larger of two measures: claims beyond what
/// the minimum beneficiary ratio allows, and home-state claims missing
/// relative to the minimum home-state ratio.
pub fn geographic_implausibility(ctx: &EvalContext<'_>, provider: &Provider) -> SignalResult {
    let signal = SignalId::GeographicImplausibility;
    let t = &ctx.thresholds.geographic;
    if !ctx.thresholds.is_home_health(&provider.taxonomy) {
        return Ok(None);
    }
    let totals = ctx.store.totals(&provider.npi)?;
    let Some(avg_cost) = totals.avg_claim_cost() else {
        return Ok(None);
    };
    let claims = totals.claims as f64;

    let min_beneficiary_ratio = ctx.minimum(signal, t.min_beneficiary_ratio);
    let beneficiary_ratio = totals.beneficiaries as f64 / claims;
    let beneficiary_excess = if beneficiary_ratio < min_beneficiary_ratio {
        claims - totals.beneficiaries as f64 / min_beneficiary_ratio
    } else {
        0.0
    };

    // The split is optional; without it only the beneficiary measure applies.
    let mut home_state_ratio = None;
    let mut home_state_excess = 0.0;
    if let Ok(split) = ctx.store.home_state(&provider.npi) {
        if split.total_claims > 0 {
            let ratio = split.home_state_claims as f64 / split.total_claims as f64;
            let min_ratio = ctx.minimum(signal, t.min_home_state_ratio);
            if ratio < min_ratio {
                home_state_excess =
                    min_ratio * split.total_claims as f64 - split.home_state_claims as f64;
            }
            home_state_ratio = Some(ratio);
        }
    }

    let excess = beneficiary_excess.max(home_state_excess);
    if excess <= 0.0 {
        return Ok(None);
    }
    let severity = if excess > t.high_excess_share * claims {
        Severity::High
    } else {
        Severity::Medium
    };

    let detail = json!({
        "claims": totals.claims,
        "beneficiaries": totals.beneficiaries,
        "beneficiary_ratio": round4(beneficiary_ratio),
        "min_beneficiary_ratio": min_beneficiary_ratio,
        "home_state_ratio": home_state_ratio.map(round4),
        "beneficiary_excess_claims": beneficiary_excess,
        "home_state_excess_claims": home_state_excess,
        "avg_claim_cost": round4(avg_cost),
    });

    Ok(Some(Evidence::new(
        signal,
        severity,
        excess * avg_cost,
        detail,
    )))
}
