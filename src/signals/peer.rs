//! Peer-comparison signals: the provider against a cohort percentile.
//!
//! - 2: lifetime billing outlier within taxonomy and state
//! - 8: E&M upcoding within taxonomy and state
//! - 9: concurrent multi-state billing, national
//! - 16: single-code billing monoculture within taxonomy, national
//! - 17: per-code reimbursement rate anomaly, national
//! - 19: per-code repetitive service, national

use super::{round4, EvalContext, SignalResult};
use crate::cohort::{peak_state_month, taxonomy_state_key, DominantCode, EmMix, NATIONAL};
use crate::error::EngineError;
use crate::models::{EntityKind, Evidence, MonthWindow, Provider, Severity, SignalId};
use serde_json::json;

/// Signal 2.
pub fn billing_outlier(ctx: &EvalContext<'_>, provider: &Provider) -> SignalResult {
    let signal = SignalId::BillingOutlier;
    let totals = ctx.store.totals(&provider.npi)?;
    let cohort = taxonomy_state_key(&provider.taxonomy, &provider.state);
    let stat = ctx.cohorts.lifetime_paid.get(&cohort)?;

    let threshold = ctx.scaled(signal, stat.p99);
    if threshold <= 0.0 || totals.paid <= threshold {
        return Ok(None);
    }

    let median_multiple = (stat.median > 0.0).then(|| totals.paid / stat.median);
    let severity = match median_multiple {
        Some(m) if m <= ctx.thresholds.billing_outlier.high_median_multiple => Severity::Medium,
        _ => Severity::High,
    };

    let detail = json!({
        "cohort": cohort,
        "cohort_size": stat.size,
        "lifetime_paid": totals.paid,
        "cohort_median": stat.median,
        "cohort_p99": stat.p99,
        "threshold": threshold,
        "median_multiple": median_multiple.map(round4),
    });

    Ok(Some(Evidence::new(
        signal,
        severity,
        totals.paid - threshold,
        detail,
    )))
}

/// Signal 8.
pub fn upcoding(ctx: &EvalContext<'_>, provider: &Provider) -> SignalResult {
    let signal = SignalId::Upcoding;
    let t = &ctx.thresholds.upcoding;
    let codes = ctx.store.codes(&provider.npi)?;
    let mix = EmMix::from_codes(codes, ctx.thresholds);
    if mix.em_claims < t.min_em_claims {
        return Ok(None);
    }
    let Some(share) = mix.share() else {
        return Ok(None);
    };

    let cohort = taxonomy_state_key(&provider.taxonomy, &provider.state);
    let stat = ctx.cohorts.high_complexity_share.get(&cohort)?;
    let threshold = ctx.floor(signal, stat.p90.max(t.min_share));
    if share <= threshold || share <= 0.0 {
        return Ok(None);
    }

    // Portion of high-complexity billing above what the cohort median share
    // would have produced.
    let excess_fraction = ((share - stat.median) / share).clamp(0.0, 1.0);
    let overpayment = t.overpayment_share * mix.high_paid * excess_fraction;
    let severity = if share >= t.high_share {
        Severity::High
    } else {
        Severity::Medium
    };

    let detail = json!({
        "cohort": cohort,
        "em_claims": mix.em_claims,
        "high_complexity_claims": mix.high_claims,
        "high_complexity_paid": mix.high_paid,
        "high_complexity_share": round4(share),
        "cohort_median_share": round4(stat.median),
        "cohort_p90_share": round4(stat.p90),
        "threshold": round4(threshold),
    });

    Ok(Some(Evidence::new(signal, severity, overpayment, detail)))
}

/// Signal 9. Only individual practitioners can be physically present in
/// one place at a time.
pub fn concurrent_billing(ctx: &EvalContext<'_>, provider: &Provider) -> SignalResult {
    let signal = SignalId::ConcurrentBilling;
    if provider.kind != EntityKind::Individual {
        return Ok(None);
    }
    let Some(peak) = peak_state_month(ctx.store, &provider.npi) else {
        return Ok(None);
    };

    let t = &ctx.thresholds.concurrent_billing;
    let stat = ctx.cohorts.concurrent_states.get(NATIONAL)?;
    let threshold = ctx.scaled(signal, stat.p99);
    let minimum = ctx.scaled(signal, t.min_states as f64);
    let states = peak.states as f64;
    if states <= threshold || states < minimum {
        return Ok(None);
    }

    let overpayment = peak.paid * (states - threshold) / states;
    let severity = if peak.states >= t.high_states {
        Severity::High
    } else {
        Severity::Medium
    };

    let detail = json!({
        "peak_month": peak.month,
        "distinct_states": peak.states,
        "national_p99": round4(stat.p99),
        "threshold": round4(threshold),
        "peak_month_paid": peak.paid,
    });

    Ok(Some(
        Evidence::new(signal, severity, overpayment, detail)
            .with_window(Some(MonthWindow::new(peak.month, peak.month))),
    ))
}

/// Signal 16.
pub fn billing_monoculture(ctx: &EvalContext<'_>, provider: &Provider) -> SignalResult {
    let signal = SignalId::BillingMonoculture;
    let t = &ctx.thresholds.monoculture;
    let codes = ctx.store.codes(&provider.npi)?;
    let Some(dominant) = DominantCode::from_codes(codes) else {
        return Ok(None);
    };
    if dominant.total_paid < ctx.scaled(signal, t.min_paid) {
        return Ok(None);
    }

    let stat = ctx.cohorts.dominant_share.get(&provider.taxonomy)?;
    let threshold = ctx.floor(signal, stat.p90.max(t.min_share));
    if dominant.share <= threshold {
        return Ok(None);
    }

    let overpayment = dominant.paid - threshold * dominant.total_paid;
    let severity = if dominant.share >= t.high_share {
        Severity::High
    } else {
        Severity::Medium
    };

    let detail = json!({
        "dominant_code": dominant.code,
        "dominant_paid": dominant.paid,
        "total_paid": dominant.total_paid,
        "dominant_share": round4(dominant.share),
        "taxonomy_p90_share": round4(stat.p90),
        "threshold": round4(threshold),
    });

    Ok(Some(Evidence::new(signal, severity, overpayment, detail)))
}

/// Signal 17.
pub fn rate_anomaly(ctx: &EvalContext<'_>, provider: &Provider) -> SignalResult {
    let signal = SignalId::RateAnomaly;
    let t = &ctx.thresholds.rate_anomaly;
    let codes = ctx.store.codes(&provider.npi)?;

    let mut flagged = Vec::new();
    let mut overpayment = 0.0;
    let mut worst_multiple: f64 = 0.0;
    for code in codes.iter().filter(|c| c.claims >= t.min_claims) {
        let stat = match ctx.cohorts.code_rate.get(&code.code) {
            Ok(stat) => stat,
            Err(EngineError::InvalidCohort { .. }) => continue,
            Err(e) => return Err(e),
        };
        if stat.median <= 0.0 {
            continue;
        }
        let trigger = ctx.scaled(signal, t.median_multiple * stat.median);
        let rate = code.paid / code.claims as f64;
        if rate <= trigger {
            continue;
        }
        let excess = code.claims as f64 * (rate - trigger);
        overpayment += excess;
        worst_multiple = worst_multiple.max(rate / trigger);
        flagged.push(json!({
            "code": code.code,
            "claims": code.claims,
            "rate": round4(rate),
            "national_median_rate": round4(stat.median),
            "trigger_rate": round4(trigger),
            "excess_paid": excess,
        }));
    }
    if flagged.is_empty() {
        return Ok(None);
    }

    let severity = if worst_multiple > t.high_trigger_multiple {
        Severity::High
    } else {
        Severity::Medium
    };
    let detail = json!({
        "flagged_codes": flagged,
        "worst_trigger_multiple": round4(worst_multiple),
    });

    Ok(Some(Evidence::new(signal, severity, overpayment, detail)))
}

/// Signal 19.
pub fn repetitive_service(ctx: &EvalContext<'_>, provider: &Provider) -> SignalResult {
    let signal = SignalId::RepetitiveService;
    let t = &ctx.thresholds.repetitive_service;
    let codes = ctx.store.codes(&provider.npi)?;

    let mut flagged = Vec::new();
    let mut overpayment = 0.0;
    let mut high = false;
    for code in codes
        .iter()
        .filter(|c| c.claims >= t.min_claims && c.beneficiaries > 0)
    {
        let stat = match ctx.cohorts.claims_per_beneficiary.get(&code.code) {
            Ok(stat) => stat,
            Err(EngineError::InvalidCohort { .. }) => continue,
            Err(e) => return Err(e),
        };
        let threshold = ctx.scaled(signal, stat.p99);
        let per_beneficiary = code.claims as f64 / code.beneficiaries as f64;
        if per_beneficiary <= threshold {
            continue;
        }
        let avg_cost = code.paid / code.claims as f64;
        let excess = (per_beneficiary - threshold) * code.beneficiaries as f64 * avg_cost;
        overpayment += excess;
        high |= stat.median > 0.0 && per_beneficiary > t.high_median_multiple * stat.median;
        flagged.push(json!({
            "code": code.code,
            "claims": code.claims,
            "beneficiaries": code.beneficiaries,
            "claims_per_beneficiary": round4(per_beneficiary),
            "national_median": round4(stat.median),
            "national_p99": round4(stat.p99),
            "excess_paid": excess,
        }));
    }
    if flagged.is_empty() {
        return Ok(None);
    }

    let severity = if high { Severity::High } else { Severity::Medium };
    Ok(Some(Evidence::new(
        signal,
        severity,
        overpayment,
        json!({ "flagged_codes": flagged }),
    )))
}
