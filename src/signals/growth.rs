//! Billing-trajectory signals read from the monthly series.
//!
//! Signal 3 looks for newly enrolled entities whose billing explodes in
//! their first year. Signal 18 looks for the bust-out shape: a steep ramp
//! into a peak followed by a collapse.

use super::{round4, EvalContext, SignalResult};
use crate::aggregates::{first_of_month, months_between, paid_series};
use crate::models::{Evidence, MonthWindow, Provider, Severity, SignalId};
use serde_json::json;

fn growth_pct(current: f64, base: f64) -> f64 {
    (current - base) / base * 100.0
}

/// Signal 3.
pub fn rapid_escalation(ctx: &EvalContext<'_>, provider: &Provider) -> SignalResult {
    let signal = SignalId::RapidEscalation;
    let t = &ctx.thresholds.rapid_escalation;
    let Some(registered) = provider.registration_date else {
        return Ok(None);
    };
    let monthly = ctx.store.monthly(&provider.npi)?;
    let series = paid_series(monthly, None);

    let Some(first) = series.iter().position(|(_, paid)| *paid > 0.0) else {
        return Ok(None);
    };
    let gap = months_between(first_of_month(registered), series[first].0);
    if gap > t.max_registration_gap_months {
        return Ok(None);
    }

    let growth_trigger = ctx.scaled(signal, t.growth_pct);
    let end = (first + t.observation_months.max(0) as usize).min(series.len());
    let mut anomalous = Vec::new();
    for i in (first + 3)..end {
        let base = series[i - 3].1;
        if base <= t.min_baseline_paid {
            continue;
        }
        let growth = growth_pct(series[i].1, base);
        if growth > growth_trigger {
            anomalous.push((series[i].0, series[i].1, growth));
        }
    }
    if anomalous.len() < t.min_anomalous_months {
        return Ok(None);
    }

    let overpayment: f64 = anomalous.iter().map(|(_, paid, _)| paid).sum();
    let peak_growth = anomalous
        .iter()
        .map(|(_, _, growth)| *growth)
        .fold(f64::MIN, f64::max);
    let severity = if peak_growth > t.high_growth_pct {
        Severity::High
    } else {
        Severity::Medium
    };

    let months: Vec<_> = anomalous
        .iter()
        .map(|(month, paid, growth)| {
            json!({ "month": month, "paid": paid, "growth_pct": round4(*growth) })
        })
        .collect();
    let detail = json!({
        "registration_date": registered,
        "first_billing_month": series[first].0,
        "months_to_first_billing": gap,
        "anomalous_months": months,
        "peak_growth_pct": round4(peak_growth),
    });

    Ok(Some(
        Evidence::new(signal, severity, overpayment, detail)
            .with_months(anomalous.iter().map(|(m, _, _)| *m).collect()),
    ))
}

/// Signal 18.
pub fn bust_out(ctx: &EvalContext<'_>, provider: &Provider) -> SignalResult {
    let signal = SignalId::BustOut;
    let t = &ctx.thresholds.bust_out;
    let monthly = ctx.store.monthly(&provider.npi)?;
    // Extend to the last month in the snapshot so that a provider who
    // stopped billing shows its collapse as zero months.
    let series = paid_series(monthly, ctx.store.last_month());

    // First occurrence of the maximum.
    let Some((peak_idx, peak)) = series
        .iter()
        .enumerate()
        .map(|(i, (_, paid))| (i, *paid))
        .fold(None::<(usize, f64)>, |best, (i, paid)| match best {
            Some((_, b)) if b >= paid => best,
            _ => Some((i, paid)),
        })
    else {
        return Ok(None);
    };

    let ramp = t.ramp_months.max(1) as usize;
    if peak < ctx.scaled(signal, t.min_peak_paid) || peak_idx < ramp {
        return Ok(None);
    }
    let base = series[peak_idx - ramp].1;
    if base <= 0.0 {
        return Ok(None);
    }
    let growth = growth_pct(peak, base);
    if growth <= ctx.scaled(signal, t.growth_pct) {
        return Ok(None);
    }

    let after_end = (peak_idx + t.collapse_months.max(1) as usize).min(series.len() - 1);
    let Some((collapse_month, collapse_paid)) = series[peak_idx + 1..=after_end.max(peak_idx)]
        .iter()
        .copied()
        .fold(None::<(chrono::NaiveDate, f64)>, |low, (m, p)| match low {
            Some((_, l)) if l <= p => low,
            _ => Some((m, p)),
        })
    else {
        return Ok(None);
    };
    let collapse_ratio = collapse_paid / peak;
    if collapse_ratio >= ctx.minimum(signal, t.collapse_share) {
        return Ok(None);
    }

    let ramp_months = &series[peak_idx + 1 - ramp..=peak_idx];
    let overpayment: f64 = ramp_months.iter().map(|(_, paid)| paid).sum();
    let severity = if growth >= t.critical_growth_pct && collapse_ratio < t.critical_collapse_share
    {
        Severity::Critical
    } else {
        Severity::High
    };

    let detail = json!({
        "peak_month": series[peak_idx].0,
        "peak_paid": peak,
        "baseline_paid": base,
        "growth_pct": round4(growth),
        "collapse_month": collapse_month,
        "collapse_paid": collapse_paid,
        "collapse_ratio": round4(collapse_ratio),
        "ramp_paid": overpayment,
    });

    Ok(Some(
        Evidence::new(signal, severity, overpayment, detail)
            .with_window(Some(MonthWindow::new(ramp_months[0].0, collapse_month))),
    ))
}
