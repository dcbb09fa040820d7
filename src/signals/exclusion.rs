//! Signal 1: billing by providers on the federal exclusion list.

use super::{EvalContext, SignalResult};
use crate::models::{Evidence, MonthWindow, Provider, Severity, SignalId};
use serde_json::json;

/// Every dollar paid between the exclusion date and reinstatement (if any)
/// is an overpayment.
pub fn excluded_provider(ctx: &EvalContext<'_>, provider: &Provider) -> SignalResult {
    let Some(exclusion) = ctx.store.exclusion(&provider.npi) else {
        return Ok(None);
    };
    let monthly = ctx.store.monthly(&provider.npi)?;

    let post: Vec<_> = monthly.iter().filter(|m| exclusion.covers(m.month)).collect();
    let paid: f64 = post.iter().map(|m| m.paid).sum();
    if paid <= 0.0 {
        return Ok(None);
    }
    let claims: u64 = post.iter().map(|m| m.claims).sum();

    let detail = json!({
        "exclusion_date": exclusion.exclusion_date,
        "reinstatement_date": exclusion.reinstatement_date,
        "exclusion_type": exclusion.exclusion_type,
        "post_exclusion_paid": paid,
        "post_exclusion_claims": claims,
        "billing_months": post.len(),
    });

    Ok(Some(
        Evidence::new(SignalId::ExcludedProvider, Severity::Critical, paid, detail)
            .with_window(MonthWindow::spanning(post.iter().map(|m| m.month))),
    ))
}

#[cfg(test)]
mod tests {
    use crate::aggregates::fixtures::{ym, SnapshotBuilder};
    use crate::models::{Severity, SignalId};
    use crate::signals::testing::Harness;
    use chrono::NaiveDate;

    #[test]
    fn test_post_exclusion_billing_is_full_overpayment() {
        let store = SnapshotBuilder::new()
            .individual("1", "207Q00000X", "NY")
            .month("1", ym(2021, 1), 8_000.0, 40, 10)
            .month("1", ym(2021, 6), 20_000.0, 100, 20)
            .month("1", ym(2021, 7), 30_000.0, 150, 25)
            .exclusion("1", NaiveDate::from_ymd_opt(2021, 6, 10).unwrap(), None)
            .build();
        let harness = Harness::new(store);

        let evidence = harness.run(SignalId::ExcludedProvider, "1");
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].severity, Severity::Critical);
        assert_eq!(evidence[0].overpayment, 50_000.0);
        assert_eq!(evidence[0].window.unwrap().start, ym(2021, 6));
        assert!(evidence[0].statute.contains("1001.1901"));
    }

    #[test]
    fn test_reinstated_provider_only_counts_excluded_months() {
        let store = SnapshotBuilder::new()
            .individual("1", "207Q00000X", "NY")
            .month("1", ym(2020, 5), 1_000.0, 5, 5)
            .month("1", ym(2020, 9), 9_000.0, 5, 5)
            .exclusion(
                "1",
                NaiveDate::from_ymd_opt(2020, 4, 1).unwrap(),
                NaiveDate::from_ymd_opt(2020, 8, 1),
            )
            .build();
        let harness = Harness::new(store);

        let evidence = harness.run(SignalId::ExcludedProvider, "1");
        assert_eq!(evidence[0].overpayment, 1_000.0);
    }

    #[test]
    fn test_billing_before_exclusion_does_not_trigger() {
        let store = SnapshotBuilder::new()
            .individual("1", "207Q00000X", "NY")
            .month("1", ym(2019, 5), 1_000.0, 5, 5)
            .exclusion("1", NaiveDate::from_ymd_opt(2020, 4, 1).unwrap(), None)
            .individual("2", "207Q00000X", "NY")
            .month("2", ym(2021, 5), 1_000.0, 5, 5)
            .build();
        let harness = Harness::new(store);

        assert!(harness.run(SignalId::ExcludedProvider, "1").is_empty());
        assert!(harness.run(SignalId::ExcludedProvider, "2").is_empty());
    }
}
