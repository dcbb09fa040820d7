//! Temporal context adjuster.
//!
//! Growth and volume anomalies during the pandemic-era utilization shift
//! are weaker evidence than the same shape in ordinary years. Evidence for
//! the trajectory signals with a triggering month inside the configured
//! interval is downgraded one severity tier and annotated.

use crate::config::TemporalConfig;
use crate::models::{Evidence, MonthWindow};

pub const ADJUSTMENT_NOTE: &str = "pandemic-era adjustment applied";

#[derive(Debug, Clone)]
pub struct TemporalAdjuster {
    enabled: bool,
    window: MonthWindow,
}

impl TemporalAdjuster {
    pub fn new(config: &TemporalConfig) -> Self {
        Self {
            enabled: config.enabled,
            window: MonthWindow::new(config.window_start, config.window_end),
        }
    }

    /// Whether this record falls under the adjustment.
    pub fn applies_to(&self, evidence: &Evidence) -> bool {
        self.enabled
            && evidence.signal.is_temporally_adjustable()
            && evidence.active_during(&self.window)
    }

    /// Returns the adjusted copy of a record. Records that are already
    /// adjusted, or that fall outside the interval, come back unchanged.
    pub fn adjust(&self, evidence: &Evidence) -> Evidence {
        let mut adjusted = evidence.clone();
        if evidence.context_adjusted || !self.applies_to(evidence) {
            return adjusted;
        }
        adjusted.severity = evidence.severity.downgrade();
        adjusted.context_adjusted = true;
        adjusted.annotation = Some(match &evidence.annotation {
            Some(existing) => format!("{existing}; {ADJUSTMENT_NOTE}"),
            None => ADJUSTMENT_NOTE.to_string(),
        });
        adjusted
    }

    pub fn adjust_all(&self, evidence: Vec<Evidence>) -> Vec<Evidence> {
        evidence.iter().map(|e| self.adjust(e)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregates::fixtures::{ym, SnapshotBuilder};
    use crate::models::{Severity, SignalId};
    use crate::signals::testing::Harness;
    use serde_json::json;

    fn evidence(signal: SignalId, severity: Severity, start: (i32, u32), end: (i32, u32)) -> Evidence {
        Evidence::new(signal, severity, 1_000.0, json!({}))
            .with_window(Some(MonthWindow::new(ym(start.0, start.1), ym(end.0, end.1))))
    }

    #[test]
    fn test_downgrade_inside_window() {
        let adjuster = TemporalAdjuster::new(&TemporalConfig::default());
        let raw = evidence(SignalId::RapidEscalation, Severity::High, (2020, 4), (2020, 9));
        let adjusted = adjuster.adjust(&raw);
        assert_eq!(adjusted.severity, Severity::Medium);
        assert!(adjusted.context_adjusted);
        assert_eq!(adjusted.annotation.as_deref(), Some(ADJUSTMENT_NOTE));
        // The raw record is untouched.
        assert_eq!(raw.severity, Severity::High);
        assert!(!raw.context_adjusted);
    }

    #[test]
    fn test_unchanged_outside_window() {
        let adjuster = TemporalAdjuster::new(&TemporalConfig::default());
        let raw = evidence(SignalId::RapidEscalation, Severity::High, (2023, 4), (2023, 9));
        let adjusted = adjuster.adjust(&raw);
        assert_eq!(adjusted.severity, Severity::High);
        assert!(adjusted.annotation.is_none());
    }

    #[test]
    fn test_months_straddling_the_interval_are_not_adjusted() {
        let adjuster = TemporalAdjuster::new(&TemporalConfig::default());
        let raw = Evidence::new(SignalId::WorkforceImpossibility, Severity::High, 1_000.0, json!({}))
            .with_months(vec![ym(2019, 6), ym(2022, 6)]);
        let adjusted = adjuster.adjust(&raw);
        assert_eq!(adjusted, raw);
        assert!(!adjusted.context_adjusted);
    }

    #[test]
    fn test_workforce_months_on_both_sides_keep_severity() {
        // Capacity is 1056 claims a month; 2020-06 stays under it.
        let store = SnapshotBuilder::new()
            .individual("1", "103T00000X", "CA")
            .month("1", ym(2019, 6), 150_000.0, 3_000, 100)
            .month("1", ym(2020, 6), 25_000.0, 500, 100)
            .month("1", ym(2022, 6), 150_000.0, 3_000, 100)
            .build();
        let harness = Harness::new(store);
        let raw = harness.run(SignalId::WorkforceImpossibility, "1");
        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0].months, vec![ym(2019, 6), ym(2022, 6)]);

        let adjuster = TemporalAdjuster::new(&TemporalConfig::default());
        let adjusted = adjuster.adjust(&raw[0]);
        assert_eq!(adjusted.severity, Severity::High);
        assert!(adjusted.annotation.is_none());
    }

    #[test]
    fn test_partial_overlap_counts() {
        let adjuster = TemporalAdjuster::new(&TemporalConfig::default());
        let raw = evidence(SignalId::BustOut, Severity::Critical, (2021, 10), (2022, 6));
        assert_eq!(adjuster.adjust(&raw).severity, Severity::High);
    }

    #[test]
    fn test_adjustment_is_idempotent() {
        let adjuster = TemporalAdjuster::new(&TemporalConfig::default());
        let raw = evidence(SignalId::BustOut, Severity::Critical, (2020, 6), (2020, 12));
        let once = adjuster.adjust(&raw);
        let twice = adjuster.adjust(&once);
        assert_eq!(once, twice);
        assert_eq!(twice.severity, Severity::High);
    }

    #[test]
    fn test_only_trajectory_signals_adjust() {
        let adjuster = TemporalAdjuster::new(&TemporalConfig::default());
        for signal in SignalId::ALL {
            let raw = evidence(signal, Severity::High, (2020, 6), (2020, 12));
            let adjusted = adjuster.adjust(&raw);
            let expected = matches!(
                signal,
                SignalId::RapidEscalation | SignalId::WorkforceImpossibility | SignalId::BustOut
            );
            assert_eq!(adjusted.context_adjusted, expected, "{}", signal);
        }
    }

    #[test]
    fn test_medium_stays_medium_and_disabled_is_noop() {
        let adjuster = TemporalAdjuster::new(&TemporalConfig::default());
        let raw = evidence(SignalId::WorkforceImpossibility, Severity::Medium, (2020, 6), (2020, 6));
        assert_eq!(adjuster.adjust(&raw).severity, Severity::Medium);

        let disabled = TemporalAdjuster::new(&TemporalConfig {
            enabled: false,
            ..TemporalConfig::default()
        });
        let raw = evidence(SignalId::BustOut, Severity::Critical, (2020, 6), (2020, 12));
        assert_eq!(disabled.adjust(&raw), raw);
    }

    #[test]
    fn test_annotation_is_appended() {
        let adjuster = TemporalAdjuster::new(&TemporalConfig::default());
        let mut raw = evidence(SignalId::BustOut, Severity::High, (2020, 6), (2020, 12));
        raw.annotation = Some("elevated bar x2 applied".to_string());
        let adjusted = adjuster.adjust(&raw);
        assert_eq!(
            adjusted.annotation.as_deref(),
            Some("elevated bar x2 applied; pandemic-era adjustment applied")
        );
    }
}
