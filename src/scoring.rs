//! Composite risk scoring.
//!
//! A provider's surviving evidence collapses into one 0-100 score from
//! three components:
//! - breadth: how many distinct archetypes triggered
//! - severity: severity weight times per-signal risk weight, summed
//! - overpayment ratio: estimated overpayment against lifetime billing

use crate::config::{signal_map, ScoringConfig};
use crate::error::EngineError;
use crate::models::{round_cents, CompositeScore, Evidence, ScoreBreakdown, Severity, SignalId, Tier};
use std::collections::{BTreeSet, HashMap};
use tracing::warn;

pub const BREADTH_CAP: f64 = 30.0;
pub const SEVERITY_CAP: f64 = 40.0;
pub const RATIO_CAP: f64 = 30.0;

#[derive(Debug, Clone)]
pub struct RiskScorer {
    config: ScoringConfig,
    risk_weights: HashMap<SignalId, f64>,
}

impl RiskScorer {
    pub fn new(config: &ScoringConfig) -> Self {
        let overrides = signal_map(&config.risk_weights).unwrap_or_else(|e| {
            warn!("Ignoring risk weight overrides: {}", e);
            Default::default()
        });
        let risk_weights = SignalId::ALL
            .iter()
            .map(|s| (*s, overrides.get(s).copied().unwrap_or(s.default_risk_weight())))
            .collect();
        Self {
            config: config.clone(),
            risk_weights,
        }
    }

    pub fn risk_weight(&self, signal: SignalId) -> f64 {
        self.risk_weights
            .get(&signal)
            .copied()
            .unwrap_or(signal.default_risk_weight())
    }

    fn severity_weight(&self, severity: Severity) -> f64 {
        let w = &self.config.severity_weights;
        match severity {
            Severity::Critical => w.critical,
            Severity::High => w.high,
            Severity::Medium => w.medium,
        }
    }

    /// Scores a non-empty evidence set.
    ///
    /// Components are bounded by the configured caps; a component that
    /// still lands outside its invariant cap means the weighting is
    /// miscalibrated and the run must stop.
    pub fn score(&self, evidence: &[Evidence], lifetime_paid: f64) -> Result<CompositeScore, EngineError> {
        let c = &self.config;

        let distinct: BTreeSet<SignalId> = evidence.iter().map(|e| e.signal).collect();
        let breadth = (c.breadth_points_per_signal * distinct.len() as f64).min(c.breadth_cap);

        let units: f64 = evidence
            .iter()
            .map(|e| self.severity_weight(e.severity) * self.risk_weight(e.signal))
            .sum();
        let severity = (c.severity_points_per_unit * units).min(c.severity_cap);

        let overpayment: f64 = evidence.iter().map(|e| e.overpayment).sum();
        let overpayment_ratio = if lifetime_paid > 0.0 {
            (c.ratio_scale * overpayment / lifetime_paid).min(c.ratio_cap)
        } else {
            0.0
        };

        check("breadth", breadth, BREADTH_CAP)?;
        check("severity", severity, SEVERITY_CAP)?;
        check("overpayment_ratio", overpayment_ratio, RATIO_CAP)?;

        let total = round_cents((breadth + severity + overpayment_ratio).clamp(0.0, 100.0));
        Ok(CompositeScore {
            total,
            tier: Tier::from_score(total),
            breakdown: ScoreBreakdown {
                breadth: round_cents(breadth),
                severity: round_cents(severity),
                overpayment_ratio: round_cents(overpayment_ratio),
            },
        })
    }
}

fn check(component: &'static str, value: f64, cap: f64) -> Result<(), EngineError> {
    if value.is_nan() || value < 0.0 || value > cap {
        return Err(EngineError::ScoringInconsistency {
            component,
            value,
            cap,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn evidence(signal: SignalId, severity: Severity, overpayment: f64) -> Evidence {
        Evidence::new(signal, severity, overpayment, json!({}))
    }

    #[test]
    fn test_excluded_provider_scenario() {
        let scorer = RiskScorer::new(&ScoringConfig::default());
        let ev = vec![evidence(SignalId::ExcludedProvider, Severity::Critical, 50_000.0)];
        let score = scorer.score(&ev, 50_000.0).unwrap();
        // One signal: breadth 6, severity 20 x 1.0 x 1.0, ratio 30 x 1.0.
        assert_eq!(score.breakdown.breadth, 6.0);
        assert_eq!(score.breakdown.severity, 20.0);
        assert_eq!(score.breakdown.overpayment_ratio, 30.0);
        assert_eq!(score.total, 56.0);
        assert_eq!(score.tier, Tier::High);
    }

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(Tier::from_score(74.0), Tier::High);
        assert_eq!(Tier::from_score(74.99), Tier::High);
        assert_eq!(Tier::from_score(75.0), Tier::Critical);
        assert_eq!(Tier::from_score(50.0), Tier::High);
        assert_eq!(Tier::from_score(49.99), Tier::Medium);
        assert_eq!(Tier::from_score(25.0), Tier::Medium);
        assert_eq!(Tier::from_score(24.99), Tier::Low);
    }

    #[test]
    fn test_caps_hold_with_every_signal() {
        let scorer = RiskScorer::new(&ScoringConfig::default());
        let ev: Vec<_> = SignalId::ALL
            .iter()
            .flat_map(|s| {
                (0..5).map(move |_| evidence(*s, Severity::Critical, 1_000_000.0))
            })
            .collect();
        let score = scorer.score(&ev, 10.0).unwrap();
        assert_eq!(score.breakdown.breadth, BREADTH_CAP);
        assert_eq!(score.breakdown.severity, SEVERITY_CAP);
        assert_eq!(score.breakdown.overpayment_ratio, RATIO_CAP);
        assert_eq!(score.total, 100.0);
        assert_eq!(score.tier, Tier::Critical);
    }

    #[test]
    fn test_zero_lifetime_paid_has_no_ratio() {
        let scorer = RiskScorer::new(&ScoringConfig::default());
        let ev = vec![evidence(SignalId::Upcoding, Severity::Medium, 5_000.0)];
        let score = scorer.score(&ev, 0.0).unwrap();
        assert_eq!(score.breakdown.overpayment_ratio, 0.0);
        assert_eq!(score.tier, Tier::Low);
    }

    #[test]
    fn test_miscalibrated_cap_is_fatal() {
        let config = ScoringConfig {
            breadth_cap: 60.0,
            ..ScoringConfig::default()
        };
        let scorer = RiskScorer::new(&config);
        let ev: Vec<_> = SignalId::ALL
            .iter()
            .map(|s| evidence(*s, Severity::Medium, 0.0))
            .collect();
        let err = scorer.score(&ev, 1.0).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(
            err,
            EngineError::ScoringInconsistency { component: "breadth", .. }
        ));
    }

    #[test]
    fn test_negative_weight_is_fatal() {
        let mut config = ScoringConfig::default();
        config.risk_weights.insert("upcoding".to_string(), -1.0);
        let scorer = RiskScorer::new(&config);
        let ev = vec![evidence(SignalId::Upcoding, Severity::High, 0.0)];
        assert!(scorer.score(&ev, 1.0).is_err());
    }

    #[test]
    fn test_risk_weight_override() {
        let mut config = ScoringConfig::default();
        config.risk_weights.insert("8".to_string(), 0.5);
        let scorer = RiskScorer::new(&config);
        assert_eq!(scorer.risk_weight(SignalId::Upcoding), 0.5);
        assert_eq!(scorer.risk_weight(SignalId::BustOut), 0.9);
    }
}
