//! Cross-signal correlation over the flagged population.

use crate::models::{CorrelationSummary, PairCount, PriorityCandidate, ProviderCase, SignalId};
use std::collections::BTreeMap;

/// Minimum distinct signals for a priority review candidate.
pub const PRIORITY_MIN_SIGNALS: usize = 3;

/// Builds the population-level summary from every flagged case.
///
/// Output is independent of iteration order: pairs are sorted by count
/// descending then by signal identifiers, candidates by score descending
/// then NPI ascending.
pub fn correlate(cases: &BTreeMap<String, ProviderCase>) -> CorrelationSummary {
    let mut histogram: BTreeMap<usize, usize> = BTreeMap::new();
    let mut frequency: BTreeMap<SignalId, usize> = BTreeMap::new();
    let mut pair_counts: BTreeMap<(SignalId, SignalId), usize> = BTreeMap::new();
    let mut candidates = Vec::new();

    for case in cases.values() {
        let signals = case.distinct_signals();
        if signals.is_empty() {
            continue;
        }
        *histogram.entry(signals.len()).or_default() += 1;
        for (i, a) in signals.iter().enumerate() {
            *frequency.entry(*a).or_default() += 1;
            // distinct_signals is sorted, so (a, b) is already canonical.
            for b in &signals[i + 1..] {
                *pair_counts.entry((*a, *b)).or_default() += 1;
            }
        }
        if signals.len() >= PRIORITY_MIN_SIGNALS {
            candidates.push(PriorityCandidate {
                npi: case.provider.npi.clone(),
                name: case.provider.name.clone(),
                distinct_signals: signals.len(),
                score: case.score.total,
                tier: case.score.tier,
            });
        }
    }

    let mut pairs: Vec<PairCount> = pair_counts
        .into_iter()
        .map(|((first, second), providers)| PairCount {
            first,
            second,
            providers,
        })
        .collect();
    pairs.sort_by(|a, b| {
        b.providers
            .cmp(&a.providers)
            .then(a.first.cmp(&b.first))
            .then(a.second.cmp(&b.second))
    });

    candidates.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.npi.cmp(&b.npi)));

    CorrelationSummary {
        flagged_providers: histogram.values().sum(),
        signal_count_histogram: histogram,
        signal_frequency: frequency,
        pairs,
        priority_candidates: candidates,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CompositeScore, EntityKind, Evidence, Provider, ScoreBreakdown, Severity, Tier,
    };
    use serde_json::json;

    fn case(npi: &str, signals: &[SignalId], total: f64) -> ProviderCase {
        ProviderCase {
            provider: Provider {
                npi: npi.to_string(),
                name: format!("Provider {npi}"),
                kind: EntityKind::Organization,
                taxonomy: "332B00000X".to_string(),
                state: "MN".to_string(),
                zip: "55401".to_string(),
                address: None,
                registration_date: None,
                officials: Vec::new(),
            },
            total_paid: 100_000.0,
            total_claims: 1_000,
            total_beneficiaries: 100,
            evidence: signals
                .iter()
                .map(|s| Evidence::new(*s, Severity::High, 1_000.0, json!({})))
                .collect(),
            score: CompositeScore {
                total,
                tier: Tier::from_score(total),
                breakdown: ScoreBreakdown::default(),
            },
            estimated_overpayment: 1_000.0 * signals.len() as f64,
            claim_types: Vec::new(),
            next_steps: Vec::new(),
            narrative: String::new(),
        }
    }

    fn population() -> BTreeMap<String, ProviderCase> {
        use SignalId::*;
        [
            case("a", &[ExcludedProvider, BustOut, Upcoding], 80.0),
            case("b", &[BustOut, Upcoding], 40.0),
            case("c", &[Upcoding], 20.0),
            case("d", &[Upcoding, BustOut, SharedOfficial, AddressCluster], 80.0),
            case("e", &[Upcoding, Upcoding, BustOut, RateAnomaly], 90.0),
        ]
        .into_iter()
        .map(|c| (c.provider.npi.clone(), c))
        .collect()
    }

    #[test]
    fn test_histogram_and_frequency() {
        let summary = correlate(&population());
        assert_eq!(summary.flagged_providers, 5);
        assert_eq!(summary.signal_count_histogram[&1], 1);
        assert_eq!(summary.signal_count_histogram[&2], 1);
        assert_eq!(summary.signal_count_histogram[&3], 2);
        assert_eq!(summary.signal_count_histogram[&4], 1);
        // Repeated evidence for one signal counts once per provider.
        assert_eq!(summary.signal_frequency[&SignalId::Upcoding], 5);
    }

    #[test]
    fn test_pair_counts_are_symmetric_and_bounded() {
        let summary = correlate(&population());
        for a in SignalId::ALL {
            for b in SignalId::ALL {
                if a == b {
                    continue;
                }
                let count = summary.pair_count(a, b);
                assert_eq!(count, summary.pair_count(b, a));
                let fa = summary.signal_frequency.get(&a).copied().unwrap_or(0);
                let fb = summary.signal_frequency.get(&b).copied().unwrap_or(0);
                assert!(count <= fa.min(fb));
            }
        }
        assert_eq!(summary.pair_count(SignalId::BustOut, SignalId::Upcoding), 4);
        assert_eq!(summary.pairs[0].providers, 4);
    }

    #[test]
    fn test_priority_candidates_order() {
        let summary = correlate(&population());
        let order: Vec<_> = summary
            .priority_candidates
            .iter()
            .map(|c| c.npi.as_str())
            .collect();
        // Score descending, ties broken by NPI ascending.
        assert_eq!(order, vec!["e", "a", "d"]);
    }

    #[test]
    fn test_empty_population() {
        let summary = correlate(&BTreeMap::new());
        assert_eq!(summary.flagged_providers, 0);
        assert!(summary.pairs.is_empty());
        assert!(summary.priority_candidates.is_empty());
    }
}
