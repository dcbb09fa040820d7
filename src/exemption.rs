//! Entity exemption filter.
//!
//! Some legitimate entities trip signals structurally: safety-net clinics
//! bill unusual volumes, academic medical centers share officials across
//! dozens of NPIs. The filter classifies each provider as exempt (all
//! evidence suppressed), high-threshold (evidence re-evaluated against an
//! elevated bar) or unclassified (passed through).

use crate::config::{signal_map, ExemptionConfig};
use crate::error::EngineError;
use crate::models::{Evidence, Provider, SignalId};
use crate::signals::{self, EvalContext};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

/// Classification of a provider under the exemption tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Exempt,
    HighThreshold,
    Unclassified,
}

/// Bar multipliers for high-threshold entities.
#[derive(Debug, Clone)]
pub struct ElevatedBars {
    default: f64,
    per_signal: HashMap<SignalId, f64>,
}

impl ElevatedBars {
    /// The same multiplier for every signal.
    pub fn uniform(bar: f64) -> Self {
        Self {
            default: bar.max(1.0),
            per_signal: HashMap::new(),
        }
    }

    pub fn from_config(config: &ExemptionConfig) -> Self {
        let mut bars = Self::uniform(config.default_elevated_bar);
        match signal_map(&config.elevated_bars) {
            Ok(map) => {
                bars.per_signal = map.into_iter().map(|(s, bar)| (s, bar.max(1.0))).collect();
            }
            Err(e) => warn!("Ignoring per-signal elevated bars: {}", e),
        }
        bars
    }

    pub fn bar_for(&self, signal: SignalId) -> f64 {
        self.per_signal.get(&signal).copied().unwrap_or(self.default)
    }
}

/// One side of the classification tables.
#[derive(Debug, Default)]
struct Rules {
    npis: BTreeSet<String>,
    taxonomies: Vec<String>,
    patterns: Vec<String>,
}

impl Rules {
    fn new(npis: &[String], taxonomies: &[String], patterns: &[String]) -> Self {
        let clean = |s: &String| s.trim().to_string();
        Self {
            npis: npis.iter().map(clean).filter(|s| !s.is_empty()).collect(),
            taxonomies: taxonomies
                .iter()
                .map(|t| t.trim().to_uppercase())
                .filter(|t| !t.is_empty())
                .collect(),
            patterns: patterns
                .iter()
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// The rule that matched, for conflict reporting.
    fn matches(&self, provider: &Provider) -> Option<String> {
        if self.npis.contains(&provider.npi) {
            return Some(format!("npi {}", provider.npi));
        }
        let taxonomy = provider.taxonomy.to_uppercase();
        if let Some(t) = self.taxonomies.iter().find(|t| taxonomy.starts_with(t.as_str())) {
            return Some(format!("taxonomy {t}"));
        }
        let name = provider.name.to_lowercase();
        self.patterns
            .iter()
            .find(|p| name.contains(p.as_str()))
            .map(|p| format!("name pattern '{p}'"))
    }
}

/// Classifies providers and applies the classification to their evidence.
#[derive(Debug)]
pub struct ExemptionFilter {
    exempt: Rules,
    high_threshold: Rules,
    bars: ElevatedBars,
}

impl ExemptionFilter {
    /// Builds the filter, rejecting tables that list the same NPI,
    /// taxonomy or name pattern under both classes.
    pub fn new(config: &ExemptionConfig) -> Result<Self, EngineError> {
        let exempt = Rules::new(
            &config.exempt_npis,
            &config.exempt_taxonomies,
            &config.exempt_name_patterns,
        );
        let high_threshold = Rules::new(
            &config.high_threshold_npis,
            &config.high_threshold_taxonomies,
            &config.high_threshold_name_patterns,
        );

        if let Some(npi) = exempt.npis.intersection(&high_threshold.npis).next() {
            return Err(conflict(npi, "npi appears in both tables"));
        }
        if let Some(t) = exempt
            .taxonomies
            .iter()
            .find(|t| high_threshold.taxonomies.contains(t))
        {
            return Err(conflict(t, "taxonomy appears in both tables"));
        }
        if let Some(p) = exempt
            .patterns
            .iter()
            .find(|p| high_threshold.patterns.contains(p))
        {
            return Err(conflict(p, "name pattern appears in both tables"));
        }

        Ok(Self {
            exempt,
            high_threshold,
            bars: ElevatedBars::from_config(config),
        })
    }

    /// A provider matched by both classes through different rules is fatal.
    pub fn classify(&self, provider: &Provider) -> Result<Classification, EngineError> {
        match (
            self.exempt.matches(provider),
            self.high_threshold.matches(provider),
        ) {
            (Some(a), Some(b)) => Err(conflict(
                &provider.npi,
                &format!("matched {a} and {b}"),
            )),
            (Some(_), None) => Ok(Classification::Exempt),
            (None, Some(_)) => Ok(Classification::HighThreshold),
            (None, None) => Ok(Classification::Unclassified),
        }
    }

    /// Applies a classification to a provider's evidence.
    ///
    /// High-threshold providers have each signal that triggered evaluated
    /// again with the elevated bar; only signals that still trigger survive,
    /// carrying the recomputed record.
    pub fn apply(
        &self,
        class: Classification,
        ctx: &EvalContext<'_>,
        provider: &Provider,
        evidence: Vec<Evidence>,
    ) -> Result<Vec<Evidence>, EngineError> {
        match class {
            Classification::Unclassified => Ok(evidence),
            Classification::Exempt => {
                if !evidence.is_empty() {
                    debug!(
                        "Suppressed {} evidence records for exempt provider {}",
                        evidence.len(),
                        provider.npi
                    );
                }
                Ok(Vec::new())
            }
            Classification::HighThreshold => {
                let triggered: BTreeSet<SignalId> = evidence.iter().map(|e| e.signal).collect();
                let elevated = ctx.elevated(&self.bars);
                let mut survivors = Vec::new();
                for signal in triggered {
                    match signals::evaluate(signal, &elevated, provider) {
                        Ok(records) => {
                            let bar = self.bars.bar_for(signal);
                            survivors.extend(records.into_iter().map(|mut e| {
                                e.annotation = Some(format!("elevated bar x{bar} applied"));
                                e
                            }));
                        }
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => debug!("{} dropped under elevated bar: {}", signal, e),
                    }
                }
                Ok(survivors)
            }
        }
    }
}

fn conflict(subject: &str, detail: &str) -> EngineError {
    EngineError::ConflictingClassification {
        subject: subject.to_string(),
        detail: detail.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregates::fixtures::{ym, SnapshotBuilder};
    use crate::signals::testing::Harness;

    fn config() -> ExemptionConfig {
        ExemptionConfig {
            exempt_npis: vec!["100".to_string()],
            exempt_taxonomies: vec!["2084".to_string()],
            exempt_name_patterns: vec!["University Hospital".to_string()],
            high_threshold_npis: vec!["200".to_string()],
            ..ExemptionConfig::default()
        }
    }

    fn provider(npi: &str, name: &str, taxonomy: &str) -> Provider {
        let store = SnapshotBuilder::new()
            .organization(npi, name, taxonomy, "MN")
            .build();
        store.provider(npi).unwrap().clone()
    }

    #[test]
    fn test_classification_rules() {
        let filter = ExemptionFilter::new(&config()).unwrap();

        let by_npi = provider("100", "Anything", "332B00000X");
        assert_eq!(filter.classify(&by_npi).unwrap(), Classification::Exempt);

        let by_prefix = provider("101", "Clinic", "2084P0800X");
        assert_eq!(filter.classify(&by_prefix).unwrap(), Classification::Exempt);

        let by_name = provider("102", "STATE UNIVERSITY HOSPITAL SYSTEM", "282N00000X");
        assert_eq!(filter.classify(&by_name).unwrap(), Classification::Exempt);

        let fqhc = provider("103", "Community Clinic", "261QF0400X");
        assert_eq!(filter.classify(&fqhc).unwrap(), Classification::HighThreshold);

        let listed = provider("200", "Other", "332B00000X");
        assert_eq!(filter.classify(&listed).unwrap(), Classification::HighThreshold);

        let plain = provider("300", "Plain LLC", "332B00000X");
        assert_eq!(filter.classify(&plain).unwrap(), Classification::Unclassified);
    }

    #[test]
    fn test_conflicting_tables_are_rejected() {
        let mut cfg = config();
        cfg.high_threshold_npis.push("100".to_string());
        let err = ExemptionFilter::new(&cfg).unwrap_err();
        assert!(err.is_fatal());

        let mut cfg = config();
        cfg.high_threshold_taxonomies.push("2084".to_string());
        assert!(ExemptionFilter::new(&cfg).is_err());
    }

    #[test]
    fn test_provider_matching_both_classes_is_fatal() {
        let filter = ExemptionFilter::new(&config()).unwrap();
        // Exempt by name, high-threshold by FQHC taxonomy.
        let both = provider("400", "University Hospital FQHC", "261QF0400X");
        let err = filter.classify(&both).unwrap_err();
        assert!(matches!(err, EngineError::ConflictingClassification { .. }));
    }

    #[test]
    fn test_exempt_provider_has_no_evidence() {
        let store = SnapshotBuilder::new()
            .organization("100", "Exempt Co", "332B00000X", "MN")
            .totals("100", 50_000.0, 500, 100)
            .exclusion("100", ym(2022, 1), None)
            .month("100", ym(2023, 1), 50_000.0, 500, 100)
            .build();
        let harness = Harness::new(store);
        let provider = harness.store.provider("100").unwrap().clone();
        let evidence = harness.run(SignalId::ExcludedProvider, "100");
        assert_eq!(evidence.len(), 1);

        let filter = ExemptionFilter::new(&config()).unwrap();
        let class = filter.classify(&provider).unwrap();
        let kept = filter.apply(class, &harness.ctx(), &provider, evidence).unwrap();
        assert!(kept.is_empty());
    }

    #[test]
    fn test_high_threshold_recomputes_with_elevated_bar() {
        // One month at 3000 claims: over the 6/hour ceiling, under 12/hour it
        // still triggers with a smaller excess. The second provider at 2000
        // claims only triggers at the standard bar.
        let store = SnapshotBuilder::new()
            .individual("200", "103T00000X", "CA")
            .month("200", ym(2023, 2), 150_000.0, 3_000, 100)
            .individual("201", "103T00000X", "CA")
            .month("201", ym(2023, 2), 100_000.0, 2_000, 100)
            .build();
        let harness = Harness::new(store);
        let mut cfg = config();
        cfg.high_threshold_npis.push("201".to_string());
        let filter = ExemptionFilter::new(&cfg).unwrap();

        let strong = harness.store.provider("200").unwrap().clone();
        let raw = harness.run(SignalId::WorkforceImpossibility, "200");
        let raw_overpayment = raw[0].overpayment;
        let kept = filter
            .apply(Classification::HighThreshold, &harness.ctx(), &strong, raw)
            .unwrap();
        assert_eq!(kept.len(), 1);
        assert!(kept[0].overpayment < raw_overpayment);
        assert!(kept[0].annotation.as_deref().unwrap().contains("elevated bar"));

        let weak = harness.store.provider("201").unwrap().clone();
        let raw = harness.run(SignalId::WorkforceImpossibility, "201");
        assert_eq!(raw.len(), 1);
        let kept = filter
            .apply(Classification::HighThreshold, &harness.ctx(), &weak, raw)
            .unwrap();
        assert!(kept.is_empty());
    }

    #[test]
    fn test_per_signal_bars() {
        let mut cfg = ExemptionConfig::default();
        cfg.elevated_bars.insert("upcoding".to_string(), 3.0);
        cfg.elevated_bars.insert("18".to_string(), 1.5);
        let bars = ElevatedBars::from_config(&cfg);
        assert_eq!(bars.bar_for(SignalId::Upcoding), 3.0);
        assert_eq!(bars.bar_for(SignalId::BustOut), 1.5);
        assert_eq!(bars.bar_for(SignalId::SharedOfficial), 2.0);
    }
}
