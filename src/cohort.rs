//! Peer-group statistics computed once before evaluation.
//!
//! Every percentile-based signal reads from a [`CohortTable`] keyed by its
//! peer group (taxonomy and state, taxonomy nationally, HCPCS code, or the
//! whole nation). Groups smaller than the configured minimum never get a
//! statistic; looking one up yields [`EngineError::InvalidCohort`].

use crate::aggregates::{month_index, AggregateStore, CodeTotals};
use crate::error::EngineError;
use crate::models::EntityKind;
use crate::signals::thresholds::Thresholds;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// Summary statistics of one metric over a peer group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CohortStat {
    pub size: usize,
    pub median: f64,
    pub p10: f64,
    pub p90: f64,
    pub p99: f64,
}

impl CohortStat {
    /// Computes the statistic; None for an empty sample.
    pub fn from_values(mut values: Vec<f64>) -> Option<Self> {
        values.retain(|v| v.is_finite());
        values.sort_by(|a, b| a.total_cmp(b));
        Some(Self {
            size: values.len(),
            median: percentile(&values, 0.5)?,
            p10: percentile(&values, 0.1)?,
            p90: percentile(&values, 0.9)?,
            p99: percentile(&values, 0.99)?,
        })
    }
}

/// Continuous percentile of a sorted slice, interpolating linearly between
/// the closest ranks.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = p.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Statistics for one metric, keyed by peer group.
#[derive(Debug, Clone, Default)]
pub struct CohortTable {
    name: &'static str,
    minimum: usize,
    sizes: HashMap<String, usize>,
    stats: HashMap<String, CohortStat>,
}

impl CohortTable {
    /// Groups `(key, value)` samples and computes statistics for every group
    /// with at least `minimum` members.
    pub fn build<I>(name: &'static str, minimum: usize, samples: I) -> Self
    where
        I: IntoIterator<Item = (String, f64)>,
    {
        let mut groups: HashMap<String, Vec<f64>> = HashMap::new();
        for (key, value) in samples {
            groups.entry(key).or_default().push(value);
        }

        let mut table = Self {
            name,
            minimum,
            ..Self::default()
        };
        for (key, values) in groups {
            table.sizes.insert(key.clone(), values.len());
            if values.len() >= minimum {
                if let Some(stat) = CohortStat::from_values(values) {
                    table.stats.insert(key, stat);
                }
            }
        }

        debug!(
            "Cohort table {}: {} groups, {} viable",
            name,
            table.sizes.len(),
            table.stats.len()
        );
        table
    }

    pub fn get(&self, key: &str) -> Result<&CohortStat, EngineError> {
        self.stats.get(key).ok_or_else(|| EngineError::InvalidCohort {
            cohort: format!("{}[{}]", self.name, key),
            size: self.sizes.get(key).copied().unwrap_or(0),
            minimum: self.minimum,
        })
    }

    pub fn viable_groups(&self) -> usize {
        self.stats.len()
    }
}

/// Key for the taxonomy-and-state peer group.
pub fn taxonomy_state_key(taxonomy: &str, state: &str) -> String {
    format!("{taxonomy}/{state}")
}

/// Key for the single national peer group.
pub const NATIONAL: &str = "national";

/// All cohort tables used by the peer-comparison signals.
#[derive(Debug, Default)]
pub struct CohortTables {
    /// Lifetime paid by taxonomy and state.
    pub lifetime_paid: CohortTable,
    /// High-complexity share of E&M claims by taxonomy and state.
    pub high_complexity_share: CohortTable,
    /// Peak distinct servicing states per month, national.
    pub concurrent_states: CohortTable,
    /// Dominant-code share of paid by taxonomy, national.
    pub dominant_share: CohortTable,
    /// Paid per claim by HCPCS code, national.
    pub code_rate: CohortTable,
    /// Claims per beneficiary by HCPCS code, national.
    pub claims_per_beneficiary: CohortTable,
}

impl CohortTables {
    pub fn build(store: &AggregateStore, thresholds: &Thresholds) -> Self {
        let minimum = thresholds.min_cohort_size;

        let lifetime_paid = CohortTable::build(
            "lifetime_paid",
            minimum,
            store.providers().iter().filter_map(|p| {
                let totals = store.totals(&p.npi).ok()?;
                Some((taxonomy_state_key(&p.taxonomy, &p.state), totals.paid))
            }),
        );

        let high_complexity_share = CohortTable::build(
            "high_complexity_share",
            minimum,
            store.providers().iter().filter_map(|p| {
                let codes = store.codes(&p.npi).ok()?;
                let mix = EmMix::from_codes(codes, thresholds);
                let share = mix.share()?;
                Some((taxonomy_state_key(&p.taxonomy, &p.state), share))
            }),
        );

        let concurrent_states = CohortTable::build(
            "concurrent_states",
            minimum,
            store
                .providers()
                .iter()
                .filter(|p| p.kind == EntityKind::Individual)
                .filter_map(|p| {
                    let peak = peak_state_month(store, &p.npi)?;
                    Some((NATIONAL.to_string(), peak.states as f64))
                }),
        );

        let dominant_share = CohortTable::build(
            "dominant_share",
            minimum,
            store.providers().iter().filter_map(|p| {
                let codes = store.codes(&p.npi).ok()?;
                let dominant = DominantCode::from_codes(codes)?;
                Some((p.taxonomy.clone(), dominant.share))
            }),
        );

        let all_codes = || {
            store
                .providers()
                .iter()
                .filter_map(|p| store.codes(&p.npi).ok())
                .flatten()
        };

        let code_rate = CohortTable::build(
            "code_rate",
            minimum,
            all_codes()
                .filter(|c| c.claims > 0)
                .map(|c| (c.code.clone(), c.paid / c.claims as f64)),
        );

        let claims_per_beneficiary = CohortTable::build(
            "claims_per_beneficiary",
            minimum,
            all_codes()
                .filter(|c| c.beneficiaries > 0)
                .map(|c| (c.code.clone(), c.claims as f64 / c.beneficiaries as f64)),
        );

        Self {
            lifetime_paid,
            high_complexity_share,
            concurrent_states,
            dominant_share,
            code_rate,
            claims_per_beneficiary,
        }
    }
}

/// Evaluation and management claim mix for one provider.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EmMix {
    pub em_claims: u64,
    pub high_claims: u64,
    pub high_paid: f64,
}

impl EmMix {
    pub fn from_codes(codes: &[CodeTotals], thresholds: &Thresholds) -> Self {
        let upcoding = &thresholds.upcoding;
        codes
            .iter()
            .filter(|c| upcoding.em_codes.iter().any(|e| e == &c.code))
            .fold(Self::default(), |mut mix, c| {
                mix.em_claims += c.claims;
                if upcoding.high_complexity_codes.iter().any(|h| h == &c.code) {
                    mix.high_claims += c.claims;
                    mix.high_paid += c.paid;
                }
                mix
            })
    }

    /// High-complexity share of E&M claims (None without E&M claims).
    pub fn share(&self) -> Option<f64> {
        (self.em_claims > 0).then(|| self.high_claims as f64 / self.em_claims as f64)
    }
}

/// The procedure code carrying the largest share of a provider's billing.
#[derive(Debug, Clone, PartialEq)]
pub struct DominantCode {
    pub code: String,
    pub paid: f64,
    pub total_paid: f64,
    pub share: f64,
}

impl DominantCode {
    pub fn from_codes(codes: &[CodeTotals]) -> Option<Self> {
        let total_paid: f64 = codes.iter().map(|c| c.paid.max(0.0)).sum();
        if total_paid <= 0.0 {
            return None;
        }
        // Ties go to the lexically first code; rows are sorted by code.
        let top = codes
            .iter()
            .fold(None::<&CodeTotals>, |best, c| match best {
                Some(b) if b.paid >= c.paid => Some(b),
                _ => Some(c),
            })?;
        Some(Self {
            code: top.code.clone(),
            paid: top.paid,
            total_paid,
            share: top.paid / total_paid,
        })
    }
}

/// Month in which a servicing practitioner billed through the most states.
#[derive(Debug, Clone, PartialEq)]
pub struct StateMonth {
    pub month: NaiveDate,
    pub states: usize,
    pub paid: f64,
}

/// Finds the month with the most distinct billing-provider states for a
/// servicing practitioner. Links to unknown billing providers are ignored.
pub fn peak_state_month(store: &AggregateStore, servicing_npi: &str) -> Option<StateMonth> {
    let mut months: BTreeMap<i32, (NaiveDate, BTreeSet<&str>, f64)> = BTreeMap::new();
    for link in store.servicing_for_servicer(servicing_npi) {
        let Some(biller) = store.provider(&link.billing_npi) else {
            continue;
        };
        if biller.state.is_empty() {
            continue;
        }
        let entry = months
            .entry(month_index(link.month))
            .or_insert_with(|| (link.month, BTreeSet::new(), 0.0));
        entry.1.insert(biller.state.as_str());
        entry.2 += link.paid;
    }

    // Earliest month wins ties.
    months
        .into_values()
        .fold(None::<StateMonth>, |best, (month, states, paid)| match best {
            Some(b) if b.states >= states.len() => Some(b),
            _ => Some(StateMonth {
                month,
                states: states.len(),
                paid,
            }),
        })
}
