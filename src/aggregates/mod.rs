//! Read-only aggregate store.
//!
//! The engine never touches raw claim rows. It consumes a snapshot of
//! pre-aggregated tables (per provider, per month, per procedure code,
//! servicing links, home-state splits and exclusions) and indexes them
//! by NPI once at load time.

use crate::error::EngineError;
use crate::models::Provider;
use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

#[cfg(test)]
pub mod fixtures;

/// Lifetime totals for one billing provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderTotals {
    pub npi: String,
    pub paid: f64,
    pub claims: u64,
    pub beneficiaries: u64,
}

impl ProviderTotals {
    /// Average paid amount per claim (None when there are no claims).
    pub fn avg_claim_cost(&self) -> Option<f64> {
        (self.claims > 0).then(|| self.paid / self.claims as f64)
    }
}

/// Totals for one billing provider in one claim month.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyTotals {
    pub npi: String,
    /// First day of the claim month.
    pub month: NaiveDate,
    pub paid: f64,
    pub claims: u64,
    pub beneficiaries: u64,
}

/// Lifetime totals for one billing provider and one HCPCS code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeTotals {
    pub npi: String,
    pub code: String,
    pub paid: f64,
    pub claims: u64,
    pub beneficiaries: u64,
}

/// Claims billed by `billing_npi` and rendered by `servicing_npi` in a month.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicingLink {
    pub billing_npi: String,
    pub servicing_npi: String,
    pub month: NaiveDate,
    pub paid: f64,
    pub claims: u64,
    pub beneficiaries: u64,
}

/// Claims rendered to beneficiaries of the provider's home state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomeStateSplit {
    pub npi: String,
    pub home_state_claims: u64,
    pub total_claims: u64,
}

/// Exclusion list entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exclusion {
    pub npi: String,
    pub exclusion_date: NaiveDate,
    #[serde(default)]
    pub reinstatement_date: Option<NaiveDate>,
    #[serde(default)]
    pub exclusion_type: String,
}

impl Exclusion {
    /// Whether billing in `month` falls inside the excluded period.
    pub fn covers(&self, month: NaiveDate) -> bool {
        let start = first_of_month(self.exclusion_date);
        let after_start = month >= start;
        let before_end = self
            .reinstatement_date
            .map(|r| month < first_of_month(r))
            .unwrap_or(true);
        after_start && before_end
    }
}

/// On-disk snapshot format. Every table may be absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub providers: Vec<Provider>,
    pub totals: Vec<ProviderTotals>,
    pub monthly: Vec<MonthlyTotals>,
    pub codes: Vec<CodeTotals>,
    pub servicing: Vec<ServicingLink>,
    pub home_state: Vec<HomeStateSplit>,
    pub exclusions: Vec<Exclusion>,
}

impl Snapshot {
    /// Loads a snapshot from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot: {}", path.display()))?;

        let snapshot: Snapshot = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse snapshot: {}", path.display()))?;

        Ok(snapshot)
    }
}

/// Indexed, immutable view over a snapshot.
#[derive(Debug, Default)]
pub struct AggregateStore {
    providers: Vec<Provider>,
    provider_index: HashMap<String, usize>,
    totals: HashMap<String, ProviderTotals>,
    monthly: HashMap<String, Vec<MonthlyTotals>>,
    codes: HashMap<String, Vec<CodeTotals>>,
    servicing_by_billing: HashMap<String, Vec<ServicingLink>>,
    servicing_by_servicer: HashMap<String, Vec<ServicingLink>>,
    home_state: HashMap<String, HomeStateSplit>,
    exclusions: HashMap<String, Exclusion>,
    last_month: Option<NaiveDate>,
}

impl AggregateStore {
    /// Loads and indexes a snapshot file.
    pub fn load(path: &Path) -> Result<Self> {
        let snapshot = Snapshot::load(path)?;
        let store = Self::from_snapshot(snapshot);
        info!(
            "Loaded {} providers, {} monthly rows from {}",
            store.providers.len(),
            store.monthly.values().map(Vec::len).sum::<usize>(),
            path.display()
        );
        Ok(store)
    }

    /// Indexes an in-memory snapshot.
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut providers = snapshot.providers;
        providers.sort_by(|a, b| a.npi.cmp(&b.npi));
        providers.dedup_by(|a, b| a.npi == b.npi);

        let provider_index = providers
            .iter()
            .enumerate()
            .map(|(i, p)| (p.npi.clone(), i))
            .collect();

        let totals = snapshot
            .totals
            .into_iter()
            .map(|t| (t.npi.clone(), t))
            .collect();

        let mut last_month: Option<NaiveDate> = None;
        let mut monthly: HashMap<String, Vec<MonthlyTotals>> = HashMap::new();
        for mut row in snapshot.monthly {
            row.month = first_of_month(row.month);
            last_month = Some(last_month.map_or(row.month, |m| m.max(row.month)));
            monthly.entry(row.npi.clone()).or_default().push(row);
        }
        for rows in monthly.values_mut() {
            rows.sort_by_key(|r| r.month);
        }

        let mut codes: HashMap<String, Vec<CodeTotals>> = HashMap::new();
        for row in snapshot.codes {
            codes.entry(row.npi.clone()).or_default().push(row);
        }
        for rows in codes.values_mut() {
            rows.sort_by(|a, b| a.code.cmp(&b.code));
        }

        let mut servicing_by_billing: HashMap<String, Vec<ServicingLink>> = HashMap::new();
        let mut servicing_by_servicer: HashMap<String, Vec<ServicingLink>> = HashMap::new();
        for mut link in snapshot.servicing {
            link.month = first_of_month(link.month);
            servicing_by_servicer
                .entry(link.servicing_npi.clone())
                .or_default()
                .push(link.clone());
            servicing_by_billing
                .entry(link.billing_npi.clone())
                .or_default()
                .push(link);
        }

        let home_state = snapshot
            .home_state
            .into_iter()
            .map(|h| (h.npi.clone(), h))
            .collect();

        let exclusions = snapshot
            .exclusions
            .into_iter()
            .map(|e| (e.npi.clone(), e))
            .collect();

        debug!("Indexed aggregate snapshot, last claim month {:?}", last_month);

        Self {
            providers,
            provider_index,
            totals,
            monthly,
            codes,
            servicing_by_billing,
            servicing_by_servicer,
            home_state,
            exclusions,
            last_month,
        }
    }

    /// All providers, sorted by NPI.
    pub fn providers(&self) -> &[Provider] {
        &self.providers
    }

    pub fn provider(&self, npi: &str) -> Option<&Provider> {
        self.provider_index.get(npi).map(|&i| &self.providers[i])
    }

    pub fn totals(&self, npi: &str) -> Result<&ProviderTotals, EngineError> {
        self.totals
            .get(npi)
            .ok_or_else(|| EngineError::missing(npi, "totals"))
    }

    /// Monthly rows sorted by month.
    pub fn monthly(&self, npi: &str) -> Result<&[MonthlyTotals], EngineError> {
        self.monthly
            .get(npi)
            .map(Vec::as_slice)
            .ok_or_else(|| EngineError::missing(npi, "monthly"))
    }

    /// Per-code rows sorted by code.
    pub fn codes(&self, npi: &str) -> Result<&[CodeTotals], EngineError> {
        self.codes
            .get(npi)
            .map(Vec::as_slice)
            .ok_or_else(|| EngineError::missing(npi, "codes"))
    }

    pub fn home_state(&self, npi: &str) -> Result<&HomeStateSplit, EngineError> {
        self.home_state
            .get(npi)
            .ok_or_else(|| EngineError::missing(npi, "home_state"))
    }

    /// Links where `npi` is the billing provider (empty when none).
    pub fn servicing_for_billing(&self, npi: &str) -> &[ServicingLink] {
        self.servicing_by_billing
            .get(npi)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Links where `npi` is the servicing provider (empty when none).
    pub fn servicing_for_servicer(&self, npi: &str) -> &[ServicingLink] {
        self.servicing_by_servicer
            .get(npi)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Servicing NPIs with at least one link, sorted.
    pub fn servicers(&self) -> Vec<&str> {
        let mut npis: Vec<&str> = self.servicing_by_servicer.keys().map(String::as_str).collect();
        npis.sort_unstable();
        npis
    }

    pub fn exclusion(&self, npi: &str) -> Option<&Exclusion> {
        self.exclusions.get(npi)
    }

    /// Lifetime paid, zero when the totals row is missing.
    pub fn lifetime_paid(&self, npi: &str) -> f64 {
        self.totals.get(npi).map(|t| t.paid).unwrap_or(0.0)
    }

    /// Latest claim month present in the snapshot.
    pub fn last_month(&self) -> Option<NaiveDate> {
        self.last_month
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Normalizes any date to the first day of its month.
pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Months since year zero, for calendar arithmetic between claim months.
pub fn month_index(date: NaiveDate) -> i32 {
    date.year() * 12 + date.month0() as i32
}

/// Inverse of [`month_index`].
pub fn month_from_index(index: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(index.div_euclid(12), index.rem_euclid(12) as u32 + 1, 1)
}

/// Whole calendar months from `from` to `to` (negative when `to` is earlier).
pub fn months_between(from: NaiveDate, to: NaiveDate) -> i32 {
    month_index(to) - month_index(from)
}

/// Dense calendar series of monthly paid amounts, zero-filled between
/// the first billed month and `through` (or the last billed month).
pub fn paid_series(rows: &[MonthlyTotals], through: Option<NaiveDate>) -> Vec<(NaiveDate, f64)> {
    let (Some(first), Some(last)) = (rows.first(), rows.last()) else {
        return Vec::new();
    };
    let start = month_index(first.month);
    let end = through
        .map(|t| month_index(t).max(month_index(last.month)))
        .unwrap_or_else(|| month_index(last.month));

    let mut by_index: HashMap<i32, f64> = HashMap::new();
    for row in rows {
        *by_index.entry(month_index(row.month)).or_insert(0.0) += row.paid;
    }

    (start..=end)
        .filter_map(|i| month_from_index(i).map(|m| (m, by_index.get(&i).copied().unwrap_or(0.0))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::fixtures::{ym, SnapshotBuilder};
    use super::*;

    #[test]
    fn test_month_arithmetic() {
        assert_eq!(months_between(ym(2019, 11), ym(2020, 2)), 3);
        assert_eq!(months_between(ym(2020, 2), ym(2019, 11)), -3);
        assert_eq!(month_from_index(month_index(ym(2021, 12))), Some(ym(2021, 12)));
        assert_eq!(
            first_of_month(NaiveDate::from_ymd_opt(2021, 7, 19).unwrap()),
            ym(2021, 7)
        );
    }

    #[test]
    fn test_paid_series_fills_gaps() {
        let store = SnapshotBuilder::new()
            .organization("1", "Acme", "251E00000X", "TX")
            .month("1", ym(2022, 1), 100.0, 1, 1)
            .month("1", ym(2022, 3), 300.0, 3, 1)
            .build();
        let series = paid_series(store.monthly("1").unwrap(), Some(ym(2022, 5)));
        let paid: Vec<f64> = series.iter().map(|(_, p)| *p).collect();
        assert_eq!(paid, vec![100.0, 0.0, 300.0, 0.0, 0.0]);
        assert_eq!(series[0].0, ym(2022, 1));
    }

    #[test]
    fn test_missing_dimensions_surface_as_errors() {
        let store = SnapshotBuilder::new()
            .organization("1", "Acme", "251E00000X", "TX")
            .build();
        assert!(matches!(
            store.monthly("1"),
            Err(EngineError::MissingAggregate { dimension: "monthly", .. })
        ));
        assert!(store.codes("1").is_err());
        assert!(store.servicing_for_billing("1").is_empty());
        assert_eq!(store.lifetime_paid("1"), 0.0);
    }

    #[test]
    fn test_exclusion_window_respects_reinstatement() {
        let exclusion = Exclusion {
            npi: "1".to_string(),
            exclusion_date: NaiveDate::from_ymd_opt(2021, 3, 15).unwrap(),
            reinstatement_date: NaiveDate::from_ymd_opt(2022, 1, 10),
            exclusion_type: "1128a1".to_string(),
        };
        assert!(!exclusion.covers(ym(2021, 2)));
        assert!(exclusion.covers(ym(2021, 3)));
        assert!(exclusion.covers(ym(2021, 12)));
        assert!(!exclusion.covers(ym(2022, 1)));
    }

    #[test]
    fn test_snapshot_load_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        fs::write(
            &path,
            r#"{
                "providers": [
                    {"npi": "2", "name": "B", "kind": "individual"},
                    {"npi": "1", "name": "A", "kind": "organization", "taxonomy": "251E00000X", "state": "TX"}
                ],
                "totals": [{"npi": "1", "paid": 1000.0, "claims": 10, "beneficiaries": 4}],
                "monthly": [{"npi": "1", "month": "2023-04-17", "paid": 1000.0, "claims": 10, "beneficiaries": 4}]
            }"#,
        )
        .unwrap();

        let store = AggregateStore::load(&path).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.providers()[0].npi, "1");
        assert_eq!(store.totals("1").unwrap().avg_claim_cost(), Some(100.0));
        assert_eq!(store.monthly("1").unwrap()[0].month, ym(2023, 4));
        assert_eq!(store.last_month(), Some(ym(2023, 4)));
    }
}
