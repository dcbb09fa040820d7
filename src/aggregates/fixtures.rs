//! Builder for synthetic aggregate snapshots used across unit tests.

use super::*;
use crate::models::EntityKind;

pub fn ym(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).unwrap()
}

#[derive(Default)]
pub struct SnapshotBuilder {
    snapshot: Snapshot,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_provider(mut self, npi: &str, name: &str, kind: EntityKind, taxonomy: &str, state: &str) -> Self {
        self.snapshot.providers.push(Provider {
            npi: npi.to_string(),
            name: name.to_string(),
            kind,
            taxonomy: taxonomy.to_string(),
            state: state.to_string(),
            zip: String::new(),
            address: None,
            registration_date: None,
            officials: Vec::new(),
        });
        self
    }

    pub fn individual(self, npi: &str, taxonomy: &str, state: &str) -> Self {
        let name = format!("Practitioner {npi}");
        self.push_provider(npi, &name, EntityKind::Individual, taxonomy, state)
    }

    pub fn organization(self, npi: &str, name: &str, taxonomy: &str, state: &str) -> Self {
        self.push_provider(npi, name, EntityKind::Organization, taxonomy, state)
    }

    fn edit(mut self, npi: &str, f: impl FnOnce(&mut Provider)) -> Self {
        let provider = self
            .snapshot
            .providers
            .iter_mut()
            .find(|p| p.npi == npi)
            .unwrap_or_else(|| panic!("provider {npi} not added"));
        f(provider);
        self
    }

    pub fn official(self, npi: &str, official: &str) -> Self {
        self.edit(npi, |p| p.officials.push(official.to_string()))
    }

    pub fn registered(self, npi: &str, date: NaiveDate) -> Self {
        self.edit(npi, |p| p.registration_date = Some(date))
    }

    pub fn address(self, npi: &str, address: &str) -> Self {
        self.edit(npi, |p| p.address = Some(address.to_string()))
    }

    pub fn zip(self, npi: &str, zip: &str) -> Self {
        self.edit(npi, |p| p.zip = zip.to_string())
    }

    pub fn totals(mut self, npi: &str, paid: f64, claims: u64, beneficiaries: u64) -> Self {
        self.snapshot.totals.retain(|t| t.npi != npi);
        self.snapshot.totals.push(ProviderTotals {
            npi: npi.to_string(),
            paid,
            claims,
            beneficiaries,
        });
        self
    }

    pub fn month(mut self, npi: &str, month: NaiveDate, paid: f64, claims: u64, beneficiaries: u64) -> Self {
        self.snapshot.monthly.push(MonthlyTotals {
            npi: npi.to_string(),
            month,
            paid,
            claims,
            beneficiaries,
        });
        self
    }

    /// Consecutive months starting at `start`, one claim per $50 paid.
    pub fn series(mut self, npi: &str, start: NaiveDate, paid: &[f64]) -> Self {
        let base = month_index(start);
        for (offset, amount) in paid.iter().enumerate() {
            let month = month_from_index(base + offset as i32).unwrap();
            self = self.month(npi, month, *amount, (amount / 50.0).round() as u64, 10);
        }
        self
    }

    pub fn code(mut self, npi: &str, code: &str, paid: f64, claims: u64, beneficiaries: u64) -> Self {
        self.snapshot.codes.push(CodeTotals {
            npi: npi.to_string(),
            code: code.to_string(),
            paid,
            claims,
            beneficiaries,
        });
        self
    }

    #[allow(clippy::too_many_arguments)]
    pub fn servicing(
        mut self,
        billing: &str,
        servicing: &str,
        month: NaiveDate,
        paid: f64,
        claims: u64,
        beneficiaries: u64,
    ) -> Self {
        self.snapshot.servicing.push(ServicingLink {
            billing_npi: billing.to_string(),
            servicing_npi: servicing.to_string(),
            month,
            paid,
            claims,
            beneficiaries,
        });
        self
    }

    pub fn home_state(mut self, npi: &str, home_state_claims: u64, total_claims: u64) -> Self {
        self.snapshot.home_state.push(HomeStateSplit {
            npi: npi.to_string(),
            home_state_claims,
            total_claims,
        });
        self
    }

    pub fn exclusion(mut self, npi: &str, date: NaiveDate, reinstated: Option<NaiveDate>) -> Self {
        self.snapshot.exclusions.push(Exclusion {
            npi: npi.to_string(),
            exclusion_date: date,
            reinstatement_date: reinstated,
            exclusion_type: "1128a1".to_string(),
        });
        self
    }

    /// Providers without an explicit totals row get one summed from
    /// their monthly rows.
    pub fn build(mut self) -> AggregateStore {
        let explicit: Vec<String> = self.snapshot.totals.iter().map(|t| t.npi.clone()).collect();
        let mut derived: HashMap<String, ProviderTotals> = HashMap::new();
        for row in &self.snapshot.monthly {
            if explicit.contains(&row.npi) {
                continue;
            }
            let entry = derived.entry(row.npi.clone()).or_insert_with(|| ProviderTotals {
                npi: row.npi.clone(),
                paid: 0.0,
                claims: 0,
                beneficiaries: 0,
            });
            entry.paid += row.paid;
            entry.claims += row.claims;
            entry.beneficiaries = entry.beneficiaries.max(row.beneficiaries);
        }
        self.snapshot.totals.extend(derived.into_values());
        AggregateStore::from_snapshot(self.snapshot)
    }
}
