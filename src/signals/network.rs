//! Network signals over groups of providers sharing a key.
//!
//! Groups are built once by [`NetworkIndex::build`]:
//! - controlling official (signals 5, 11, 13)
//! - normalized physical address (signal 7)
//! - enrollment quarter, taxonomy and state (signal 10)
//! - servicing practitioner hub (signals 12, 15)
//! - home care zip code (signal 14)
//!
//! Every member of a qualifying group receives its own Evidence that names
//! the group. When a provider belongs to several qualifying groups for one
//! signal, the strongest group is reported.

use super::thresholds::{GroupRule, Thresholds};
use super::{round4, EvalContext, SignalResult};
use crate::aggregates::{month_index, AggregateStore};
use crate::cohort::CohortTable;
use crate::models::{EntityKind, Evidence, MonthWindow, Provider, Severity, SignalId};
use chrono::{Datelike, NaiveDate};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Providers sharing one grouping key.
#[derive(Debug, Clone, Default)]
pub struct Group {
    pub key: String,
    /// Member NPIs, sorted.
    pub members: Vec<String>,
    pub combined_paid: f64,
    pub claims: u64,
    pub beneficiaries: u64,
}

impl Group {
    fn contains(&self, npi: &str) -> bool {
        self.members
            .binary_search_by(|m| m.as_str().cmp(npi))
            .is_ok()
    }

    fn claims_per_beneficiary(&self) -> Option<f64> {
        (self.beneficiaries > 0).then(|| self.claims as f64 / self.beneficiaries as f64)
    }
}

/// Link totals between one billing provider and one hub.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkTotals {
    pub paid: f64,
    pub claims: u64,
    pub beneficiaries: u64,
}

/// A servicing practitioner and the billing providers it renders for.
#[derive(Debug, Clone, Default)]
pub struct Hub {
    /// Billing NPIs as members, link totals as group totals.
    pub group: Group,
    pub links: BTreeMap<String, LinkTotals>,
}

/// Members of an official group whose billing peaks line up.
#[derive(Debug, Clone)]
pub struct RampCluster {
    pub members: Vec<String>,
    pub combined_peak: f64,
    pub window: MonthWindow,
}

/// Precomputed grouping tables.
#[derive(Debug, Default)]
pub struct NetworkIndex {
    officials: HashMap<String, Group>,
    addresses: HashMap<String, Group>,
    enrollment_cohorts: HashMap<String, Group>,
    hubs: HashMap<String, Hub>,
    ramps: HashMap<String, RampCluster>,
    zips: HashMap<String, Group>,
    state_zip_paid: CohortTable,
}

/// Upper-cases and collapses whitespace so "jane  doe" matches "JANE DOE".
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_uppercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalizes a street address with the common USPS abbreviations.
pub fn normalize_address(address: &str, zip: &str) -> Option<String> {
    let cleaned: String = address
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_uppercase() } else { ' ' })
        .collect();
    let words: Vec<&str> = cleaned
        .split_whitespace()
        .map(|w| match w {
            "STREET" => "ST",
            "AVENUE" => "AVE",
            "ROAD" => "RD",
            "BOULEVARD" => "BLVD",
            "DRIVE" => "DR",
            "SUITE" => "STE",
            "HIGHWAY" => "HWY",
            other => other,
        })
        .collect();
    if words.is_empty() {
        return None;
    }
    let zip5: String = zip.chars().take(5).collect();
    Some(format!("{}|{}", words.join(" "), zip5))
}

fn enrollment_key(provider: &Provider) -> Option<String> {
    let date = provider.registration_date?;
    if provider.kind != EntityKind::Organization || provider.taxonomy.is_empty() {
        return None;
    }
    Some(format!(
        "{}Q{}/{}/{}",
        date.year(),
        date.month0() / 3 + 1,
        provider.taxonomy,
        provider.state
    ))
}

fn zip_key(provider: &Provider) -> String {
    format!("{}/{}", provider.state, provider.zip)
}

fn is_caregiver(provider: &Provider, thresholds: &Thresholds) -> bool {
    provider.kind == EntityKind::Individual
        && !provider.zip.is_empty()
        && thresholds
            .caregiver_density
            .taxonomy_prefixes
            .iter()
            .any(|p| provider.taxonomy.starts_with(p.as_str()))
}

/// Collects members under each key, then totals them from the store.
fn build_groups<'a, I>(store: &AggregateStore, entries: I) -> HashMap<String, Group>
where
    I: IntoIterator<Item = (String, &'a str)>,
{
    let mut groups: HashMap<String, Group> = HashMap::new();
    for (key, npi) in entries {
        let group = groups.entry(key.clone()).or_insert_with(|| Group {
            key,
            ..Group::default()
        });
        group.members.push(npi.to_string());
    }
    for group in groups.values_mut() {
        group.members.sort();
        group.members.dedup();
        for npi in &group.members {
            if let Ok(totals) = store.totals(npi) {
                group.combined_paid += totals.paid;
                group.claims += totals.claims;
                group.beneficiaries += totals.beneficiaries;
            }
        }
    }
    groups
}

fn peak_month(store: &AggregateStore, npi: &str) -> Option<(NaiveDate, f64)> {
    store
        .monthly(npi)
        .ok()?
        .iter()
        .filter(|m| m.paid > 0.0)
        .fold(None, |best: Option<(NaiveDate, f64)>, m| match best {
            Some((_, p)) if p >= m.paid => best,
            _ => Some((m.month, m.paid)),
        })
}

/// Largest set of members whose peak months fit within `span` months.
fn ramp_cluster(store: &AggregateStore, group: &Group, span: i32) -> Option<RampCluster> {
    let mut peaks: Vec<(i32, NaiveDate, f64, &str)> = group
        .members
        .iter()
        .filter_map(|npi| {
            let (month, paid) = peak_month(store, npi)?;
            Some((month_index(month), month, paid, npi.as_str()))
        })
        .collect();
    peaks.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.3.cmp(b.3)));

    let mut best: Option<(usize, usize, f64)> = None;
    let mut start = 0;
    for end in 0..peaks.len() {
        while peaks[end].0 - peaks[start].0 >= span {
            start += 1;
        }
        let combined: f64 = peaks[start..=end].iter().map(|p| p.2).sum();
        let count = end - start + 1;
        let better = match best {
            Some((s, e, c)) => count > e - s + 1 || (count == e - s + 1 && combined > c),
            None => true,
        };
        if better {
            best = Some((start, end, combined));
        }
    }

    let (start, end, combined_peak) = best?;
    let mut members: Vec<String> = peaks[start..=end].iter().map(|p| p.3.to_string()).collect();
    members.sort();
    Some(RampCluster {
        members,
        combined_peak,
        window: MonthWindow::new(peaks[start].1, peaks[end].1),
    })
}

impl NetworkIndex {
    pub fn build(store: &AggregateStore, thresholds: &Thresholds) -> Self {
        let providers = store.providers();
        let organizations = || {
            providers
                .iter()
                .filter(|p| p.kind == EntityKind::Organization)
        };

        let officials = build_groups(
            store,
            organizations().flat_map(|p| {
                p.officials
                    .iter()
                    .map(|o| normalize_name(o))
                    .filter(|o| !o.is_empty())
                    .map(move |o| (o, p.npi.as_str()))
            }),
        );

        let addresses = build_groups(
            store,
            providers.iter().filter_map(|p| {
                let key = normalize_address(p.address.as_deref()?, &p.zip)?;
                Some((key, p.npi.as_str()))
            }),
        );

        let enrollment_cohorts = build_groups(
            store,
            organizations().filter_map(|p| Some((enrollment_key(p)?, p.npi.as_str()))),
        );

        let mut hubs: HashMap<String, Hub> = HashMap::new();
        for servicer in store.servicers() {
            let mut hub = Hub::default();
            hub.group.key = servicer.to_string();
            for link in store.servicing_for_servicer(servicer) {
                if link.billing_npi == link.servicing_npi {
                    continue;
                }
                let totals = hub.links.entry(link.billing_npi.clone()).or_default();
                totals.paid += link.paid;
                totals.claims += link.claims;
                totals.beneficiaries += link.beneficiaries;
            }
            if hub.links.is_empty() {
                continue;
            }
            hub.group.members = hub.links.keys().cloned().collect();
            for totals in hub.links.values() {
                hub.group.combined_paid += totals.paid;
                hub.group.claims += totals.claims;
                hub.group.beneficiaries += totals.beneficiaries;
            }
            hubs.insert(servicer.to_string(), hub);
        }

        let ramp_rule = &thresholds.coordinated_ramp;
        let ramps: HashMap<String, RampCluster> = officials
            .iter()
            .filter(|(_, g)| g.members.len() >= ramp_rule.min_members)
            .filter_map(|(key, g)| {
                let cluster = ramp_cluster(store, g, ramp_rule.peak_span_months.max(1))?;
                (cluster.members.len() >= ramp_rule.min_members).then(|| (key.clone(), cluster))
            })
            .collect();

        let zips = build_groups(
            store,
            providers
                .iter()
                .filter(|p| is_caregiver(p, thresholds))
                .map(|p| (zip_key(p), p.npi.as_str())),
        );

        let state_zip_paid = CohortTable::build(
            "state_zip_paid",
            thresholds.caregiver_density.min_state_zips,
            zips.values().filter_map(|g| {
                let state = g.key.split('/').next()?;
                Some((state.to_string(), g.combined_paid))
            }),
        );

        debug!(
            "Network index: {} officials, {} addresses, {} enrollment cohorts, {} hubs, {} ramp clusters, {} zips",
            officials.len(),
            addresses.len(),
            enrollment_cohorts.len(),
            hubs.len(),
            ramps.len(),
            zips.len()
        );

        Self {
            officials,
            addresses,
            enrollment_cohorts,
            hubs,
            ramps,
            zips,
            state_zip_paid,
        }
    }

    /// Official groups the provider belongs to.
    fn officials_of<'a>(&'a self, provider: &'a Provider) -> impl Iterator<Item = &'a Group> + 'a {
        provider
            .officials
            .iter()
            .filter_map(move |o| self.officials.get(&normalize_name(o)))
            .filter(move |g| g.contains(&provider.npi))
    }

    /// Hubs the provider bills for.
    fn hubs_of<'a>(&'a self, store: &'a AggregateStore, npi: &'a str) -> Vec<&'a Hub> {
        let mut servicers: Vec<&str> = store
            .servicing_for_billing(npi)
            .iter()
            .map(|l| l.servicing_npi.as_str())
            .collect();
        servicers.sort_unstable();
        servicers.dedup();
        servicers
            .into_iter()
            .filter_map(|s| self.hubs.get(s))
            .filter(|h| h.group.contains(npi))
            .collect()
    }
}

/// Picks the group with the largest combined billing, ties by key.
fn strongest<'a>(groups: impl Iterator<Item = &'a Group>) -> Option<&'a Group> {
    groups.fold(None, |best: Option<&Group>, g| match best {
        Some(b) if b.combined_paid > g.combined_paid
            || (b.combined_paid == g.combined_paid && b.key <= g.key) =>
        {
            Some(b)
        }
        _ => Some(g),
    })
}

fn qualifies(ctx: &EvalContext<'_>, signal: SignalId, rule: &GroupRule, group: &Group) -> bool {
    group.members.len() >= rule.min_members
        && group.combined_paid >= ctx.scaled(signal, rule.min_combined_paid)
}

/// Fixed-percentage Evidence shared by signals 5, 10 and 12.
fn group_evidence(signal: SignalId, rule: &GroupRule, group: &Group, kind: &str) -> Evidence {
    let severity = if group.combined_paid >= rule.high_combined_paid {
        Severity::High
    } else {
        Severity::Medium
    };
    let detail = json!({
        "group_kind": kind,
        "group_key": group.key,
        "members": group.members.len(),
        "member_npis": group.members,
        "combined_paid": group.combined_paid,
        "overpayment_share": rule.overpayment_share,
    });
    Evidence::new(
        signal,
        severity,
        rule.overpayment_share * group.combined_paid,
        detail,
    )
    .with_group(format!("{}:{}", kind, group.key))
}

/// Signal 5.
pub fn shared_official(ctx: &EvalContext<'_>, provider: &Provider) -> SignalResult {
    let signal = SignalId::SharedOfficial;
    let rule = ctx.thresholds.shared_official.rule();
    let group = strongest(
        ctx.networks
            .officials_of(provider)
            .filter(|g| qualifies(ctx, signal, &rule, g)),
    );
    Ok(group.map(|g| group_evidence(signal, &rule, g, "official")))
}

/// Signal 7.
pub fn address_cluster(ctx: &EvalContext<'_>, provider: &Provider) -> SignalResult {
    let signal = SignalId::AddressCluster;
    let t = &ctx.thresholds.address_cluster;
    let Some(key) = provider
        .address
        .as_deref()
        .and_then(|a| normalize_address(a, &provider.zip))
    else {
        return Ok(None);
    };
    let Some(group) = ctx.networks.addresses.get(&key) else {
        return Ok(None);
    };
    if group.members.len() < t.min_members
        || group.combined_paid < ctx.scaled(signal, t.min_combined_paid)
    {
        return Ok(None);
    }

    let severity = if group.members.len() >= t.high_members
        || group.combined_paid >= t.high_combined_paid
    {
        Severity::High
    } else {
        Severity::Medium
    };
    let detail = json!({
        "address": key,
        "members": group.members.len(),
        "member_npis": group.members,
        "combined_paid": group.combined_paid,
        "overpayment_share": t.overpayment_share,
    });
    Ok(Some(
        Evidence::new(
            signal,
            severity,
            t.overpayment_share * group.combined_paid,
            detail,
        )
        .with_group(format!("address:{key}")),
    ))
}

/// Signal 10.
pub fn burst_enrollment(ctx: &EvalContext<'_>, provider: &Provider) -> SignalResult {
    let signal = SignalId::BurstEnrollment;
    let rule = ctx.thresholds.burst_enrollment.rule();
    let Some(key) = enrollment_key(provider) else {
        return Ok(None);
    };
    Ok(ctx
        .networks
        .enrollment_cohorts
        .get(&key)
        .filter(|g| qualifies(ctx, signal, &rule, g))
        .map(|g| group_evidence(signal, &rule, g, "enrollment")))
}

/// Signal 11.
pub fn coordinated_ramp(ctx: &EvalContext<'_>, provider: &Provider) -> SignalResult {
    let signal = SignalId::CoordinatedRamp;
    let t = &ctx.thresholds.coordinated_ramp;
    let minimum = ctx.scaled(signal, t.min_combined_peak);

    let best = provider
        .officials
        .iter()
        .map(|o| normalize_name(o))
        .filter_map(|o| ctx.networks.ramps.get(&o).map(|c| (o, c)))
        .filter(|(_, c)| c.members.binary_search(&provider.npi).is_ok())
        .filter(|(_, c)| c.combined_peak >= minimum)
        .fold(None, |best: Option<(String, &RampCluster)>, (o, c)| match best {
            Some((_, b)) if b.combined_peak >= c.combined_peak => best,
            _ => Some((o, c)),
        });
    let Some((official, cluster)) = best else {
        return Ok(None);
    };

    let severity = if cluster.combined_peak >= t.high_combined_peak {
        Severity::High
    } else {
        Severity::Medium
    };
    let detail = json!({
        "official": official,
        "members": cluster.members.len(),
        "member_npis": cluster.members,
        "combined_peak_paid": cluster.combined_peak,
        "peak_window": cluster.window.label(),
        "overpayment_share": t.overpayment_share,
    });
    Ok(Some(
        Evidence::new(
            signal,
            severity,
            t.overpayment_share * cluster.combined_peak,
            detail,
        )
        .with_window(Some(cluster.window))
        .with_group(format!("official:{official}")),
    ))
}

/// Signal 12.
pub fn servicing_hub(ctx: &EvalContext<'_>, provider: &Provider) -> SignalResult {
    let signal = SignalId::ServicingHub;
    let rule = ctx.thresholds.servicing_hub.rule();
    let hubs = ctx.networks.hubs_of(ctx.store, &provider.npi);
    let group = strongest(
        hubs.iter()
            .map(|h| &h.group)
            .filter(|g| qualifies(ctx, signal, &rule, g)),
    );
    Ok(group.map(|g| group_evidence(signal, &rule, g, "servicing")))
}

/// Signal 13.
pub fn beneficiary_dilution(ctx: &EvalContext<'_>, provider: &Provider) -> SignalResult {
    let signal = SignalId::BeneficiaryDilution;
    let t = &ctx.thresholds.beneficiary_dilution;
    let limit = ctx.scaled(signal, t.max_claims_per_beneficiary);
    let min_paid = ctx.scaled(signal, t.min_combined_paid);

    let best = ctx
        .networks
        .officials_of(provider)
        .filter(|g| g.members.len() >= t.min_members && g.combined_paid >= min_paid)
        .filter_map(|g| Some((g, g.claims_per_beneficiary()?)))
        .filter(|(_, ratio)| *ratio > limit)
        .fold(None, |best: Option<(&Group, f64)>, (g, r)| match best {
            Some((_, b)) if b >= r => best,
            _ => Some((g, r)),
        });
    let Some((group, ratio)) = best else {
        return Ok(None);
    };

    let totals = ctx.store.totals(&provider.npi)?;
    let capacity = ctx.scaled(signal, t.capacity_per_beneficiary);
    let excess_claims =
        (totals.claims as f64 - capacity * totals.beneficiaries as f64).max(0.0);
    let overpayment = excess_claims * totals.avg_claim_cost().unwrap_or(0.0);
    let severity = if ratio > t.high_ratio_multiple * limit {
        Severity::High
    } else {
        Severity::Medium
    };

    let detail = json!({
        "official": group.key,
        "members": group.members.len(),
        "member_npis": group.members,
        "network_paid": group.combined_paid,
        "network_claims": group.claims,
        "network_beneficiaries": group.beneficiaries,
        "network_claims_per_beneficiary": round4(ratio),
        "limit": limit,
        "member_claims": totals.claims,
        "member_beneficiaries": totals.beneficiaries,
        "member_excess_claims": excess_claims,
    });
    Ok(Some(
        Evidence::new(signal, severity, overpayment, detail)
            .with_group(format!("official:{}", group.key)),
    ))
}

/// Signal 14.
pub fn caregiver_density(ctx: &EvalContext<'_>, provider: &Provider) -> SignalResult {
    let signal = SignalId::CaregiverDensity;
    let t = &ctx.thresholds.caregiver_density;
    if !is_caregiver(provider, ctx.thresholds) {
        return Ok(None);
    }
    let Some(group) = ctx.networks.zips.get(&zip_key(provider)) else {
        return Ok(None);
    };
    if group.members.len() < t.min_members {
        return Ok(None);
    }

    let state = ctx.networks.state_zip_paid.get(&provider.state)?;
    let trigger = ctx.scaled(signal, t.state_median_multiple * state.median);
    if state.median <= 0.0 || group.combined_paid <= trigger {
        return Ok(None);
    }
    let avg_beneficiaries = group.beneficiaries as f64 / group.members.len() as f64;
    if avg_beneficiaries > ctx.minimum(signal, t.max_avg_beneficiaries) {
        return Ok(None);
    }

    let severity = if group.combined_paid > t.high_trigger_multiple * trigger {
        Severity::High
    } else {
        Severity::Medium
    };
    let detail = json!({
        "zip": group.key,
        "members": group.members.len(),
        "member_npis": group.members,
        "zip_paid": group.combined_paid,
        "state_median_zip_paid": state.median,
        "state_zips": state.size,
        "trigger": trigger,
        "avg_beneficiaries_per_member": round4(avg_beneficiaries),
        "overpayment_share": t.overpayment_share,
    });
    Ok(Some(
        Evidence::new(
            signal,
            severity,
            t.overpayment_share * group.combined_paid,
            detail,
        )
        .with_group(format!("zip:{}", group.key)),
    ))
}

/// Signal 15.
pub fn servicing_spread(ctx: &EvalContext<'_>, provider: &Provider) -> SignalResult {
    let signal = SignalId::ServicingSpread;
    let t = &ctx.thresholds.servicing_spread;
    let capacity = ctx.scaled(signal, t.capacity_per_beneficiary);

    let best = ctx
        .networks
        .hubs_of(ctx.store, &provider.npi)
        .into_iter()
        .filter(|h| {
            h.group.members.len() >= t.min_billers
                && h.group.combined_paid >= ctx.scaled(signal, t.min_combined_paid)
        })
        .filter_map(|h| Some((h, h.group.claims_per_beneficiary()?)))
        .filter(|(_, ratio)| *ratio > capacity)
        .fold(None, |best: Option<(&Hub, f64)>, (h, r)| match best {
            Some((_, b)) if b >= r => best,
            _ => Some((h, r)),
        });
    let Some((hub, ratio)) = best else {
        return Ok(None);
    };
    let link = hub.links.get(&provider.npi).copied().unwrap_or_default();

    let excess_claims = (link.claims as f64 - capacity * link.beneficiaries as f64).max(0.0);
    let avg_cost = if link.claims > 0 {
        link.paid / link.claims as f64
    } else {
        0.0
    };
    let severity = if ratio > t.high_capacity_multiple * capacity {
        Severity::High
    } else {
        Severity::Medium
    };

    let detail = json!({
        "servicing_npi": hub.group.key,
        "billers": hub.group.members.len(),
        "hub_paid": hub.group.combined_paid,
        "hub_claims": hub.group.claims,
        "hub_beneficiaries": hub.group.beneficiaries,
        "hub_claims_per_beneficiary": round4(ratio),
        "capacity_per_beneficiary": capacity,
        "member_claims": link.claims,
        "member_beneficiaries": link.beneficiaries,
        "member_excess_claims": excess_claims,
    });
    Ok(Some(
        Evidence::new(signal, severity, excess_claims * avg_cost, detail)
            .with_group(format!("servicing:{}", hub.group.key)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregates::fixtures::{ym, SnapshotBuilder};
    use crate::signals::testing::Harness;

    #[test]
    fn test_normalization() {
        assert_eq!(normalize_name("  jane   q.  doe "), "JANE Q. DOE");
        assert_eq!(
            normalize_address("123 Main Street, Suite 4", "55401-1234"),
            Some("123 MAIN ST STE 4|55401".to_string())
        );
        assert_eq!(normalize_address(" , ", "55401"), None);
    }

    fn shared_official_store(count: usize, each: f64) -> AggregateStore {
        let mut builder = SnapshotBuilder::new();
        for i in 0..count {
            let npi = format!("7{i}");
            builder = builder
                .organization(&npi, &format!("Care {i}"), "251E00000X", "MN")
                .official(&npi, if i % 2 == 0 { "John Smith" } else { "john  SMITH" })
                .totals(&npi, each, 1_000, 100);
        }
        builder
            .organization("99", "Unrelated", "251E00000X", "MN")
            .official("99", "Someone Else")
            .totals("99", 5_000_000.0, 1_000, 100)
            .build()
    }

    #[test]
    fn test_shared_official_five_members() {
        let harness = Harness::new(shared_official_store(5, 240_000.0));
        for i in 0..5 {
            let evidence = harness.run(SignalId::SharedOfficial, &format!("7{i}"));
            assert_eq!(evidence.len(), 1);
            assert_eq!(evidence[0].overpayment, 180_000.0);
            assert_eq!(evidence[0].severity, Severity::Medium);
            assert_eq!(evidence[0].group.as_deref(), Some("official:JOHN SMITH"));
        }
        assert!(harness.run(SignalId::SharedOfficial, "99").is_empty());
    }

    #[test]
    fn test_shared_official_below_membership_or_amount() {
        let harness = Harness::new(shared_official_store(4, 1_000_000.0));
        assert!(harness.run(SignalId::SharedOfficial, "70").is_empty());

        let harness = Harness::new(shared_official_store(5, 100_000.0));
        assert!(harness.run(SignalId::SharedOfficial, "70").is_empty());
    }

    #[test]
    fn test_address_cluster() {
        let mut builder = SnapshotBuilder::new();
        for i in 0..12 {
            let npi = format!("8{i:02}");
            let address = if i % 2 == 0 { "500 Oak Avenue #2" } else { "500 OAK AVE 2" };
            builder = builder
                .organization(&npi, "Mail Drop", "251E00000X", "FL")
                .address(&npi, address)
                .zip(&npi, "33101")
                .totals(&npi, 200_000.0, 500, 50);
        }
        let harness = Harness::new(builder.build());
        let evidence = harness.run(SignalId::AddressCluster, "800");
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].overpayment, 240_000.0);
        assert_eq!(evidence[0].severity, Severity::Medium);
    }

    #[test]
    fn test_burst_enrollment_same_quarter() {
        let mut builder = SnapshotBuilder::new();
        for (i, day) in [1, 15, 28, 30].into_iter().enumerate() {
            let npi = format!("3{i}");
            builder = builder
                .organization(&npi, "Burst", "251E00000X", "AZ")
                .registered(&npi, NaiveDate::from_ymd_opt(2022, 4 + i as u32 % 3, day).unwrap())
                .totals(&npi, 150_000.0, 500, 50);
        }
        let store = builder
            .organization("40", "Later", "251E00000X", "AZ")
            .registered("40", ym(2022, 7))
            .totals("40", 150_000.0, 500, 50)
            .build();
        let harness = Harness::new(store);

        let evidence = harness.run(SignalId::BurstEnrollment, "30");
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].overpayment, 60_000.0);
        assert_eq!(evidence[0].group.as_deref(), Some("enrollment:2022Q2/251E00000X/AZ"));
        assert!(harness.run(SignalId::BurstEnrollment, "40").is_empty());
    }

    #[test]
    fn test_coordinated_ramp_peaks_within_window() {
        let mut builder = SnapshotBuilder::new();
        let peaks = [ym(2023, 3), ym(2023, 4), ym(2023, 5), ym(2023, 11)];
        for (i, peak) in peaks.iter().enumerate() {
            let npi = format!("5{i}");
            builder = builder
                .organization(&npi, "Ramp", "251E00000X", "OH")
                .official(&npi, "Pat Lee")
                .month(&npi, ym(2023, 1), 1_000.0, 10, 5)
                .month(&npi, *peak, 100_000.0, 500, 50);
        }
        let harness = Harness::new(builder.build());

        let evidence = harness.run(SignalId::CoordinatedRamp, "50");
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].overpayment, 60_000.0);
        let window = evidence[0].window.unwrap();
        assert_eq!((window.start, window.end), (ym(2023, 3), ym(2023, 5)));
        // The late peak is outside the cluster.
        assert!(harness.run(SignalId::CoordinatedRamp, "53").is_empty());
    }

    fn hub_store(billers: usize, claims: u64, beneficiaries: u64) -> AggregateStore {
        hub_store_paid(billers, 200_000.0, claims, beneficiaries)
    }

    fn hub_store_paid(billers: usize, paid: f64, claims: u64, beneficiaries: u64) -> AggregateStore {
        let mut builder = SnapshotBuilder::new().individual("900", "363A00000X", "NV");
        for i in 0..billers {
            let npi = format!("6{i}");
            builder = builder
                .organization(&npi, "Biller", "261QM1300X", "NV")
                .servicing(&npi, "900", ym(2023, 1), paid, claims, beneficiaries);
        }
        builder.build()
    }

    #[test]
    fn test_servicing_hub() {
        let harness = Harness::new(hub_store(5, 100, 50));
        let evidence = harness.run(SignalId::ServicingHub, "60");
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].overpayment, 150_000.0);
        assert_eq!(evidence[0].group.as_deref(), Some("servicing:900"));

        let harness = Harness::new(hub_store(4, 100, 50));
        assert!(harness.run(SignalId::ServicingHub, "60").is_empty());
    }

    #[test]
    fn test_servicing_spread_excess_over_capacity() {
        let harness = Harness::new(hub_store(5, 500, 5));
        let evidence = harness.run(SignalId::ServicingSpread, "60");
        assert_eq!(evidence.len(), 1);
        // 100 claims/beneficiary against a capacity of 20: 400 excess claims at $400.
        assert_eq!(evidence[0].overpayment, 160_000.0);
        assert_eq!(evidence[0].severity, Severity::Medium);
    }

    #[test]
    fn test_servicing_spread_needs_combined_billing() {
        // Same density as above, but the hub only billed $2,500 in total.
        let harness = Harness::new(hub_store_paid(5, 500.0, 500, 5));
        assert!(harness.run(SignalId::ServicingSpread, "60").is_empty());
    }

    #[test]
    fn test_servicing_spread_zero_beneficiaries_is_not_triggering() {
        let harness = Harness::new(hub_store(5, 500, 0));
        assert!(harness.run(SignalId::ServicingSpread, "60").is_empty());
    }

    fn dilution_store(paid: f64, claims: u64, beneficiaries: u64) -> AggregateStore {
        let mut builder = SnapshotBuilder::new();
        for i in 0..3 {
            let npi = format!("2{i}");
            builder = builder
                .organization(&npi, "Dilute", "251E00000X", "IL")
                .official(&npi, "Chris Park")
                .totals(&npi, paid, claims, beneficiaries);
        }
        builder.build()
    }

    #[test]
    fn test_beneficiary_dilution_needs_combined_billing() {
        // 60 claims per beneficiary, but only $900 billed across the network.
        let harness = Harness::new(dilution_store(300.0, 120, 2));
        for npi in ["20", "21", "22"] {
            assert!(harness.run(SignalId::BeneficiaryDilution, npi).is_empty());
        }
    }

    #[test]
    fn test_beneficiary_dilution() {
        let harness = Harness::new(dilution_store(120_000.0, 1_200, 20));
        let evidence = harness.run(SignalId::BeneficiaryDilution, "20");
        assert_eq!(evidence.len(), 1);
        // 60 claims/beneficiary; capacity 400 claims, 800 excess at $100.
        assert_eq!(evidence[0].overpayment, 80_000.0);
        assert_eq!(evidence[0].severity, Severity::Medium);
    }

    #[test]
    fn test_caregiver_density() {
        let mut builder = SnapshotBuilder::new();
        for i in 0..5 {
            let npi = format!("1{i}");
            builder = builder
                .individual(&npi, "3747P1801X", "MN")
                .zip(&npi, "55411")
                .totals(&npi, 200_000.0, 2_000, 2);
        }
        for (i, zip) in ["55101", "55102", "55103"].into_iter().enumerate() {
            let npi = format!("4{i}");
            builder = builder
                .individual(&npi, "3747P1801X", "MN")
                .zip(&npi, zip)
                .totals(&npi, 50_000.0, 500, 20);
        }
        let harness = Harness::new(builder.build());

        let evidence = harness.run(SignalId::CaregiverDensity, "10");
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].overpayment, 250_000.0);
        assert_eq!(evidence[0].severity, Severity::High);
        assert!(harness.run(SignalId::CaregiverDensity, "40").is_empty());
    }
}
