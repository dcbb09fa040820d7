//! Data models for the signal engine.
//!
//! This module contains the core data structures shared by every stage:
//! providers, signals, evidence, composite scores, correlation summaries
//! and the assembled run report.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Severity of a single piece of evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Medium severity - pattern worth a desk review
    Medium,
    /// High severity - strong statistical evidence of improper billing
    High,
    /// Critical severity - automatic violation (e.g. excluded provider)
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Medium => write!(f, "Medium"),
            Severity::High => write!(f, "High"),
            Severity::Critical => write!(f, "Critical"),
        }
    }
}

impl Severity {
    /// Returns an emoji representation of the severity.
    pub fn emoji(&self) -> &'static str {
        match self {
            Severity::Medium => "🟡",
            Severity::High => "🟠",
            Severity::Critical => "🔴",
        }
    }

    /// One tier lower, never below medium.
    pub fn downgrade(self) -> Self {
        match self {
            Severity::Critical => Severity::High,
            Severity::High | Severity::Medium => Severity::Medium,
        }
    }
}

/// Priority tier derived from the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Low => write!(f, "Low"),
            Tier::Medium => write!(f, "Medium"),
            Tier::High => write!(f, "High"),
            Tier::Critical => write!(f, "Critical"),
        }
    }
}

impl Tier {
    /// Tier for a composite score: critical >= 75, high >= 50, medium >= 25.
    pub fn from_score(score: f64) -> Self {
        if score >= 75.0 {
            Tier::Critical
        } else if score >= 50.0 {
            Tier::High
        } else if score >= 25.0 {
            Tier::Medium
        } else {
            Tier::Low
        }
    }

    /// Returns an emoji representation of the tier.
    pub fn emoji(&self) -> &'static str {
        match self {
            Tier::Low => "🟢",
            Tier::Medium => "🟡",
            Tier::High => "🟠",
            Tier::Critical => "🔴",
        }
    }
}

/// The nineteen fraud archetypes, identified 1 through 19.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalId {
    ExcludedProvider,
    BillingOutlier,
    RapidEscalation,
    WorkforceImpossibility,
    SharedOfficial,
    GeographicImplausibility,
    AddressCluster,
    Upcoding,
    ConcurrentBilling,
    BurstEnrollment,
    CoordinatedRamp,
    ServicingHub,
    BeneficiaryDilution,
    CaregiverDensity,
    ServicingSpread,
    BillingMonoculture,
    RateAnomaly,
    BustOut,
    RepetitiveService,
}

impl SignalId {
    /// All signals in identifier order.
    pub const ALL: [SignalId; 19] = [
        SignalId::ExcludedProvider,
        SignalId::BillingOutlier,
        SignalId::RapidEscalation,
        SignalId::WorkforceImpossibility,
        SignalId::SharedOfficial,
        SignalId::GeographicImplausibility,
        SignalId::AddressCluster,
        SignalId::Upcoding,
        SignalId::ConcurrentBilling,
        SignalId::BurstEnrollment,
        SignalId::CoordinatedRamp,
        SignalId::ServicingHub,
        SignalId::BeneficiaryDilution,
        SignalId::CaregiverDensity,
        SignalId::ServicingSpread,
        SignalId::BillingMonoculture,
        SignalId::RateAnomaly,
        SignalId::BustOut,
        SignalId::RepetitiveService,
    ];

    /// Numeric identifier (1-19).
    pub fn number(self) -> u8 {
        match self {
            SignalId::ExcludedProvider => 1,
            SignalId::BillingOutlier => 2,
            SignalId::RapidEscalation => 3,
            SignalId::WorkforceImpossibility => 4,
            SignalId::SharedOfficial => 5,
            SignalId::GeographicImplausibility => 6,
            SignalId::AddressCluster => 7,
            SignalId::Upcoding => 8,
            SignalId::ConcurrentBilling => 9,
            SignalId::BurstEnrollment => 10,
            SignalId::CoordinatedRamp => 11,
            SignalId::ServicingHub => 12,
            SignalId::BeneficiaryDilution => 13,
            SignalId::CaregiverDensity => 14,
            SignalId::ServicingSpread => 15,
            SignalId::BillingMonoculture => 16,
            SignalId::RateAnomaly => 17,
            SignalId::BustOut => 18,
            SignalId::RepetitiveService => 19,
        }
    }

    pub fn from_number(n: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.number() == n)
    }

    /// Only billing-growth, rate-impossibility and bust-out signals are
    /// dampened inside the temporal anomaly window.
    pub fn is_temporally_adjustable(self) -> bool {
        matches!(
            self,
            SignalId::RapidEscalation | SignalId::WorkforceImpossibility | SignalId::BustOut
        )
    }

    /// Short human-readable title.
    pub fn title(self) -> &'static str {
        match self {
            SignalId::ExcludedProvider => "Excluded provider still billing",
            SignalId::BillingOutlier => "Billing volume outlier",
            SignalId::RapidEscalation => "Rapid billing escalation",
            SignalId::WorkforceImpossibility => "Workforce impossibility",
            SignalId::SharedOfficial => "Shared controlling official",
            SignalId::GeographicImplausibility => "Geographic implausibility",
            SignalId::AddressCluster => "Address clustering",
            SignalId::Upcoding => "E&M upcoding",
            SignalId::ConcurrentBilling => "Concurrent multi-state billing",
            SignalId::BurstEnrollment => "Burst enrollment network",
            SignalId::CoordinatedRamp => "Coordinated billing ramp",
            SignalId::ServicingHub => "Phantom servicing hub",
            SignalId::BeneficiaryDilution => "Network beneficiary dilution",
            SignalId::CaregiverDensity => "Caregiver density anomaly",
            SignalId::ServicingSpread => "Phantom servicing spread",
            SignalId::BillingMonoculture => "Billing monoculture",
            SignalId::RateAnomaly => "Reimbursement rate anomaly",
            SignalId::BustOut => "Bust-out lifecycle",
            SignalId::RepetitiveService => "Repetitive service abuse",
        }
    }

    /// Plain-language description used in narratives.
    pub fn description(self) -> &'static str {
        match self {
            SignalId::ExcludedProvider => {
                "the provider appears on the federal exclusion list yet continued to receive Medicaid payments after the exclusion date"
            }
            SignalId::BillingOutlier => {
                "lifetime billing exceeds the 99th percentile of peers with the same taxonomy in the same state"
            }
            SignalId::RapidEscalation => {
                "a newly enrolled entity grew its billing by more than 200% over trailing three-month windows"
            }
            SignalId::WorkforceImpossibility => {
                "monthly claim volume implies more claims per working hour than the available practitioners could physically deliver"
            }
            SignalId::SharedOfficial => {
                "a single controlling official directs several billing entities whose combined billing is substantial"
            }
            SignalId::GeographicImplausibility => {
                "home health claims are spread over too few beneficiaries or rendered mostly outside the home state"
            }
            SignalId::AddressCluster => {
                "many billing entities share one physical address with high combined billing"
            }
            SignalId::Upcoding => {
                "the share of high-complexity evaluation and management visits far exceeds the peer group"
            }
            SignalId::ConcurrentBilling => {
                "an individual practitioner billed through servicing providers in an implausible number of states in a single month"
            }
            SignalId::BurstEnrollment => {
                "several entities with the same specialty enrolled in the same state and quarter and immediately billed heavily"
            }
            SignalId::CoordinatedRamp => {
                "entities under one controlling official reached their billing peaks within the same short window"
            }
            SignalId::ServicingHub => {
                "one servicing practitioner is billed through many separate billing entities"
            }
            SignalId::BeneficiaryDilution => {
                "a network of commonly controlled entities bills far more claims per beneficiary than care capacity allows"
            }
            SignalId::CaregiverDensity => {
                "home care billing concentrated in one zip code far exceeds the state norm while each caregiver serves very few beneficiaries"
            }
            SignalId::ServicingSpread => {
                "a servicing practitioner's claims across many billing entities cover almost no distinct beneficiaries"
            }
            SignalId::BillingMonoculture => {
                "nearly all billing is concentrated in a single procedure code, atypical for the specialty"
            }
            SignalId::RateAnomaly => {
                "the amount paid per claim for a procedure code is a multiple of the national median rate"
            }
            SignalId::BustOut => {
                "billing ramped up sharply to a peak and then collapsed, matching the bust-out lifecycle"
            }
            SignalId::RepetitiveService => {
                "the same service was billed repeatedly to the same beneficiaries far beyond national norms"
            }
        }
    }

    /// False Claims Act / regulatory basis for the signal.
    pub fn statute(self) -> &'static str {
        match self {
            SignalId::ExcludedProvider => "31 U.S.C. § 3729(a)(1)(A); 42 CFR 1001.1901",
            SignalId::WorkforceImpossibility | SignalId::ServicingSpread => {
                "31 U.S.C. § 3729(a)(1)(B)"
            }
            SignalId::SharedOfficial
            | SignalId::AddressCluster
            | SignalId::BurstEnrollment
            | SignalId::CoordinatedRamp
            | SignalId::ServicingHub
            | SignalId::BeneficiaryDilution
            | SignalId::CaregiverDensity => "31 U.S.C. § 3729(a)(1)(C)",
            SignalId::GeographicImplausibility => "31 U.S.C. § 3729(a)(1)(G)",
            _ => "31 U.S.C. § 3729(a)(1)(A)",
        }
    }

    /// Default relative risk weight used by the severity component.
    pub fn default_risk_weight(self) -> f64 {
        match self {
            SignalId::ExcludedProvider => 1.0,
            SignalId::WorkforceImpossibility
            | SignalId::BustOut
            | SignalId::ServicingSpread
            | SignalId::RepetitiveService => 0.9,
            SignalId::RapidEscalation
            | SignalId::GeographicImplausibility
            | SignalId::ServicingHub
            | SignalId::BeneficiaryDilution
            | SignalId::CaregiverDensity
            | SignalId::RateAnomaly => 0.8,
            SignalId::BillingOutlier
            | SignalId::SharedOfficial
            | SignalId::Upcoding
            | SignalId::ConcurrentBilling
            | SignalId::CoordinatedRamp => 0.7,
            SignalId::AddressCluster | SignalId::BurstEnrollment | SignalId::BillingMonoculture => {
                0.6
            }
        }
    }

    /// False Claims Act theory the signal supports.
    pub fn claim_type(self) -> &'static str {
        match self {
            SignalId::ExcludedProvider => {
                "Presenting false claims: an excluded provider cannot lawfully bill federal healthcare programs"
            }
            SignalId::BillingOutlier => "Overbilling: billing far exceeds peer group norms",
            SignalId::RapidEscalation => {
                "Bust-out scheme: newly enumerated entity with rapid billing escalation"
            }
            SignalId::WorkforceImpossibility => {
                "False records: billing volume implies physically impossible claim fabrication"
            }
            SignalId::SharedOfficial => {
                "Conspiracy: coordinated billing through multiple entities controlled by one individual"
            }
            SignalId::GeographicImplausibility => {
                "Reverse false claims: home health services billed without plausible delivery"
            }
            SignalId::AddressCluster => {
                "Conspiracy: many billing entities operating from one physical address"
            }
            SignalId::Upcoding => "False claims: visits billed above the complexity delivered",
            SignalId::ConcurrentBilling => {
                "False claims: services billed in more states than one practitioner could reach"
            }
            SignalId::BurstEnrollment => {
                "Conspiracy: coordinated enrollment of entities that bill immediately"
            }
            SignalId::CoordinatedRamp => {
                "Conspiracy: synchronized billing ramps across commonly controlled entities"
            }
            SignalId::ServicingHub => {
                "Conspiracy: one practitioner's services billed through many separate entities"
            }
            SignalId::BeneficiaryDilution => {
                "Conspiracy: network billing beyond the care capacity of its beneficiaries"
            }
            SignalId::CaregiverDensity => {
                "Conspiracy: concentrated home care billing by caregivers serving few beneficiaries"
            }
            SignalId::ServicingSpread => {
                "False records: services attributed to a practitioner beyond any plausible caseload"
            }
            SignalId::BillingMonoculture => {
                "Service fabrication: billing concentrated in a single procedure code"
            }
            SignalId::RateAnomaly => "Overbilling: paid amounts far above the national rate",
            SignalId::BustOut => "Bust-out scheme: billing ramped to a peak and then abandoned",
            SignalId::RepetitiveService => {
                "Medically unnecessary services: the same service billed repeatedly to the same beneficiaries"
            }
        }
    }

    /// Suggested investigation steps for a case led by this signal.
    /// `{npi}` and `{state}` are placeholders for the provider.
    pub fn investigation_steps(self) -> &'static [&'static str] {
        match self {
            SignalId::ExcludedProvider => &[
                "Verify exclusion status of NPI {npi} on the OIG LEIE database and confirm the dates",
                "Pull every claim submitted by NPI {npi} since the exclusion date from the {state} Medicaid agency",
                "Identify the managed care organizations that processed the claims",
            ],
            SignalId::BillingOutlier | SignalId::Upcoding | SignalId::BillingMonoculture => &[
                "Request detailed claims for NPI {npi} and compare the procedure code mix to the {state} peer group",
                "Audit a sample of medical records for the dominant or highest-paid codes",
                "Verify NPI {npi} is actively practicing at the registered address",
            ],
            SignalId::RapidEscalation | SignalId::BustOut | SignalId::BurstEnrollment => &[
                "Investigate ownership changes for NPI {npi} around the enumeration date",
                "Request detailed claims for the first twelve months of billing",
                "Check {state} enrollment records for owners or officials previously associated with excluded entities",
            ],
            SignalId::WorkforceImpossibility | SignalId::ConcurrentBilling => &[
                "Request employment records for the licensed practitioners billing under NPI {npi}",
                "Compare staffing levels to claim volume for the flagged months",
                "Review claims for identical procedures billed on the same dates",
            ],
            SignalId::SharedOfficial
            | SignalId::AddressCluster
            | SignalId::CoordinatedRamp
            | SignalId::BeneficiaryDilution => &[
                "Map the corporate structure and beneficial ownership of every entity grouped with NPI {npi}",
                "Check for cross-referrals between the entities suggesting kickback arrangements",
                "Cross-reference {state} Medicaid enrollment records for shared beneficiaries and addresses",
            ],
            SignalId::ServicingHub | SignalId::ServicingSpread => &[
                "Confirm the servicing practitioner actually rendered services billed by NPI {npi}",
                "Compare the practitioner's schedule against claims across all billing entities",
                "Interview a sample of beneficiaries to confirm the services were received",
            ],
            SignalId::GeographicImplausibility | SignalId::CaregiverDensity => &[
                "Verify beneficiary addresses for NPI {npi} against the locations where home services were billed",
                "Request visit logs and compare them to billed service dates",
                "Cross-reference other {state} payers for duplicate billing of the same home services",
            ],
            SignalId::RateAnomaly | SignalId::RepetitiveService => &[
                "Request remittance data for NPI {npi} on the flagged procedure codes",
                "Compare billed units and amounts to the {state} fee schedule",
                "Audit medical necessity documentation for repeated services",
            ],
        }
    }

    /// Investigation steps filled in for one provider.
    pub fn investigation_steps_for(self, provider: &Provider) -> Vec<String> {
        self.investigation_steps()
            .iter()
            .map(|step| {
                step.replace("{npi}", &provider.npi)
                    .replace("{state}", &provider.state)
            })
            .collect()
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.number(), self.title())
    }
}

impl FromStr for SignalId {
    type Err = String;

    /// Accepts a signal number ("5") or its snake_case name ("shared_official").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(n) = s.parse::<u8>() {
            return SignalId::from_number(n).ok_or_else(|| format!("no signal numbered {n}"));
        }
        serde_json::from_value(serde_json::Value::String(s.to_ascii_lowercase()))
            .map_err(|_| format!("unknown signal: {s}"))
    }
}

/// Registry classification of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Individual,
    Organization,
}

/// Immutable reference data for one billing provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    /// Registry identity key (NPI).
    pub npi: String,
    /// Display name (organization name or "First Last").
    pub name: String,
    /// Individual or organization.
    pub kind: EntityKind,
    /// Primary taxonomy code.
    #[serde(default)]
    pub taxonomy: String,
    /// Practice location state.
    #[serde(default)]
    pub state: String,
    /// Practice location zip code.
    #[serde(default)]
    pub zip: String,
    /// Practice location address line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Registry enumeration date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_date: Option<NaiveDate>,
    /// Controlling / authorized official names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub officials: Vec<String>,
}

/// Inclusive span of claim months.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl MonthWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    /// Window covering every month in `months` (None when empty).
    pub fn spanning(months: impl IntoIterator<Item = NaiveDate>) -> Option<Self> {
        let mut iter = months.into_iter();
        let first = iter.next()?;
        let (start, end) = iter.fold((first, first), |(lo, hi), m| (lo.min(m), hi.max(m)));
        Some(Self { start, end })
    }

    pub fn overlaps(&self, other: &MonthWindow) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn contains(&self, month: NaiveDate) -> bool {
        self.start <= month && month <= self.end
    }

    /// Returns the window formatted as `YYYY-MM..YYYY-MM`.
    pub fn label(&self) -> String {
        format!(
            "{:04}-{:02}..{:04}-{:02}",
            self.start.year(),
            self.start.month(),
            self.end.year(),
            self.end.month()
        )
    }
}

/// One triggered signal for one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    /// Which archetype triggered.
    pub signal: SignalId,
    /// Severity after any temporal adjustment.
    pub severity: Severity,
    /// Numeric facts that justified the trigger.
    pub detail: serde_json::Value,
    /// Estimated overpayment in USD (never negative).
    pub overpayment: f64,
    /// Statute / regulatory basis.
    pub statute: String,
    /// Months of the triggering activity, when time-bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<MonthWindow>,
    /// The individual triggering months, when they are not contiguous.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub months: Vec<NaiveDate>,
    /// Network group the evidence references, when group-based.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Contextual annotation (e.g. pandemic-era adjustment).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
    /// Whether the temporal context adjuster already applied.
    #[serde(default)]
    pub context_adjusted: bool,
}

impl Evidence {
    /// Creates a new evidence record with the signal's statute reference.
    pub fn new(
        signal: SignalId,
        severity: Severity,
        overpayment: f64,
        detail: serde_json::Value,
    ) -> Self {
        Self {
            signal,
            severity,
            detail,
            overpayment: round_cents(overpayment.max(0.0)),
            statute: signal.statute().to_string(),
            window: None,
            months: Vec::new(),
            group: None,
            annotation: None,
            context_adjusted: false,
        }
    }

    pub fn with_window(mut self, window: Option<MonthWindow>) -> Self {
        self.window = window;
        self
    }

    /// Records the triggering months and the window spanning them.
    pub fn with_months(mut self, mut months: Vec<NaiveDate>) -> Self {
        months.sort();
        months.dedup();
        self.window = MonthWindow::spanning(months.iter().copied());
        self.months = months;
        self
    }

    /// Whether any triggering month falls inside `interval`. Records
    /// without individual months fall back to their window.
    pub fn active_during(&self, interval: &MonthWindow) -> bool {
        if self.months.is_empty() {
            self.window.map(|w| w.overlaps(interval)).unwrap_or(false)
        } else {
            self.months.iter().any(|m| interval.contains(*m))
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }
}

/// Breakdown of the composite score into its weighted components.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Distinct-signal breadth (0-30).
    pub breadth: f64,
    /// Weighted severity (0-40).
    pub severity: f64,
    /// Overpayment relative to lifetime billing (0-30).
    pub overpayment_ratio: f64,
}

/// Composite 0-100 risk score and tier for a provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompositeScore {
    pub total: f64,
    pub tier: Tier,
    pub breakdown: ScoreBreakdown,
}

/// Final per-provider output: evidence, score and narrative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCase {
    pub provider: Provider,
    /// Lifetime paid amount (0 when the totals aggregate is missing).
    pub total_paid: f64,
    pub total_claims: u64,
    pub total_beneficiaries: u64,
    /// Surviving evidence after adjustment and exemption filtering.
    pub evidence: Vec<Evidence>,
    pub score: CompositeScore,
    /// Sum of the evidence overpayments.
    pub estimated_overpayment: f64,
    /// False Claims Act theories, one per distinct signal.
    #[serde(default)]
    pub claim_types: Vec<String>,
    /// Investigation steps for the leading signal.
    #[serde(default)]
    pub next_steps: Vec<String>,
    pub narrative: String,
}

impl ProviderCase {
    /// Distinct signals in identifier order.
    pub fn distinct_signals(&self) -> Vec<SignalId> {
        let mut signals: Vec<SignalId> = self.evidence.iter().map(|e| e.signal).collect();
        signals.sort();
        signals.dedup();
        signals
    }

    /// Highest evidence severity.
    pub fn top_severity(&self) -> Option<Severity> {
        self.evidence.iter().map(|e| e.severity).max()
    }
}

/// Co-occurrence count for an unordered pair of signals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairCount {
    /// Lower-numbered signal of the pair.
    pub first: SignalId,
    /// Higher-numbered signal of the pair.
    pub second: SignalId,
    pub providers: usize,
}

/// Provider triggering several distinct signals, queued for priority review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityCandidate {
    pub npi: String,
    pub name: String,
    pub distinct_signals: usize,
    pub score: f64,
    pub tier: Tier,
}

/// Population-level co-occurrence structure of the flagged set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorrelationSummary {
    /// Number of flagged providers.
    pub flagged_providers: usize,
    /// Distinct-signal count -> number of providers.
    pub signal_count_histogram: BTreeMap<usize, usize>,
    /// Signal -> number of providers triggering it.
    pub signal_frequency: BTreeMap<SignalId, usize>,
    /// Unordered pairs with at least one co-occurrence.
    pub pairs: Vec<PairCount>,
    /// Providers with three or more distinct signals.
    pub priority_candidates: Vec<PriorityCandidate>,
}

impl CorrelationSummary {
    /// Number of providers triggering both signals (order-insensitive).
    pub fn pair_count(&self, a: SignalId, b: SignalId) -> usize {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        self.pairs
            .iter()
            .find(|p| p.first == first && p.second == second)
            .map(|p| p.providers)
            .unwrap_or(0)
    }
}

/// Summary of flagged providers by tier and signal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TierSummary {
    /// Total number of flagged providers.
    pub total: usize,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    /// Evidence count per signal title.
    pub by_signal: BTreeMap<String, usize>,
}

impl TierSummary {
    /// Creates a summary from a list of cases.
    pub fn from_cases(cases: &[ProviderCase]) -> Self {
        let mut summary = Self {
            total: cases.len(),
            ..Self::default()
        };

        for case in cases {
            match case.score.tier {
                Tier::Critical => summary.critical += 1,
                Tier::High => summary.high += 1,
                Tier::Medium => summary.medium += 1,
                Tier::Low => summary.low += 1,
            }

            for evidence in &case.evidence {
                *summary
                    .by_signal
                    .entry(evidence.signal.title().to_string())
                    .or_insert(0) += 1;
            }
        }

        summary
    }
}

/// Metadata about a detection run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Date and time the report was generated.
    pub generated_at: DateTime<Utc>,
    /// Version of this tool.
    pub tool_version: String,
    /// Aggregate snapshot the run consumed.
    pub input: String,
    /// Signals evaluated, by number.
    pub signals_run: Vec<u8>,
    /// Number of providers evaluated.
    pub providers_scanned: usize,
    /// Number of providers with surviving evidence.
    pub providers_flagged: usize,
    /// Sum of all estimated overpayments.
    pub total_estimated_overpayment: f64,
    /// Duration of the run in seconds.
    pub duration_seconds: f64,
}

/// The complete detection report handed to the renderers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub metadata: ReportMetadata,
    pub summary: TierSummary,
    /// Flagged providers, highest score first.
    pub cases: Vec<ProviderCase>,
    pub correlation: CorrelationSummary,
}

/// Rounds a dollar amount to cents.
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn month(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    #[test]
    fn test_severity_ordering_and_downgrade() {
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
        assert_eq!(Severity::Critical.downgrade(), Severity::High);
        assert_eq!(Severity::High.downgrade(), Severity::Medium);
        assert_eq!(Severity::Medium.downgrade(), Severity::Medium);
    }

    #[test]
    fn test_tier_breakpoints() {
        assert_eq!(Tier::from_score(74.0), Tier::High);
        assert_eq!(Tier::from_score(74.99), Tier::High);
        assert_eq!(Tier::from_score(75.0), Tier::Critical);
        assert_eq!(Tier::from_score(50.0), Tier::High);
        assert_eq!(Tier::from_score(49.9), Tier::Medium);
        assert_eq!(Tier::from_score(25.0), Tier::Medium);
        assert_eq!(Tier::from_score(24.9), Tier::Low);
        assert_eq!(Tier::from_score(0.0), Tier::Low);
    }

    #[test]
    fn test_signal_numbers_round_trip() {
        for (i, signal) in SignalId::ALL.iter().enumerate() {
            assert_eq!(signal.number() as usize, i + 1);
            assert_eq!(SignalId::from_number(signal.number()), Some(*signal));
        }
        assert_eq!(SignalId::from_number(0), None);
        assert_eq!(SignalId::from_number(20), None);
    }

    #[test]
    fn test_only_three_signals_are_temporally_adjustable() {
        let adjustable: Vec<u8> = SignalId::ALL
            .iter()
            .filter(|s| s.is_temporally_adjustable())
            .map(|s| s.number())
            .collect();
        assert_eq!(adjustable, vec![3, 4, 18]);
    }

    #[test]
    fn test_every_signal_has_investigation_steps() {
        for signal in SignalId::ALL {
            assert!(signal.investigation_steps().len() >= 2, "{}", signal);
            assert!(signal.statute().starts_with("31 U.S.C."));
        }
    }

    #[test]
    fn test_steps_name_the_provider() {
        let provider = Provider {
            npi: "1234567890".to_string(),
            name: "Acme".to_string(),
            kind: EntityKind::Organization,
            taxonomy: "251E00000X".to_string(),
            state: "MN".to_string(),
            zip: String::new(),
            address: None,
            registration_date: None,
            officials: Vec::new(),
        };
        let steps = SignalId::ExcludedProvider.investigation_steps_for(&provider);
        assert!(steps[0].contains("NPI 1234567890"));
        assert!(steps[1].contains("the MN Medicaid agency"));
        for signal in SignalId::ALL {
            for step in signal.investigation_steps_for(&provider) {
                assert!(!step.contains('{'), "{}: {}", signal, step);
            }
            assert!(!signal.claim_type().is_empty());
        }
    }

    #[test]
    fn test_month_window_overlap() {
        let pandemic = MonthWindow::new(month(2020, 3), month(2021, 12));
        assert!(MonthWindow::new(month(2021, 6), month(2022, 3)).overlaps(&pandemic));
        assert!(MonthWindow::new(month(2019, 1), month(2020, 3)).overlaps(&pandemic));
        assert!(!MonthWindow::new(month(2022, 1), month(2022, 6)).overlaps(&pandemic));
        assert_eq!(pandemic.label(), "2020-03..2021-12");
    }

    #[test]
    fn test_active_during_checks_each_month() {
        let pandemic = MonthWindow::new(month(2020, 3), month(2021, 12));
        let evidence = Evidence::new(SignalId::WorkforceImpossibility, Severity::High, 1.0, json!({}))
            .with_months(vec![month(2022, 6), month(2019, 6)]);
        assert_eq!(evidence.window, Some(MonthWindow::new(month(2019, 6), month(2022, 6))));
        assert!(!evidence.active_during(&pandemic));

        let evidence = evidence.with_months(vec![month(2019, 6), month(2021, 12)]);
        assert!(evidence.active_during(&pandemic));
    }

    #[test]
    fn test_month_window_spanning() {
        let window = MonthWindow::spanning(vec![month(2023, 4), month(2023, 1), month(2023, 6)]);
        assert_eq!(window, Some(MonthWindow::new(month(2023, 1), month(2023, 6))));
        assert_eq!(MonthWindow::spanning(Vec::new()), None);
    }

    #[test]
    fn test_evidence_overpayment_never_negative() {
        let evidence = Evidence::new(SignalId::BillingOutlier, Severity::High, -12.5, json!({}));
        assert_eq!(evidence.overpayment, 0.0);
        assert_eq!(evidence.statute, "31 U.S.C. § 3729(a)(1)(A)");

        let evidence = Evidence::new(SignalId::BillingOutlier, Severity::High, 10.006, json!({}));
        assert_eq!(evidence.overpayment, 10.01);
    }

    #[test]
    fn test_signal_from_str() {
        assert_eq!("5".parse::<SignalId>(), Ok(SignalId::SharedOfficial));
        assert_eq!(
            "bust_out".parse::<SignalId>(),
            Ok(SignalId::BustOut)
        );
        assert_eq!(" Upcoding ".parse::<SignalId>(), Ok(SignalId::Upcoding));
        assert!("20".parse::<SignalId>().is_err());
        assert!("nonsense".parse::<SignalId>().is_err());
    }

    #[test]
    fn test_signal_serializes_as_snake_case() {
        let json = serde_json::to_string(&SignalId::WorkforceImpossibility).unwrap();
        assert_eq!(json, "\"workforce_impossibility\"");
    }
}
