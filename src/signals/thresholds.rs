//! Calibration constants for the nineteen signals.
//!
//! Every value here is a default that can be overridden from the
//! `[thresholds]` table of the configuration file, one sub-table per
//! signal (e.g. `[thresholds.shared_official]`).

use serde::{Deserialize, Serialize};

/// Home health and personal care taxonomy prefixes.
fn home_health_prefixes() -> Vec<String> {
    ["251E", "251J", "3747"].into_iter().map(String::from).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Smallest peer group for which percentiles are computed.
    pub min_cohort_size: usize,
    /// Working hours assumed per practitioner per month.
    pub hours_per_month: f64,
    pub billing_outlier: BillingOutlierThresholds,
    pub rapid_escalation: RapidEscalationThresholds,
    pub workforce: WorkforceThresholds,
    pub shared_official: SharedOfficialThresholds,
    pub geographic: GeographicThresholds,
    pub address_cluster: AddressClusterThresholds,
    pub upcoding: UpcodingThresholds,
    pub concurrent_billing: ConcurrentBillingThresholds,
    pub burst_enrollment: BurstEnrollmentThresholds,
    pub coordinated_ramp: CoordinatedRampThresholds,
    pub servicing_hub: ServicingHubThresholds,
    pub beneficiary_dilution: BeneficiaryDilutionThresholds,
    pub caregiver_density: CaregiverDensityThresholds,
    pub servicing_spread: ServicingSpreadThresholds,
    pub monoculture: MonocultureThresholds,
    pub rate_anomaly: RateAnomalyThresholds,
    pub bust_out: BustOutThresholds,
    pub repetitive_service: RepetitiveServiceThresholds,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_cohort_size: 5,
            hours_per_month: 176.0,
            billing_outlier: BillingOutlierThresholds::default(),
            rapid_escalation: RapidEscalationThresholds::default(),
            workforce: WorkforceThresholds::default(),
            shared_official: SharedOfficialThresholds::default(),
            geographic: GeographicThresholds::default(),
            address_cluster: AddressClusterThresholds::default(),
            upcoding: UpcodingThresholds::default(),
            concurrent_billing: ConcurrentBillingThresholds::default(),
            burst_enrollment: BurstEnrollmentThresholds::default(),
            coordinated_ramp: CoordinatedRampThresholds::default(),
            servicing_hub: ServicingHubThresholds::default(),
            beneficiary_dilution: BeneficiaryDilutionThresholds::default(),
            caregiver_density: CaregiverDensityThresholds::default(),
            servicing_spread: ServicingSpreadThresholds::default(),
            monoculture: MonocultureThresholds::default(),
            rate_anomaly: RateAnomalyThresholds::default(),
            bust_out: BustOutThresholds::default(),
            repetitive_service: RepetitiveServiceThresholds::default(),
        }
    }
}

/// Shared shape of the fixed-percentage network signals (5, 10, 12).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupRule {
    pub min_members: usize,
    pub min_combined_paid: f64,
    /// Fraction of combined group billing attributed to each member.
    pub overpayment_share: f64,
    pub high_combined_paid: f64,
}

macro_rules! group_thresholds {
    ($name:ident, $members:expr, $combined:expr, $share:expr, $high:expr) => {
        #[derive(Debug, Clone, Serialize, Deserialize)]
        #[serde(default)]
        pub struct $name {
            pub min_members: usize,
            pub min_combined_paid: f64,
            pub overpayment_share: f64,
            pub high_combined_paid: f64,
        }

        impl Default for $name {
            fn default() -> Self {
                Self {
                    min_members: $members,
                    min_combined_paid: $combined,
                    overpayment_share: $share,
                    high_combined_paid: $high,
                }
            }
        }

        impl $name {
            pub fn rule(&self) -> GroupRule {
                GroupRule {
                    min_members: self.min_members,
                    min_combined_paid: self.min_combined_paid,
                    overpayment_share: self.overpayment_share,
                    high_combined_paid: self.high_combined_paid,
                }
            }
        }
    };
}

group_thresholds!(SharedOfficialThresholds, 5, 1_000_000.0, 0.15, 5_000_000.0);
group_thresholds!(BurstEnrollmentThresholds, 4, 500_000.0, 0.10, 2_000_000.0);
group_thresholds!(ServicingHubThresholds, 5, 500_000.0, 0.15, 5_000_000.0);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BillingOutlierThresholds {
    /// Severity is high above this multiple of the cohort median.
    pub high_median_multiple: f64,
}

impl Default for BillingOutlierThresholds {
    fn default() -> Self {
        Self {
            high_median_multiple: 5.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RapidEscalationThresholds {
    pub max_registration_gap_months: i32,
    pub observation_months: i32,
    pub growth_pct: f64,
    pub min_baseline_paid: f64,
    pub min_anomalous_months: usize,
    pub high_growth_pct: f64,
}

impl Default for RapidEscalationThresholds {
    fn default() -> Self {
        Self {
            max_registration_gap_months: 24,
            observation_months: 12,
            growth_pct: 200.0,
            min_baseline_paid: 100.0,
            min_anomalous_months: 2,
            high_growth_pct: 1000.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkforceThresholds {
    pub max_claims_per_hour: f64,
    pub high_rate_multiple: f64,
}

impl Default for WorkforceThresholds {
    fn default() -> Self {
        Self {
            max_claims_per_hour: 6.0,
            high_rate_multiple: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeographicThresholds {
    pub taxonomy_prefixes: Vec<String>,
    pub min_beneficiary_ratio: f64,
    pub min_home_state_ratio: f64,
    /// Severity is high when excess claims exceed this share of all claims.
    pub high_excess_share: f64,
}

impl Default for GeographicThresholds {
    fn default() -> Self {
        Self {
            taxonomy_prefixes: home_health_prefixes(),
            min_beneficiary_ratio: 0.1,
            min_home_state_ratio: 0.5,
            high_excess_share: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressClusterThresholds {
    pub min_members: usize,
    pub min_combined_paid: f64,
    pub overpayment_share: f64,
    pub high_members: usize,
    pub high_combined_paid: f64,
}

impl Default for AddressClusterThresholds {
    fn default() -> Self {
        Self {
            min_members: 10,
            min_combined_paid: 2_000_000.0,
            overpayment_share: 0.10,
            high_members: 20,
            high_combined_paid: 10_000_000.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpcodingThresholds {
    pub em_codes: Vec<String>,
    pub high_complexity_codes: Vec<String>,
    /// Floor on the share threshold regardless of the cohort p90.
    pub min_share: f64,
    pub min_em_claims: u64,
    pub overpayment_share: f64,
    pub high_share: f64,
}

impl Default for UpcodingThresholds {
    fn default() -> Self {
        let em = [
            "99201", "99202", "99203", "99204", "99205", "99211", "99212", "99213", "99214",
            "99215", "99221", "99222", "99223", "99231", "99232", "99233", "99241", "99242",
            "99243", "99244", "99245", "99251", "99252", "99253", "99254", "99255",
        ];
        let high = ["99205", "99215", "99223", "99233", "99245", "99255"];
        Self {
            em_codes: em.into_iter().map(String::from).collect(),
            high_complexity_codes: high.into_iter().map(String::from).collect(),
            min_share: 0.5,
            min_em_claims: 50,
            overpayment_share: 0.30,
            high_share: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrentBillingThresholds {
    pub min_states: usize,
    pub high_states: usize,
}

impl Default for ConcurrentBillingThresholds {
    fn default() -> Self {
        Self {
            min_states: 4,
            high_states: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatedRampThresholds {
    pub min_members: usize,
    /// Peaks must fall within this many consecutive months.
    pub peak_span_months: i32,
    pub min_combined_peak: f64,
    pub overpayment_share: f64,
    pub high_combined_peak: f64,
}

impl Default for CoordinatedRampThresholds {
    fn default() -> Self {
        Self {
            min_members: 3,
            peak_span_months: 3,
            min_combined_peak: 200_000.0,
            overpayment_share: 0.20,
            high_combined_peak: 1_000_000.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BeneficiaryDilutionThresholds {
    pub min_members: usize,
    pub min_combined_paid: f64,
    pub max_claims_per_beneficiary: f64,
    /// Claims per beneficiary treated as legitimate capacity.
    pub capacity_per_beneficiary: f64,
    pub high_ratio_multiple: f64,
}

impl Default for BeneficiaryDilutionThresholds {
    fn default() -> Self {
        Self {
            min_members: 3,
            min_combined_paid: 250_000.0,
            max_claims_per_beneficiary: 50.0,
            capacity_per_beneficiary: 20.0,
            high_ratio_multiple: 3.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaregiverDensityThresholds {
    pub taxonomy_prefixes: Vec<String>,
    pub min_members: usize,
    pub state_median_multiple: f64,
    pub min_state_zips: usize,
    pub max_avg_beneficiaries: f64,
    pub overpayment_share: f64,
    pub high_trigger_multiple: f64,
}

impl Default for CaregiverDensityThresholds {
    fn default() -> Self {
        Self {
            taxonomy_prefixes: home_health_prefixes(),
            min_members: 5,
            state_median_multiple: 3.0,
            min_state_zips: 3,
            max_avg_beneficiaries: 3.0,
            overpayment_share: 0.25,
            high_trigger_multiple: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicingSpreadThresholds {
    pub min_billers: usize,
    pub min_combined_paid: f64,
    pub capacity_per_beneficiary: f64,
    pub high_capacity_multiple: f64,
}

impl Default for ServicingSpreadThresholds {
    fn default() -> Self {
        Self {
            min_billers: 5,
            min_combined_paid: 500_000.0,
            capacity_per_beneficiary: 20.0,
            high_capacity_multiple: 5.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonocultureThresholds {
    pub min_share: f64,
    pub min_paid: f64,
    pub high_share: f64,
}

impl Default for MonocultureThresholds {
    fn default() -> Self {
        Self {
            min_share: 0.9,
            min_paid: 50_000.0,
            high_share: 0.98,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateAnomalyThresholds {
    pub median_multiple: f64,
    pub min_claims: u64,
    pub high_trigger_multiple: f64,
}

impl Default for RateAnomalyThresholds {
    fn default() -> Self {
        Self {
            median_multiple: 3.0,
            min_claims: 10,
            high_trigger_multiple: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BustOutThresholds {
    pub min_peak_paid: f64,
    pub ramp_months: i32,
    pub growth_pct: f64,
    pub collapse_months: i32,
    /// Collapse means falling below this fraction of the peak.
    pub collapse_share: f64,
    pub critical_growth_pct: f64,
    pub critical_collapse_share: f64,
}

impl Default for BustOutThresholds {
    fn default() -> Self {
        Self {
            min_peak_paid: 50_000.0,
            ramp_months: 3,
            growth_pct: 200.0,
            collapse_months: 3,
            collapse_share: 0.10,
            critical_growth_pct: 1000.0,
            critical_collapse_share: 0.02,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepetitiveServiceThresholds {
    pub min_claims: u64,
    pub high_median_multiple: f64,
}

impl Default for RepetitiveServiceThresholds {
    fn default() -> Self {
        Self {
            min_claims: 200,
            high_median_multiple: 5.0,
        }
    }
}

impl Thresholds {
    /// Whether a taxonomy code is home health / personal care.
    pub fn is_home_health(&self, taxonomy: &str) -> bool {
        self.geographic
            .taxonomy_prefixes
            .iter()
            .any(|p| taxonomy.starts_with(p.as_str()))
    }

    /// Checks values that would make the rules meaningless.
    pub fn validate(&self) -> Result<(), String> {
        if self.min_cohort_size == 0 {
            return Err("thresholds.min_cohort_size must be at least 1".to_string());
        }
        if self.hours_per_month <= 0.0 {
            return Err("thresholds.hours_per_month must be positive".to_string());
        }
        let shares = [
            ("shared_official", self.shared_official.overpayment_share),
            ("burst_enrollment", self.burst_enrollment.overpayment_share),
            ("servicing_hub", self.servicing_hub.overpayment_share),
            ("address_cluster", self.address_cluster.overpayment_share),
            ("coordinated_ramp", self.coordinated_ramp.overpayment_share),
            ("caregiver_density", self.caregiver_density.overpayment_share),
            ("upcoding", self.upcoding.overpayment_share),
        ];
        for (name, share) in shares {
            if !(0.0..=1.0).contains(&share) {
                return Err(format!(
                    "thresholds.{name}.overpayment_share must be between 0 and 1"
                ));
            }
        }
        Ok(())
    }
}
