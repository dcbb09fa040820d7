//! Signal evaluators.
//!
//! Each of the nineteen fraud archetypes is a pure function from the
//! aggregate store (plus precomputed cohort and network tables) to zero
//! or more [`Evidence`] records for one provider. [`evaluate`] dispatches
//! on [`SignalId`]; adding a signal means adding a variant and a match arm.

pub mod exclusion;
pub mod growth;
pub mod network;
pub mod peer;
pub mod thresholds;
pub mod volume;

use crate::aggregates::AggregateStore;
use crate::cohort::CohortTables;
use crate::error::EngineError;
use crate::exemption::ElevatedBars;
use crate::models::{Evidence, Provider, SignalId};
use network::NetworkIndex;
use thresholds::Thresholds;

/// Outcome of a single (provider, signal) evaluation.
pub type SignalResult = Result<Option<Evidence>, EngineError>;

/// Read-only inputs shared by every evaluator.
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    pub store: &'a AggregateStore,
    pub cohorts: &'a CohortTables,
    pub networks: &'a NetworkIndex,
    pub thresholds: &'a Thresholds,
    elevation: Option<&'a ElevatedBars>,
}

impl<'a> EvalContext<'a> {
    pub fn new(
        store: &'a AggregateStore,
        cohorts: &'a CohortTables,
        networks: &'a NetworkIndex,
        thresholds: &'a Thresholds,
    ) -> Self {
        Self {
            store,
            cohorts,
            networks,
            thresholds,
            elevation: None,
        }
    }

    /// Same inputs, evaluated against the elevated bar.
    pub fn elevated(&self, bars: &'a ElevatedBars) -> Self {
        Self {
            elevation: Some(bars),
            ..*self
        }
    }

    /// Multiplier on the triggering bar (1.0 for the standard pass).
    pub fn bar(&self, signal: SignalId) -> f64 {
        self.elevation.map(|e| e.bar_for(signal)).unwrap_or(1.0)
    }

    /// A "greater than" threshold or minimum amount, raised by the bar.
    pub fn scaled(&self, signal: SignalId, threshold: f64) -> f64 {
        threshold * self.bar(signal)
    }

    /// A share floor in [0, 1], moved toward 1 by the bar.
    pub fn floor(&self, signal: SignalId, share: f64) -> f64 {
        1.0 - (1.0 - share) / self.bar(signal)
    }

    /// A "less than" ratio minimum, lowered by the bar.
    pub fn minimum(&self, signal: SignalId, ratio: f64) -> f64 {
        ratio / self.bar(signal)
    }
}

/// Evaluates one signal for one provider.
pub fn evaluate(
    signal: SignalId,
    ctx: &EvalContext<'_>,
    provider: &Provider,
) -> Result<Vec<Evidence>, EngineError> {
    let result = match signal {
        SignalId::ExcludedProvider => exclusion::excluded_provider(ctx, provider),
        SignalId::BillingOutlier => peer::billing_outlier(ctx, provider),
        SignalId::RapidEscalation => growth::rapid_escalation(ctx, provider),
        SignalId::WorkforceImpossibility => volume::workforce_impossibility(ctx, provider),
        SignalId::SharedOfficial => network::shared_official(ctx, provider),
        SignalId::GeographicImplausibility => volume::geographic_implausibility(ctx, provider),
        SignalId::AddressCluster => network::address_cluster(ctx, provider),
        SignalId::Upcoding => peer::upcoding(ctx, provider),
        SignalId::ConcurrentBilling => peer::concurrent_billing(ctx, provider),
        SignalId::BurstEnrollment => network::burst_enrollment(ctx, provider),
        SignalId::CoordinatedRamp => network::coordinated_ramp(ctx, provider),
        SignalId::ServicingHub => network::servicing_hub(ctx, provider),
        SignalId::BeneficiaryDilution => network::beneficiary_dilution(ctx, provider),
        SignalId::CaregiverDensity => network::caregiver_density(ctx, provider),
        SignalId::ServicingSpread => network::servicing_spread(ctx, provider),
        SignalId::BillingMonoculture => peer::billing_monoculture(ctx, provider),
        SignalId::RateAnomaly => peer::rate_anomaly(ctx, provider),
        SignalId::BustOut => growth::bust_out(ctx, provider),
        SignalId::RepetitiveService => peer::repetitive_service(ctx, provider),
    };
    result.map(|evidence| evidence.into_iter().collect())
}

/// Rounds a ratio for display in evidence detail.
pub(crate) fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
