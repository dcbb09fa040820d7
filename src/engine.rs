//! Detection pipeline.
//!
//! For every provider: evaluate the selected signals, apply the temporal
//! adjuster, apply the exemption filter, score and narrate. Providers are
//! independent once the cohort and network tables exist, so the per-provider
//! work fans out over rayon and the results are merged into a map keyed by
//! NPI. The correlator runs over the merged population.

use crate::aggregates::AggregateStore;
use crate::cohort::CohortTables;
use crate::config::Config;
use crate::correlation::correlate;
use crate::error::EngineError;
use crate::exemption::{Classification, ExemptionFilter};
use crate::models::{round_cents, CorrelationSummary, Evidence, Provider, ProviderCase, SignalId};
use crate::narrative::{claim_types, next_steps, synthesize};
use crate::scoring::RiskScorer;
use crate::signals::network::NetworkIndex;
use crate::signals::thresholds::Thresholds;
use crate::signals::{self, EvalContext};
use crate::temporal::TemporalAdjuster;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Everything the run produced, before report assembly.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Flagged providers keyed by NPI.
    pub cases: BTreeMap<String, ProviderCase>,
    pub correlation: CorrelationSummary,
    pub providers_scanned: usize,
}

impl RunOutput {
    pub fn total_estimated_overpayment(&self) -> f64 {
        round_cents(self.cases.values().map(|c| c.estimated_overpayment).sum())
    }
}

pub struct Engine {
    thresholds: Thresholds,
    adjuster: TemporalAdjuster,
    filter: ExemptionFilter,
    scorer: RiskScorer,
}

impl Engine {
    /// Fails when the exemption tables contradict each other.
    pub fn new(config: &Config) -> Result<Self, EngineError> {
        Ok(Self {
            thresholds: config.thresholds.clone(),
            adjuster: TemporalAdjuster::new(&config.temporal),
            filter: ExemptionFilter::new(&config.exemptions)?,
            scorer: RiskScorer::new(&config.scoring),
        })
    }

    /// Runs the selected signals over every provider in the store.
    pub fn run(
        &self,
        store: &AggregateStore,
        selected: &[SignalId],
        show_progress: bool,
    ) -> Result<RunOutput, EngineError> {
        info!("Building cohort tables for {} providers", store.len());
        let cohorts = CohortTables::build(store, &self.thresholds);
        debug!(
            "{} viable taxonomy/state cohorts for lifetime billing",
            cohorts.lifetime_paid.viable_groups()
        );
        let networks = NetworkIndex::build(store, &self.thresholds);
        let ctx = EvalContext::new(store, &cohorts, &networks, &self.thresholds);

        // Classification conflicts abort before any evaluation work.
        let classified = store
            .providers()
            .iter()
            .map(|p| self.filter.classify(p).map(|class| (p, class)))
            .collect::<Result<Vec<_>, _>>()?;
        let exempt = classified
            .iter()
            .filter(|(_, c)| *c == Classification::Exempt)
            .count();
        debug!("{} providers classified exempt", exempt);

        let pb = progress_bar(classified.len() as u64, show_progress);
        let results: Vec<Result<Option<ProviderCase>, EngineError>> = classified
            .par_iter()
            .map(|(provider, class)| {
                let result = self.evaluate_provider(&ctx, provider, *class, selected);
                pb.inc(1);
                result
            })
            .collect();
        pb.finish_and_clear();

        let mut cases = BTreeMap::new();
        for result in results {
            if let Some(case) = result? {
                cases.insert(case.provider.npi.clone(), case);
            }
        }

        info!(
            "{} of {} providers flagged",
            cases.len(),
            classified.len()
        );
        let correlation = correlate(&cases);

        Ok(RunOutput {
            cases,
            correlation,
            providers_scanned: classified.len(),
        })
    }

    /// Full pipeline for one provider; `None` when no evidence survives.
    fn evaluate_provider(
        &self,
        ctx: &EvalContext<'_>,
        provider: &Provider,
        class: Classification,
        selected: &[SignalId],
    ) -> Result<Option<ProviderCase>, EngineError> {
        if class == Classification::Exempt {
            return Ok(None);
        }

        let mut raw: Vec<Evidence> = Vec::new();
        for signal in selected {
            match signals::evaluate(*signal, ctx, provider) {
                Ok(evidence) => raw.extend(evidence),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => debug!("{} skipped for {}: {}", signal, provider.npi, e),
            }
        }
        if raw.is_empty() {
            return Ok(None);
        }

        let adjusted = self.adjuster.adjust_all(raw);
        let filtered = self.filter.apply(class, ctx, provider, adjusted)?;
        // Records recomputed under the elevated bar need the adjustment again.
        let evidence = self.adjuster.adjust_all(filtered);
        if evidence.is_empty() {
            return Ok(None);
        }

        let lifetime_paid = ctx.store.lifetime_paid(&provider.npi);
        let score = self.scorer.score(&evidence, lifetime_paid)?;
        let narrative = synthesize(provider, &evidence, &score, lifetime_paid);
        let (total_claims, total_beneficiaries) = ctx
            .store
            .totals(&provider.npi)
            .map(|t| (t.claims, t.beneficiaries))
            .unwrap_or((0, 0));

        Ok(Some(ProviderCase {
            provider: provider.clone(),
            total_paid: lifetime_paid,
            total_claims,
            total_beneficiaries,
            estimated_overpayment: round_cents(evidence.iter().map(|e| e.overpayment).sum()),
            claim_types: claim_types(&evidence),
            next_steps: next_steps(provider, &evidence),
            evidence,
            score,
            narrative,
        }))
    }
}

fn progress_bar(len: u64, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} providers ({eta})")
        .map(|s| s.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}
