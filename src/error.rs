//! Error taxonomy for the signal engine.
//!
//! Errors are classified by how far they propagate:
//! - Local: a single (provider, signal) evaluation is treated as non-triggering
//! - Fatal: the whole run is aborted

use thiserror::Error;

/// Errors raised by the evaluation, filtering and scoring stages.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    // Local errors
    #[error("missing {dimension} aggregate for provider {npi}")]
    MissingAggregate { npi: String, dimension: &'static str },

    #[error("cohort {cohort} has {size} members, below the minimum of {minimum}")]
    InvalidCohort {
        cohort: String,
        size: usize,
        minimum: usize,
    },

    // Fatal errors
    #[error("{subject} is classified as both exempt and high-threshold: {detail}")]
    ConflictingClassification { subject: String, detail: String },

    #[error("{component} component scored {value:.2}, outside its cap of {cap}")]
    ScoringInconsistency {
        component: &'static str,
        value: f64,
        cap: f64,
    },
}

impl EngineError {
    /// Returns true if this error must abort the run instead of being
    /// absorbed as a non-triggering signal.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::ConflictingClassification { .. }
                | EngineError::ScoringInconsistency { .. }
        )
    }

    pub(crate) fn missing(npi: &str, dimension: &'static str) -> Self {
        EngineError::MissingAggregate {
            npi: npi.to_string(),
            dimension,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_errors_are_not_fatal() {
        assert!(!EngineError::missing("123", "monthly").is_fatal());
        let cohort = EngineError::InvalidCohort {
            cohort: "207Q00000X/CA".to_string(),
            size: 2,
            minimum: 5,
        };
        assert!(!cohort.is_fatal());
    }

    #[test]
    fn test_configuration_and_scoring_errors_are_fatal() {
        let conflict = EngineError::ConflictingClassification {
            subject: "NPI 1".to_string(),
            detail: "listed in exempt_npis and high_threshold_npis".to_string(),
        };
        assert!(conflict.is_fatal());

        let scoring = EngineError::ScoringInconsistency {
            component: "breadth",
            value: 35.0,
            cap: 30.0,
        };
        assert!(scoring.is_fatal());
        assert_eq!(
            scoring.to_string(),
            "breadth component scored 35.00, outside its cap of 30"
        );
    }
}
