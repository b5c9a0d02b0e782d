//! Error types for lepjets

use thiserror::Error;

/// lepjets error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Computation error
    #[error("Computation error: {0}")]
    Computation(String),

    /// Leading coefficient of the neutrino p_z quadratic vanished.
    #[error("Numeric degeneracy: {0}")]
    NumericDegeneracy(String),

    /// Not enough jets eligible for the requested role assignment.
    #[error("Insufficient jets: {available} eligible, {required} required")]
    InsufficientJets {
        /// Jets eligible for the requested roles.
        available: usize,
        /// Jets needed to fill every role.
        required: usize,
    },

    /// Minimizer stopped without converging.
    #[error("Minimizer did not converge: {0}")]
    MinimizerNonConvergence(String),

    /// Every hypothesis of the event was excluded.
    #[error("No valid hypothesis among {evaluated} evaluated")]
    NoValidHypothesis {
        /// Number of hypotheses that were fitted.
        evaluated: usize,
    },
}

impl Error {
    /// True for outcomes that describe the event rather than a program fault.
    ///
    /// Analysis pipelines count these and move on to the next event.
    pub fn is_event_failure(&self) -> bool {
        matches!(self, Error::InsufficientJets { .. } | Error::NoValidHypothesis { .. })
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_failure_classification() {
        assert!(Error::InsufficientJets { available: 3, required: 4 }.is_event_failure());
        assert!(Error::NoValidHypothesis { evaluated: 12 }.is_event_failure());
        assert!(!Error::Validation("w_mass".into()).is_event_failure());
        assert!(!Error::NumericDegeneracy("A = 0".into()).is_event_failure());
    }

    #[test]
    fn test_display() {
        let e = Error::InsufficientJets { available: 3, required: 4 };
        assert_eq!(e.to_string(), "Insufficient jets: 3 eligible, 4 required");
    }
}
