//! Many-event processing on the rayon pool.
//!
//! Events are independent: the finder is shared read-only and each event gets
//! its own objectives and fit states. Output order follows input order.

use crate::fitter::{HadronicTopFinder, TopFitResult};
use crate::hypothesis::SearchOptions;
use lj_core::{Error, JetCandidate, Lepton, Met, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Fitter inputs for one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventInput {
    /// Selected lepton.
    pub lepton: Lepton,
    /// Missing transverse momentum.
    pub met: Met,
    /// Selected jets.
    pub jets: Vec<JetCandidate>,
}

impl EventInput {
    /// Bundle one event.
    pub fn new(lepton: Lepton, met: Met, jets: Vec<JetCandidate>) -> Self {
        Self { lepton, met, jets }
    }
}

/// Fit every event in parallel; result `i` belongs to event `i`.
pub fn fit_events(
    finder: &HadronicTopFinder,
    events: &[EventInput],
    options: SearchOptions,
) -> Vec<Result<TopFitResult>> {
    events
        .par_iter()
        .map(|ev| finder.find(&ev.lepton, &ev.jets, &ev.met, options))
        .collect()
}

/// Outcome counts over a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Events processed.
    pub n_events: usize,
    /// Events with a best hypothesis.
    pub n_fitted: usize,
    /// Events rejected for too few eligible jets.
    pub n_insufficient_jets: usize,
    /// Events where every hypothesis was excluded.
    pub n_no_valid_hypothesis: usize,
    /// Events failing for any other reason.
    pub n_errors: usize,
}

impl BatchSummary {
    /// Tally the outcomes of [`fit_events`].
    pub fn from_results(results: &[Result<TopFitResult>]) -> Self {
        let mut summary = BatchSummary { n_events: results.len(), ..Default::default() };
        for r in results {
            match r {
                Ok(_) => summary.n_fitted += 1,
                Err(Error::InsufficientJets { .. }) => summary.n_insufficient_jets += 1,
                Err(Error::NoValidHypothesis { .. }) => summary.n_no_valid_hypothesis += 1,
                Err(_) => summary.n_errors += 1,
            }
        }
        summary
    }

    /// Fraction of events with a fit.
    pub fn efficiency(&self) -> f64 {
        if self.n_events == 0 { 0.0 } else { self.n_fitted as f64 / self.n_events as f64 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FitterConfig;
    use lj_core::FourVector;

    #[test]
    fn test_summary_counts() {
        let results: Vec<Result<TopFitResult>> = vec![
            Err(Error::InsufficientJets { available: 2, required: 4 }),
            Err(Error::NoValidHypothesis { evaluated: 24 }),
            Err(Error::Computation("engine".into())),
        ];
        let s = BatchSummary::from_results(&results);
        assert_eq!(s.n_events, 3);
        assert_eq!(s.n_fitted, 0);
        assert_eq!(s.n_insufficient_jets, 1);
        assert_eq!(s.n_no_valid_hypothesis, 1);
        assert_eq!(s.n_errors, 1);
        assert_eq!(s.efficiency(), 0.0);
    }

    #[test]
    fn test_order_preserved_for_failures() {
        let finder = HadronicTopFinder::new(FitterConfig::default()).unwrap();
        let lepton = Lepton::muon(FourVector::from_pt_eta_phi_m(40.0, 0.2, 0.0, 0.0));
        let jet = JetCandidate::new(FourVector::from_pt_eta_phi_m(50.0, 0.0, 1.0, 0.0), 0.1);
        let events: Vec<EventInput> = (0..4)
            .map(|n| EventInput::new(lepton, Met::new(30.0, 20.0), vec![jet; n]))
            .collect();

        let results = fit_events(&finder, &events, SearchOptions::default());
        for (n, r) in results.iter().enumerate() {
            match r {
                Err(Error::InsufficientJets { available, .. }) => assert_eq!(*available, n),
                other => panic!("event {n}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_event_json() {
        let json = r#"{
            "lepton": {"flavour": "electron", "p4": {"px": 30.0, "py": 5.0, "pz": 2.0, "e": 30.48}},
            "met": {"px": 25.0, "py": -10.0},
            "jets": [{"p4": {"px": 50.0, "py": 0.0, "pz": 10.0, "e": 51.2}, "b_discriminator": 0.9}]
        }"#;
        let ev: EventInput = serde_json::from_str(json).unwrap();
        assert_eq!(ev.jets.len(), 1);
        assert_eq!(ev.jets[0].resolution, None);
        assert_eq!(ev.jets[0].pt_rank, 0);
    }
}
