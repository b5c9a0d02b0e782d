//! Hypothesis search: fit every admissible jet assignment, keep the best.

use crate::config::FitterConfig;
use crate::hypothesis::{JetAssignment, SearchOptions, enumerate_hypotheses};
use crate::neutrino::SolutionKind;
use crate::objective::{Chi2Terms, FitParameter, FitState, HypothesisObjective, RefitKinematics};
use crate::optimizer::Minimizer;
use lj_core::{Error, FourVector, JetCandidate, Lepton, Met, Result};
use rayon::prelude::*;
use statrs::distribution::{ChiSquared, ContinuousCDF};
use std::fmt;

/// Converged fit of a single hypothesis.
#[derive(Debug, Clone)]
pub struct HypothesisFit {
    /// Jet roles.
    pub assignment: JetAssignment,
    /// Chi-square at the minimum.
    pub chi2: f64,
    /// Individual contributions at the minimum.
    pub terms: Chi2Terms,
    /// Scales and neutrino p_z at the minimum.
    pub state: FitState,
    /// Refit four-vectors at the minimum.
    pub kinematics: RefitKinematics,
    /// Objective evaluations spent by the minimizer.
    pub n_fev: usize,
}

/// Best hypothesis of an event.
#[derive(Debug, Clone)]
pub struct TopFitResult {
    /// Winning jet roles.
    pub assignment: JetAssignment,
    /// Minimum chi-square.
    pub chi2: f64,
    /// Chi-square contributions of the winner.
    pub terms: Chi2Terms,
    /// Refit neutrino.
    pub neutrino: FourVector,
    /// Refit leptonic-top b jet.
    pub leptonic_b: FourVector,
    /// Refit hadronic-top b jet.
    pub hadronic_b: FourVector,
    /// Refit first light jet.
    pub light1: FourVector,
    /// Refit second light jet.
    pub light2: FourVector,
    /// Refit lepton.
    pub lepton: FourVector,
    /// Fitted scales, indexed by [`FitParameter::index`].
    pub scales: [f64; FitParameter::COUNT],
    /// Branch of the neutrino solution at the minimum.
    pub neutrino_solution: SolutionKind,
    /// Hypotheses fitted.
    pub n_hypotheses: usize,
    /// Hypotheses excluded (non-convergence, degeneracy).
    pub n_excluded: usize,
    /// Mass constraints tested by the chi-square (the leptonic W only counts
    /// for a degenerate neutrino solution).
    pub ndf: usize,
}

impl TopFitResult {
    fn from_fit(fit: &HypothesisFit, n_hypotheses: usize, n_excluded: usize, ndf: usize) -> Self {
        let kin = &fit.kinematics;
        Self {
            assignment: fit.assignment,
            chi2: fit.chi2,
            terms: fit.terms,
            neutrino: kin.neutrino,
            leptonic_b: kin.leptonic_b,
            hadronic_b: kin.hadronic_b,
            light1: kin.light1,
            light2: kin.light2,
            lepton: kin.lepton,
            scales: fit.state.scales,
            neutrino_solution: fit.state.solution,
            n_hypotheses,
            n_excluded,
            ndf,
        }
    }

    /// Refit kinematics of the winner.
    pub fn kinematics(&self) -> RefitKinematics {
        RefitKinematics {
            lepton: self.lepton,
            neutrino: self.neutrino,
            leptonic_b: self.leptonic_b,
            hadronic_b: self.hadronic_b,
            light1: self.light1,
            light2: self.light2,
        }
    }

    /// Fitted scale of `param`.
    pub fn scale(&self, param: FitParameter) -> f64 {
        self.scales[param.index()]
    }

    /// Upper-tail chi-square probability with `ndf` degrees of freedom.
    pub fn probability(&self) -> f64 {
        ChiSquared::new(self.ndf as f64).map(|d| d.sf(self.chi2)).unwrap_or(f64::NAN)
    }
}

impl fmt::Display for TopFitResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TopFitResult(chi2={:.4}, {}, m_thad={:.2}, m_tlep={:.2}, hyps={}, excluded={})",
            self.chi2,
            self.assignment,
            self.kinematics().hadronic_top().mass(),
            self.kinematics().leptonic_top().mass(),
            self.n_hypotheses,
            self.n_excluded
        )
    }
}

/// Combinatorial search plus per-hypothesis constrained fit.
pub struct HadronicTopFinder {
    config: FitterConfig,
    minimizer: Box<dyn Minimizer>,
}

impl HadronicTopFinder {
    /// Finder using the engine named in `config.optimizer`.
    pub fn new(config: FitterConfig) -> Result<Self> {
        config.validate()?;
        let minimizer = config.optimizer.build();
        Ok(Self { config, minimizer })
    }

    /// Finder with a caller-provided minimization engine.
    pub fn with_minimizer(config: FitterConfig, minimizer: Box<dyn Minimizer>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, minimizer })
    }

    /// Active configuration.
    pub fn config(&self) -> &FitterConfig {
        &self.config
    }

    /// Fit one hypothesis from unit scales.
    ///
    /// Errors mark the hypothesis as excluded: [`Error::MinimizerNonConvergence`],
    /// [`Error::NumericDegeneracy`] at the final point, or engine failures.
    pub fn fit_hypothesis(
        &self,
        lepton: &Lepton,
        jets: &[JetCandidate],
        met: &Met,
        assignment: JetAssignment,
    ) -> Result<HypothesisFit> {
        let objective = HypothesisObjective::new(&self.config, lepton, jets, met, assignment)?;

        let (scales, n_fev) = if objective.free_parameters().is_empty() {
            ([1.0; FitParameter::COUNT], 1)
        } else {
            let opt = self.minimizer.minimize(
                &objective,
                &objective.init_params(),
                &objective.bounds(),
            )?;
            if !opt.converged {
                return Err(Error::MinimizerNonConvergence(format!(
                    "{} on {assignment}: {}",
                    self.minimizer.name(),
                    opt.message
                )));
            }
            (objective.expand(&opt.parameters), opt.n_fev)
        };

        let state = objective.solve(scales)?;
        let terms = objective.chi2_terms(&state);
        let chi2 = terms.total();
        if !chi2.is_finite() {
            return Err(Error::Computation(format!("non-finite chi2 for {assignment}")));
        }

        Ok(HypothesisFit {
            assignment,
            chi2,
            terms,
            state,
            kinematics: objective.refit(&state),
            n_fev,
        })
    }

    /// Fit every admissible hypothesis and return the lowest chi-square.
    ///
    /// Chi-square differences within `tie_tolerance` keep the earlier
    /// hypothesis, independent of `parallel_hypotheses`.
    pub fn find(
        &self,
        lepton: &Lepton,
        jets: &[JetCandidate],
        met: &Met,
        options: SearchOptions,
    ) -> Result<TopFitResult> {
        let hypotheses = enumerate_hypotheses(jets, options, self.config.btag_working_point)?;

        let fit = |a: &JetAssignment| self.fit_hypothesis(lepton, jets, met, *a);
        let fits: Vec<Result<HypothesisFit>> = if self.config.parallel_hypotheses {
            hypotheses.par_iter().map(fit).collect()
        } else {
            hypotheses.iter().map(fit).collect()
        };

        let mut best: Option<HypothesisFit> = None;
        let mut n_excluded = 0usize;
        for (assignment, fit) in hypotheses.iter().zip(fits) {
            match fit {
                Ok(fit) => {
                    log::trace!("{assignment}: chi2 = {:.6}", fit.chi2);
                    let better = match &best {
                        None => true,
                        Some(b) => fit.chi2 < b.chi2 - self.config.tie_tolerance,
                    };
                    if better {
                        best = Some(fit);
                    }
                }
                Err(e) => {
                    log::debug!("hypothesis {assignment} excluded: {e}");
                    n_excluded += 1;
                }
            }
        }

        match best {
            Some(fit) => Ok(TopFitResult::from_fit(
                &fit,
                hypotheses.len(),
                n_excluded,
                self.config.n_mass_constraints(fit.state.solution),
            )),
            None => {
                log::warn!("no valid hypothesis among {} for this event", hypotheses.len());
                Err(Error::NoValidHypothesis { evaluated: hypotheses.len() })
            }
        }
    }
}

/// One-call search with the default configuration.
///
/// Returns [`Error::InsufficientJets`] or [`Error::NoValidHypothesis`] when the
/// event has no usable assignment.
pub fn find_hadronic_top(
    lepton: &Lepton,
    jets: &[JetCandidate],
    met: &Met,
    use_btag_info: bool,
    use_csv_order_info: bool,
) -> Result<TopFitResult> {
    HadronicTopFinder::new(FitterConfig::default())?.find(
        lepton,
        jets,
        met,
        SearchOptions::new(use_btag_info, use_csv_order_info),
    )
}
