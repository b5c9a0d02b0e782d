//! Chi-square objective for one jet-role hypothesis.
//!
//! The fit parameters are multiplicative scales on the lepton, the four
//! assigned jets and the MET. The neutrino p_z is not a parameter: it is
//! re-solved from the leptonic W-mass constraint at every evaluation, using
//! the currently scaled lepton and MET.
//!
//! ```text
//! chi2 = sum_i ((s_i - 1) / sigma_i)^2
//!      + ((m(j1 j2)       - M_W) / G_W)^2
//!      + ((m(j1 j2 bh)    - M_t) / G_t)^2     [hadronic_top_constraint]
//!      + ((m(l nu)        - M_W) / G_W)^2     zero unless the root is degenerate
//!      + ((m(l nu bl)     - M_t) / G_t)^2     [leptonic_top_constraint]
//! ```
//!
//! Parameters with zero resolution are held at 1 and contribute no pull.

use crate::config::FitterConfig;
use crate::hypothesis::JetAssignment;
use crate::neutrino::{SolutionKind, solve_neutrino_pz};
use crate::optimizer::ObjectiveFunction;
use lj_core::{Error, FourVector, JetCandidate, Lepton, Met, Result, ScaledObject};

/// Smallest lower scale bound; keeps scaled objects away from zero momentum.
pub const SCALE_FLOOR: f64 = 0.01;

/// A scale parameter of the fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FitParameter {
    /// Lepton momentum scale.
    Lepton,
    /// Leptonic-top b jet energy scale.
    LeptonicB,
    /// Hadronic-top b jet energy scale.
    HadronicB,
    /// First light jet energy scale.
    Light1,
    /// Second light jet energy scale.
    Light2,
    /// MET scale.
    Met,
}

impl FitParameter {
    /// Number of scale parameters.
    pub const COUNT: usize = 6;

    /// All parameters in storage order.
    pub const ALL: [FitParameter; Self::COUNT] = [
        FitParameter::Lepton,
        FitParameter::LeptonicB,
        FitParameter::HadronicB,
        FitParameter::Light1,
        FitParameter::Light2,
        FitParameter::Met,
    ];

    /// Storage index.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Short name for logs.
    pub const fn name(self) -> &'static str {
        match self {
            FitParameter::Lepton => "lepton",
            FitParameter::LeptonicB => "b_lep",
            FitParameter::HadronicB => "b_had",
            FitParameter::Light1 => "j1",
            FitParameter::Light2 => "j2",
            FitParameter::Met => "met",
        }
    }
}

/// Per-evaluation working set: scales plus the neutrino p_z derived from them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitState {
    /// Scales indexed by [`FitParameter::index`].
    pub scales: [f64; FitParameter::COUNT],
    /// Neutrino p_z solved for the scaled lepton and MET.
    pub neutrino_pz: f64,
    /// Branch of the neutrino solution.
    pub solution: SolutionKind,
}

impl FitState {
    /// Scale of `param`.
    #[inline]
    pub fn scale(&self, param: FitParameter) -> f64 {
        self.scales[param.index()]
    }
}

/// Refit four-vectors of one hypothesis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefitKinematics {
    /// Scaled lepton.
    pub lepton: FourVector,
    /// Neutrino with pT from the scaled MET and the solved p_z.
    pub neutrino: FourVector,
    /// Scaled leptonic-top b jet.
    pub leptonic_b: FourVector,
    /// Scaled hadronic-top b jet.
    pub hadronic_b: FourVector,
    /// Scaled first light jet.
    pub light1: FourVector,
    /// Scaled second light jet.
    pub light2: FourVector,
}

impl RefitKinematics {
    /// Hadronic W candidate.
    pub fn hadronic_w(&self) -> FourVector {
        self.light1 + self.light2
    }

    /// Hadronic top candidate.
    pub fn hadronic_top(&self) -> FourVector {
        self.hadronic_w() + self.hadronic_b
    }

    /// Leptonic W candidate.
    pub fn leptonic_w(&self) -> FourVector {
        self.lepton + self.neutrino
    }

    /// Leptonic top candidate.
    pub fn leptonic_top(&self) -> FourVector {
        self.leptonic_w() + self.leptonic_b
    }
}

/// Individual chi-square contributions.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Chi2Terms {
    /// Sum of scale pulls.
    pub pulls: f64,
    /// Hadronic W mass term.
    pub hadronic_w: f64,
    /// Hadronic top mass term (zero when disabled).
    pub hadronic_top: f64,
    /// Leptonic W mass term.
    pub leptonic_w: f64,
    /// Leptonic top mass term (zero when disabled).
    pub leptonic_top: f64,
}

impl Chi2Terms {
    /// Total chi-square.
    pub fn total(&self) -> f64 {
        self.pulls + self.hadronic_w + self.hadronic_top + self.leptonic_w + self.leptonic_top
    }
}

#[inline]
fn mass_term(mass: f64, nominal: f64, width: f64) -> f64 {
    let pull = (mass - nominal) / width;
    pull * pull
}

/// Chi-square objective of one hypothesis.
///
/// Borrows the event read-only; every evaluation builds its own [`FitState`],
/// so one objective may be evaluated from several threads.
pub struct HypothesisObjective<'a> {
    config: &'a FitterConfig,
    met: Met,
    lepton: Lepton,
    /// Jets in role order: leptonic b, hadronic b, light1, light2.
    jets: [JetCandidate; 4],
    resolutions: [f64; FitParameter::COUNT],
    free: Vec<FitParameter>,
}

impl<'a> HypothesisObjective<'a> {
    /// Objective for `assignment` over `jets`.
    pub fn new(
        config: &'a FitterConfig,
        lepton: &Lepton,
        jets: &[JetCandidate],
        met: &Met,
        assignment: JetAssignment,
    ) -> Result<Self> {
        assignment.validate(jets.len())?;

        let lepton_res = lepton.resolution_or(config.lepton_resolution(lepton.flavour));
        let b_lep = &jets[assignment.leptonic_b];
        let b_had = &jets[assignment.hadronic_b];
        let j1 = &jets[assignment.light1];
        let j2 = &jets[assignment.light2];

        let resolutions = [
            lepton_res,
            b_lep.resolution_or(config.jet_resolution),
            b_had.resolution_or(config.jet_resolution),
            j1.resolution_or(config.jet_resolution),
            j2.resolution_or(config.jet_resolution),
            config.met_resolution,
        ];
        if let Some(bad) = resolutions.iter().find(|r| !(r.is_finite() && **r >= 0.0)) {
            return Err(Error::Validation(format!("invalid resolution {bad} for {assignment}")));
        }

        let free = FitParameter::ALL.into_iter().filter(|p| resolutions[p.index()] > 0.0).collect();

        Ok(Self {
            config,
            met: *met,
            lepton: *lepton,
            jets: [*b_lep, *b_had, *j1, *j2],
            resolutions,
            free,
        })
    }

    /// Parameters passed to the minimizer, in order.
    pub fn free_parameters(&self) -> &[FitParameter] {
        &self.free
    }

    /// Resolution of `param`.
    pub fn resolution(&self, param: FitParameter) -> f64 {
        self.resolutions[param.index()]
    }

    /// Start point: every free scale at 1.
    pub fn init_params(&self) -> Vec<f64> {
        vec![1.0; self.free.len()]
    }

    /// `1 ± scale_window * sigma`, floored at [`SCALE_FLOOR`].
    pub fn bounds(&self) -> Vec<(f64, f64)> {
        self.free
            .iter()
            .map(|p| {
                let half = self.config.scale_window * self.resolution(*p);
                ((1.0 - half).max(SCALE_FLOOR), 1.0 + half)
            })
            .collect()
    }

    /// Full scale vector from the free-parameter values (fixed ones at 1).
    pub fn expand(&self, free_values: &[f64]) -> [f64; FitParameter::COUNT] {
        let mut scales = [1.0; FitParameter::COUNT];
        for (p, &v) in self.free.iter().zip(free_values) {
            scales[p.index()] = v;
        }
        scales
    }

    /// Scaled MET.
    fn scaled_met(&self, scales: &[f64; FitParameter::COUNT]) -> Met {
        let s = scales[FitParameter::Met.index()];
        Met::new(self.met.px * s, self.met.py * s)
    }

    /// Solve the neutrino for the given scales.
    pub fn solve(&self, scales: [f64; FitParameter::COUNT]) -> Result<FitState> {
        let lepton = self.lepton.scaled(scales[FitParameter::Lepton.index()]);
        let solution = solve_neutrino_pz(&lepton, &self.scaled_met(&scales), self.config.w_mass)?;
        Ok(FitState { scales, neutrino_pz: solution.pz(), solution: solution.kind })
    }

    /// Refit four-vectors for a solved state.
    pub fn refit(&self, state: &FitState) -> RefitKinematics {
        let s = |p: FitParameter| state.scale(p);
        let met = self.scaled_met(&state.scales);
        RefitKinematics {
            lepton: self.lepton.scaled(s(FitParameter::Lepton)),
            neutrino: FourVector::massless(met.px, met.py, state.neutrino_pz),
            leptonic_b: self.jets[0].scaled(s(FitParameter::LeptonicB)),
            hadronic_b: self.jets[1].scaled(s(FitParameter::HadronicB)),
            light1: self.jets[2].scaled(s(FitParameter::Light1)),
            light2: self.jets[3].scaled(s(FitParameter::Light2)),
        }
    }

    /// Chi-square contributions for a solved state.
    pub fn chi2_terms(&self, state: &FitState) -> Chi2Terms {
        let cfg = self.config;
        let kin = self.refit(state);

        let pulls = self
            .free
            .iter()
            .map(|p| {
                let pull = (state.scale(*p) - 1.0) / self.resolution(*p);
                pull * pull
            })
            .sum();

        Chi2Terms {
            pulls,
            hadronic_w: mass_term(kin.hadronic_w().mass(), cfg.w_mass, cfg.w_width),
            hadronic_top: if cfg.hadronic_top_constraint {
                mass_term(kin.hadronic_top().mass(), cfg.top_mass, cfg.top_width)
            } else {
                0.0
            },
            leptonic_w: match state.solution {
                SolutionKind::Real => 0.0,
                SolutionKind::Degenerate => {
                    mass_term(kin.leptonic_w().mass(), cfg.w_mass, cfg.w_width)
                }
            },
            leptonic_top: if cfg.leptonic_top_constraint {
                mass_term(kin.leptonic_top().mass(), cfg.top_mass, cfg.top_width)
            } else {
                0.0
            },
        }
    }

    /// Chi-square at a full scale vector. Degenerate points give `+inf`.
    pub fn chi2_at(&self, scales: [f64; FitParameter::COUNT]) -> Result<f64> {
        match self.solve(scales) {
            Ok(state) => Ok(self.chi2_terms(&state).total()),
            Err(Error::NumericDegeneracy(_)) => Ok(f64::INFINITY),
            Err(e) => Err(e),
        }
    }
}

impl ObjectiveFunction for HypothesisObjective<'_> {
    fn eval(&self, params: &[f64]) -> Result<f64> {
        self.chi2_at(self.expand(params))
    }
}
