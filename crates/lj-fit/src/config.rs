//! Fitter configuration.
//!
//! Nominal masses, widths, resolutions and search switches. The configuration
//! is read-only once an event loop starts; every field has a default so a
//! partial JSON document is enough.

use crate::neutrino::SolutionKind;
use crate::optimizer::OptimizerConfig;
use lj_core::{Error, LeptonFlavour, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// CSVv2 medium working point.
pub const DEFAULT_BTAG_WORKING_POINT: f64 = 0.800;
/// Nominal W mass (GeV).
pub const DEFAULT_W_MASS: f64 = 80.4;
/// Nominal top mass (GeV).
pub const DEFAULT_TOP_MASS: f64 = 172.5;
/// W width (GeV).
pub const DEFAULT_W_WIDTH: f64 = 2.085;
/// Top width (GeV).
pub const DEFAULT_TOP_WIDTH: f64 = 1.41;

/// Configuration of the hypothesis search and per-hypothesis fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitterConfig {
    /// Nominal W mass used by the neutrino solver and the hadronic-W term.
    pub w_mass: f64,
    /// Width dividing the W-mass deviations.
    pub w_width: f64,
    /// Nominal top mass.
    pub top_mass: f64,
    /// Width dividing the top-mass deviations.
    pub top_width: f64,

    /// b-tag discriminator threshold (jets strictly above are tagged).
    pub btag_working_point: f64,

    /// Default relative muon momentum resolution.
    pub muon_resolution: f64,
    /// Default relative electron energy resolution.
    pub electron_resolution: f64,
    /// Default relative jet energy resolution.
    pub jet_resolution: f64,
    /// Relative MET scale resolution. Zero keeps the MET scale fixed.
    pub met_resolution: f64,

    /// Include the hadronic-top mass term.
    pub hadronic_top_constraint: bool,
    /// Include the leptonic-top mass term.
    pub leptonic_top_constraint: bool,

    /// Scale bounds are `1 ± scale_window * resolution`.
    pub scale_window: f64,
    /// Chi-square differences below this are ties (earlier hypothesis wins).
    pub tie_tolerance: f64,
    /// Fit hypotheses of one event on the rayon pool.
    pub parallel_hypotheses: bool,

    /// Minimizer settings.
    pub optimizer: OptimizerConfig,
}

impl Default for FitterConfig {
    fn default() -> Self {
        Self {
            w_mass: DEFAULT_W_MASS,
            w_width: DEFAULT_W_WIDTH,
            top_mass: DEFAULT_TOP_MASS,
            top_width: DEFAULT_TOP_WIDTH,
            btag_working_point: DEFAULT_BTAG_WORKING_POINT,
            muon_resolution: 0.01,
            electron_resolution: 0.02,
            jet_resolution: 0.10,
            met_resolution: 0.10,
            hadronic_top_constraint: true,
            leptonic_top_constraint: true,
            scale_window: 5.0,
            tie_tolerance: 1e-9,
            parallel_hypotheses: false,
            optimizer: OptimizerConfig::default(),
        }
    }
}

impl FitterConfig {
    /// Parse from a JSON document and validate.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: FitterConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON file and validate.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Default resolution for a lepton flavour.
    pub fn lepton_resolution(&self, flavour: LeptonFlavour) -> f64 {
        match flavour {
            LeptonFlavour::Muon => self.muon_resolution,
            LeptonFlavour::Electron => self.electron_resolution,
        }
    }

    /// Number of mass constraints the chi-square tests for a neutrino solution
    /// of the given kind.
    ///
    /// The hadronic W term is always present. With real roots the leptonic W
    /// constraint is used up solving for p_z (its term is identically zero), so
    /// it only counts for degenerate solutions.
    pub fn n_mass_constraints(&self, solution: SolutionKind) -> usize {
        1 + usize::from(solution == SolutionKind::Degenerate)
            + usize::from(self.hadronic_top_constraint)
            + usize::from(self.leptonic_top_constraint)
    }

    /// Reject values the fit cannot work with.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("w_mass", self.w_mass),
            ("w_width", self.w_width),
            ("top_mass", self.top_mass),
            ("top_width", self.top_width),
            ("scale_window", self.scale_window),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::Validation(format!("{name} must be finite and > 0, got {value}")));
            }
        }

        let non_negative = [
            ("muon_resolution", self.muon_resolution),
            ("electron_resolution", self.electron_resolution),
            ("jet_resolution", self.jet_resolution),
            ("met_resolution", self.met_resolution),
            ("tie_tolerance", self.tie_tolerance),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(Error::Validation(format!(
                    "{name} must be finite and >= 0, got {value}"
                )));
            }
        }

        if !self.btag_working_point.is_finite() {
            return Err(Error::Validation("btag_working_point must be finite".into()));
        }
        if self.top_mass <= self.w_mass {
            return Err(Error::Validation(format!(
                "top_mass ({}) must exceed w_mass ({})",
                self.top_mass, self.w_mass
            )));
        }

        self.optimizer.validate()
    }
}
