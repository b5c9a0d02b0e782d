//! Physics objects consumed by the fitter.

use crate::kinematics::FourVector;
use crate::traits::ScaledObject;
use serde::{Deserialize, Serialize};

/// Charged-lepton flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeptonFlavour {
    /// Muon
    Muon,
    /// Electron
    Electron,
}

/// Selected, calibrated charged lepton.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lepton {
    /// Flavour tag.
    pub flavour: LeptonFlavour,
    /// Calibrated four-momentum.
    pub p4: FourVector,
    /// Relative momentum resolution. `None` uses the per-flavour default.
    #[serde(default)]
    pub resolution: Option<f64>,
}

impl Lepton {
    /// Lepton with the configured default resolution.
    pub fn new(flavour: LeptonFlavour, p4: FourVector) -> Self {
        Self { flavour, p4, resolution: None }
    }

    /// Muon with the configured default resolution.
    pub fn muon(p4: FourVector) -> Self {
        Self::new(LeptonFlavour::Muon, p4)
    }

    /// Electron with the configured default resolution.
    pub fn electron(p4: FourVector) -> Self {
        Self::new(LeptonFlavour::Electron, p4)
    }

    /// Override the relative resolution.
    pub fn with_resolution(mut self, resolution: f64) -> Self {
        self.resolution = Some(resolution);
        self
    }
}

impl ScaledObject for Lepton {
    fn p4(&self) -> &FourVector {
        &self.p4
    }

    fn resolution(&self) -> Option<f64> {
        self.resolution
    }
}

/// Missing transverse momentum. Only the transverse components are measured.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Met {
    /// x component.
    pub px: f64,
    /// y component.
    pub py: f64,
}

impl Met {
    /// MET from Cartesian components.
    pub const fn new(px: f64, py: f64) -> Self {
        Self { px, py }
    }

    /// MET from magnitude and azimuth.
    pub fn from_pt_phi(pt: f64, phi: f64) -> Self {
        Self { px: pt * phi.cos(), py: pt * phi.sin() }
    }

    /// Magnitude.
    pub fn pt(&self) -> f64 {
        self.px.hypot(self.py)
    }

    /// Azimuth.
    pub fn phi(&self) -> f64 {
        if self.px == 0.0 && self.py == 0.0 { 0.0 } else { self.py.atan2(self.px) }
    }
}

impl From<FourVector> for Met {
    fn from(v: FourVector) -> Self {
        Self { px: v.px, py: v.py }
    }
}

/// Jet handed to the fitter.
///
/// Read-only input: role assignments and refit scales live with the search,
/// never on the jet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JetCandidate {
    /// Calibrated four-momentum.
    pub p4: FourVector,
    /// b-tag discriminator value (CSV-like, in `[0, 1]` for tagged jets).
    pub b_discriminator: f64,
    /// Hadron/parton flavour label (0 when unknown).
    #[serde(default)]
    pub flavour: i32,
    /// Position in the pt-ordered jet list (0 = leading).
    #[serde(default)]
    pub pt_rank: usize,
    /// Relative energy resolution. `None` uses the configured default.
    #[serde(default)]
    pub resolution: Option<f64>,
}

impl JetCandidate {
    /// Jet with unknown flavour, rank 0 and default resolution.
    pub fn new(p4: FourVector, b_discriminator: f64) -> Self {
        Self { p4, b_discriminator, flavour: 0, pt_rank: 0, resolution: None }
    }

    /// Set the flavour label.
    pub fn with_flavour(mut self, flavour: i32) -> Self {
        self.flavour = flavour;
        self
    }

    /// Override the relative resolution.
    pub fn with_resolution(mut self, resolution: f64) -> Self {
        self.resolution = Some(resolution);
        self
    }

    /// Discriminator strictly above the working point.
    #[inline]
    pub fn is_btagged(&self, working_point: f64) -> bool {
        self.b_discriminator > working_point
    }
}

impl ScaledObject for JetCandidate {
    fn p4(&self) -> &FourVector {
        &self.p4
    }

    fn resolution(&self) -> Option<f64> {
        self.resolution
    }
}

/// Fill `pt_rank` from the jets' transverse momenta (ties keep input order).
pub fn rank_by_pt(jets: &mut [JetCandidate]) {
    let mut order: Vec<usize> = (0..jets.len()).collect();
    order.sort_by(|&a, &b| jets[b].p4.pt().total_cmp(&jets[a].p4.pt()).then(a.cmp(&b)));
    for (rank, idx) in order.into_iter().enumerate() {
        jets[idx].pt_rank = rank;
    }
}
