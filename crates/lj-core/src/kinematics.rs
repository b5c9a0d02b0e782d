//! Lorentz four-vectors.
//!
//! [`FourVector`] stores Cartesian components `(px, py, pz, E)` in GeV.
//! Collider coordinates (`pt`, `eta`, `phi`, `m`) are derived on demand.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Mul};

/// Energy-momentum four-vector `(px, py, pz, E)`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FourVector {
    /// x component of the momentum.
    pub px: f64,
    /// y component of the momentum.
    pub py: f64,
    /// z (beam axis) component of the momentum.
    pub pz: f64,
    /// Energy.
    pub e: f64,
}

impl FourVector {
    /// Build from Cartesian components.
    pub const fn new(px: f64, py: f64, pz: f64, e: f64) -> Self {
        Self { px, py, pz, e }
    }

    /// Build from transverse momentum, pseudorapidity, azimuth and mass.
    pub fn from_pt_eta_phi_m(pt: f64, eta: f64, phi: f64, m: f64) -> Self {
        let pt = pt.abs();
        let px = pt * phi.cos();
        let py = pt * phi.sin();
        let pz = pt * eta.sinh();
        let p2 = px * px + py * py + pz * pz;
        let e = (p2 + m * m).sqrt();
        Self { px, py, pz, e }
    }

    /// Massless vector with the given 3-momentum.
    pub fn massless(px: f64, py: f64, pz: f64) -> Self {
        Self { px, py, pz, e: (px * px + py * py + pz * pz).sqrt() }
    }

    /// Squared transverse momentum.
    #[inline]
    pub fn pt2(&self) -> f64 {
        self.px * self.px + self.py * self.py
    }

    /// Transverse momentum.
    #[inline]
    pub fn pt(&self) -> f64 {
        self.pt2().sqrt()
    }

    /// Squared 3-momentum.
    #[inline]
    pub fn p2(&self) -> f64 {
        self.pt2() + self.pz * self.pz
    }

    /// Invariant mass squared (may be negative for off-shell combinations).
    #[inline]
    pub fn mass2(&self) -> f64 {
        self.e * self.e - self.p2()
    }

    /// Invariant mass. Space-like vectors return `-sqrt(-m2)`.
    pub fn mass(&self) -> f64 {
        let m2 = self.mass2();
        if m2 >= 0.0 { m2.sqrt() } else { -(-m2).sqrt() }
    }

    /// Azimuthal angle in `(-pi, pi]`; zero for a vector along the beam.
    pub fn phi(&self) -> f64 {
        if self.px == 0.0 && self.py == 0.0 { 0.0 } else { self.py.atan2(self.px) }
    }

    /// Pseudorapidity. Vectors along the beam map to `±f64::INFINITY`.
    pub fn eta(&self) -> f64 {
        let pt = self.pt();
        if pt == 0.0 {
            return match self.pz.partial_cmp(&0.0) {
                Some(std::cmp::Ordering::Greater) => f64::INFINITY,
                Some(std::cmp::Ordering::Less) => f64::NEG_INFINITY,
                _ => 0.0,
            };
        }
        (self.pz / pt).asinh()
    }

    /// All four components are finite.
    pub fn is_finite(&self) -> bool {
        self.px.is_finite() && self.py.is_finite() && self.pz.is_finite() && self.e.is_finite()
    }
}

impl fmt::Display for FourVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(px={:.3}, py={:.3}, pz={:.3}, E={:.3}; pt={:.3}, m={:.3})",
            self.px,
            self.py,
            self.pz,
            self.e,
            self.pt(),
            self.mass()
        )
    }
}

impl Add for FourVector {
    type Output = FourVector;

    #[inline]
    fn add(self, rhs: FourVector) -> FourVector {
        FourVector {
            px: self.px + rhs.px,
            py: self.py + rhs.py,
            pz: self.pz + rhs.pz,
            e: self.e + rhs.e,
        }
    }
}

/// Uniform scaling of all four components (energy-scale correction).
impl Mul<f64> for FourVector {
    type Output = FourVector;

    #[inline]
    fn mul(self, s: f64) -> FourVector {
        FourVector { px: self.px * s, py: self.py * s, pz: self.pz * s, e: self.e * s }
    }
}
