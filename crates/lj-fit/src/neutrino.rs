//! Neutrino longitudinal momentum from the leptonic W-mass constraint.
//!
//! With the neutrino massless and its transverse momentum fixed to the MET,
//! `(l + nu)^2 = M_W^2` reduces to `A*pz^2 + B*pz + C = 0` with
//!
//! ```text
//! mu = (M_W^2 - m_l^2) / 2 + px_l * met_x + py_l * met_y
//! A  = E_l^2 - pz_l^2
//! B  = -2 * mu * pz_l
//! C  = E_l^2 * (met_x^2 + met_y^2) - mu^2
//! ```
//!
//! A negative discriminant (transverse mass above `M_W`) has no real solution;
//! the discriminant is then forced to zero and the single root `-B / 2A` is
//! returned, flagged as [`SolutionKind::Degenerate`].

use lj_core::{Error, FourVector, Met, Result};

/// Relative size of `A` (w.r.t. `E_l^2`) below which the quadratic is degenerate.
pub const DEGENERACY_EPS: f64 = 1e-12;

/// Whether the discriminant admitted real roots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolutionKind {
    /// Two real roots; the W-mass constraint holds exactly.
    Real,
    /// Negative discriminant forced to zero; the constraint is violated.
    Degenerate,
}

/// Solutions of the neutrino p_z quadratic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeutrinoSolution {
    /// Roots ordered by ascending `|pz|`. Equal for degenerate solutions.
    pub roots: [f64; 2],
    /// Branch that produced the roots.
    pub kind: SolutionKind,
    /// Discriminant `B^2 - 4AC` before any clamping.
    pub discriminant: f64,
}

impl NeutrinoSolution {
    /// Conventional choice: the smaller-magnitude root.
    #[inline]
    pub fn pz(&self) -> f64 {
        self.roots[0]
    }

    /// Real roots exist.
    pub fn is_real(&self) -> bool {
        self.kind == SolutionKind::Real
    }

    /// Massless neutrino four-vector for the chosen root.
    pub fn neutrino(&self, met: &Met) -> FourVector {
        FourVector::massless(met.px, met.py, self.pz())
    }

    /// Neutrino four-vectors for both roots, in root order.
    pub fn neutrinos(&self, met: &Met) -> [FourVector; 2] {
        self.roots.map(|pz| FourVector::massless(met.px, met.py, pz))
    }
}

/// Solve for the neutrino p_z such that `m(lepton + nu) = w_mass`.
///
/// Returns [`Error::NumericDegeneracy`] when the leading coefficient vanishes
/// (a lepton along the beam axis) or the inputs are not finite.
pub fn solve_neutrino_pz(lepton: &FourVector, met: &Met, w_mass: f64) -> Result<NeutrinoSolution> {
    if !(lepton.is_finite() && met.px.is_finite() && met.py.is_finite() && w_mass.is_finite()) {
        return Err(Error::NumericDegeneracy("non-finite lepton, MET or W mass".into()));
    }

    let e2 = lepton.e * lepton.e;
    let mu = 0.5 * (w_mass * w_mass - lepton.mass2()) + lepton.px * met.px + lepton.py * met.py;
    let a = e2 - lepton.pz * lepton.pz;
    let b = -2.0 * mu * lepton.pz;
    let c = e2 * (met.px * met.px + met.py * met.py) - mu * mu;

    if a.abs() <= DEGENERACY_EPS * e2.max(1.0) {
        return Err(Error::NumericDegeneracy(format!("quadratic coefficient A = {a:e}")));
    }

    let discriminant = b * b - 4.0 * a * c;
    if discriminant < 0.0 {
        let pz = -b / (2.0 * a);
        return Ok(NeutrinoSolution { roots: [pz, pz], kind: SolutionKind::Degenerate, discriminant });
    }

    let sqrt_d = discriminant.sqrt();
    let r1 = (-b + sqrt_d) / (2.0 * a);
    let r2 = (-b - sqrt_d) / (2.0 * a);
    let roots = if r1.abs() <= r2.abs() { [r1, r2] } else { [r2, r1] };
    Ok(NeutrinoSolution { roots, kind: SolutionKind::Real, discriminant })
}
