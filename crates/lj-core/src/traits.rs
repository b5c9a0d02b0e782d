//! Core traits for lepjets
//!
//! The fitter never inspects what kind of object it is rescaling: leptons and
//! jets both reach it as a four-momentum plus a relative resolution.

use crate::kinematics::FourVector;

/// A measured object whose energy scale is a fit parameter.
pub trait ScaledObject {
    /// Measured four-momentum.
    fn p4(&self) -> &FourVector;

    /// Relative resolution of the measurement, if the object carries its own.
    fn resolution(&self) -> Option<f64>;

    /// Resolution with a fallback for objects without their own.
    fn resolution_or(&self, default: f64) -> f64 {
        self.resolution().unwrap_or(default)
    }

    /// Four-momentum scaled by `scale`.
    fn scaled(&self, scale: f64) -> FourVector {
        *self.p4() * scale
    }
}
