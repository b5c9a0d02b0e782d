//! # lj-core
//!
//! Core types for the lepton+jets top-pair fitter.
//!
//! This crate provides:
//! - [`FourVector`] kinematics
//! - Physics objects handed to the fitter ([`Lepton`], [`Met`], [`JetCandidate`])
//! - The shared [`Error`] type
//!
//! It has no numerical-optimization dependencies; those live in `lj-fit`.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Error types.
pub mod error;
/// Lorentz four-vectors.
pub mod kinematics;
/// Object traits.
pub mod traits;
/// Physics-object types.
pub mod types;

pub use error::{Error, Result};
pub use kinematics::FourVector;
pub use traits::ScaledObject;
pub use types::{JetCandidate, Lepton, LeptonFlavour, Met, rank_by_pt};
