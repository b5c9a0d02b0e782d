//! # lj-fit
//!
//! Kinematic reconstruction of lepton+jets top-pair events.
//!
//! This crate provides:
//! - The neutrino p_z solver for the leptonic W-mass constraint
//! - Jet-role hypothesis enumeration with b-tag pruning
//! - A per-hypothesis chi-square fit of object energy scales
//! - The hadronic-top search returning the best hypothesis and refit vectors
//!
//! ## Architecture
//!
//! The search depends on the [`Minimizer`] trait, not on a concrete engine.
//! argmin-backed L-BFGS-B and Nelder-Mead engines are provided.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Parallel processing of many events.
pub mod batch;
/// Fitter configuration.
pub mod config;
/// Hypothesis search and result types.
pub mod fitter;
/// Jet-role hypotheses and their enumeration.
pub mod hypothesis;
/// Neutrino p_z solver.
pub mod neutrino;
/// Chi-square objective of one hypothesis.
pub mod objective;
/// Generic numerical optimizers (argmin backends).
pub mod optimizer;

pub use batch::{BatchSummary, EventInput, fit_events};
pub use config::FitterConfig;
pub use fitter::{HadronicTopFinder, HypothesisFit, TopFitResult, find_hadronic_top};
pub use hypothesis::{JetAssignment, JetRole, SearchOptions, enumerate_hypotheses};
pub use neutrino::{NeutrinoSolution, SolutionKind, solve_neutrino_pz};
pub use objective::{Chi2Terms, FitParameter, FitState, HypothesisObjective, RefitKinematics};
pub use optimizer::{
    LbfgsbOptimizer, Minimizer, MinimizerEngine, NelderMeadOptimizer, ObjectiveFunction,
    OptimizationResult, OptimizerConfig,
};
