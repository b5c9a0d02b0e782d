//! End-to-end reconstruction tests on analytically constructed events.
//!
//! Covers:
//! - W-mass closure of the neutrino solver over random kinematics
//! - Perfect on-shell events (zero and 1% resolutions) select the true roles
//! - Degenerate-root events still fit
//! - b-tag / discriminator-order pruning on the same event
//! - Tie-break reproducibility and batch processing of smeared events

use approx::assert_relative_eq;
use lj_core::{Error, FourVector, JetCandidate, Lepton, Met};
use lj_fit::{
    BatchSummary, EventInput, FitParameter, FitterConfig, HadronicTopFinder, JetAssignment,
    MinimizerEngine, OptimizerConfig, SearchOptions, SolutionKind, fit_events, find_hadronic_top,
    solve_neutrino_pz,
};
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::f64::consts::FRAC_PI_2;

const MW: f64 = 80.4;
const MT: f64 = 172.5;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Massless jet with the given pt and phi whose pseudorapidity puts
/// `m(parent + jet)` at `target`.
///
/// Solves `a*cosh(eta) - b*sinh(eta) = c`, i.e. `R*cosh(eta - eta0) = c`.
fn jet_completing_mass(parent: &FourVector, pt: f64, phi: f64, target: f64) -> FourVector {
    let a = pt * parent.e;
    let b = pt * parent.pz;
    let c = 0.5 * (target * target - parent.mass2())
        + pt * (parent.px * phi.cos() + parent.py * phi.sin());
    let r = (a * a - b * b).sqrt();
    assert!(c >= r, "no pseudorapidity reaches m = {target} (c = {c}, R = {r})");
    let eta0 = (b / a).atanh();
    FourVector::from_pt_eta_phi_m(pt, eta0 + (c / r).acosh(), phi, 0.0)
}

struct PerfectEvent {
    lepton: Lepton,
    met: Met,
    jets: Vec<JetCandidate>,
}

/// Lepton pt 40 / eta 0.2 / phi 0, MET (30, 20), jets pt {80, 60, 50, 40}
/// as (hadronic b, light, light, leptonic b), all masses at nominal values.
fn perfect_event() -> PerfectEvent {
    let lepton_p4 = FourVector::from_pt_eta_phi_m(40.0, 0.2, 0.0, 0.0);
    let met = Met::new(30.0, 20.0);

    let light1 = FourVector::from_pt_eta_phi_m(60.0, 0.4, 1.0, 0.0);
    let light2 = jet_completing_mass(&light1, 50.0, 1.0 + FRAC_PI_2, MW);
    let w_had = light1 + light2;
    let b_had = jet_completing_mass(&w_had, 80.0, w_had.phi() + 0.8, MT);

    let nu = solve_neutrino_pz(&lepton_p4, &met, MW).unwrap().neutrino(&met);
    let w_lep = lepton_p4 + nu;
    let b_lep = jet_completing_mass(&w_lep, 40.0, w_lep.phi() + std::f64::consts::PI, MT);

    let jets = vec![
        JetCandidate::new(b_had, 0.90),
        JetCandidate::new(light1, 0.10),
        JetCandidate::new(light2, 0.20),
        JetCandidate::new(b_lep, 0.85),
    ];
    PerfectEvent { lepton: Lepton::muon(lepton_p4), met, jets }
}

fn config_with_resolution(res: f64) -> FitterConfig {
    FitterConfig {
        muon_resolution: res,
        electron_resolution: res,
        jet_resolution: res,
        met_resolution: res,
        ..FitterConfig::default()
    }
}

const TRUE_ROLES: JetAssignment = JetAssignment::new(1, 2, 0, 3);

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn test_perfect_event_construction() {
    let ev = perfect_event();
    let pts: Vec<f64> = ev.jets.iter().map(|j| j.p4.pt()).collect();
    for (pt, expected) in pts.iter().zip([80.0, 60.0, 50.0, 40.0]) {
        assert_relative_eq!(*pt, expected, epsilon = 1e-9);
    }
    let w = ev.jets[1].p4 + ev.jets[2].p4;
    assert_relative_eq!(w.mass(), MW, epsilon = 1e-8);
    assert_relative_eq!((w + ev.jets[0].p4).mass(), MT, epsilon = 1e-8);
}

#[test]
fn test_neutrino_closure_random_kinematics() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(42);
    let mut n_checked = 0;
    for _ in 0..500 {
        let lepton = FourVector::from_pt_eta_phi_m(
            rng.random_range(20.0..150.0),
            rng.random_range(-2.4..2.4),
            rng.random_range(-3.1..3.1),
            0.105,
        );
        let met = Met::from_pt_phi(rng.random_range(5.0..150.0), rng.random_range(-3.1..3.1));
        // Positive transverse projection keeps both roots physical.
        if lepton.px * met.px + lepton.py * met.py < 0.0 {
            continue;
        }
        let sol = solve_neutrino_pz(&lepton, &met, MW).unwrap();
        if sol.kind == SolutionKind::Degenerate {
            continue;
        }
        for nu in sol.neutrinos(&met) {
            assert_relative_eq!((lepton + nu).mass(), MW, max_relative = 1e-9);
        }
        n_checked += 1;
    }
    assert!(n_checked > 50, "only {n_checked} real-root samples");
}

#[test]
fn test_zero_resolution_perfect_event() {
    let ev = perfect_event();
    let finder = HadronicTopFinder::new(config_with_resolution(0.0)).unwrap();
    let result = finder.find(&ev.lepton, &ev.jets, &ev.met, SearchOptions::default()).unwrap();

    assert_eq!(result.assignment, TRUE_ROLES);
    assert!(result.chi2 < 1e-8, "chi2 = {}", result.chi2);
    assert_eq!(result.scales, [1.0; FitParameter::COUNT]);
    assert_eq!(result.n_hypotheses, 24);
}

#[test]
fn test_end_to_end_one_percent_resolution() {
    let ev = perfect_event();
    let finder = HadronicTopFinder::new(config_with_resolution(0.01)).unwrap();
    let result = finder.find(&ev.lepton, &ev.jets, &ev.met, SearchOptions::default()).unwrap();

    assert!(result.chi2 < 5.0, "chi2 = {}", result.chi2);
    assert_eq!(result.assignment, TRUE_ROLES);
    assert_eq!(result.neutrino_solution, SolutionKind::Real);
    assert_eq!(result.ndf, 3);

    let kin = result.kinematics();
    assert_relative_eq!(kin.hadronic_w().mass(), MW, epsilon = 0.5);
    assert_relative_eq!(kin.hadronic_top().mass(), MT, epsilon = 0.5);
    assert_relative_eq!(kin.leptonic_w().mass(), MW, epsilon = 1e-6);
    assert_relative_eq!(result.neutrino.px, 30.0 * result.scale(FitParameter::Met), epsilon = 1e-9);
    assert_relative_eq!(result.neutrino.py, 20.0 * result.scale(FitParameter::Met), epsilon = 1e-9);
    assert!(result.probability() > 0.05);
}

#[test]
fn test_nelder_mead_engine_agrees() {
    let ev = perfect_event();
    let config = FitterConfig {
        optimizer: OptimizerConfig {
            engine: MinimizerEngine::NelderMead,
            max_iter: 2000,
            tol: 1e-8,
            ..OptimizerConfig::default()
        },
        ..config_with_resolution(0.01)
    };
    let finder = HadronicTopFinder::new(config).unwrap();
    let result = finder.find(&ev.lepton, &ev.jets, &ev.met, SearchOptions::default()).unwrap();
    assert_eq!(result.assignment, TRUE_ROLES);
    assert!(result.chi2 < 5.0);
}

#[test]
fn test_tie_break_is_first_enumerated() {
    let ev = perfect_event();
    let finder = HadronicTopFinder::new(config_with_resolution(0.01)).unwrap();

    // Swapping the light jets gives the same chi-square.
    let a = finder.fit_hypothesis(&ev.lepton, &ev.jets, &ev.met, TRUE_ROLES).unwrap();
    let b = finder
        .fit_hypothesis(&ev.lepton, &ev.jets, &ev.met, JetAssignment::new(2, 1, 0, 3))
        .unwrap();
    assert!((a.chi2 - b.chi2).abs() <= finder.config().tie_tolerance);

    for _ in 0..3 {
        let r = finder.find(&ev.lepton, &ev.jets, &ev.met, SearchOptions::default()).unwrap();
        assert_eq!(r.assignment, TRUE_ROLES);
    }
}

#[test]
fn test_btag_and_csv_order_pruning() {
    let ev = perfect_event();
    let finder = HadronicTopFinder::new(config_with_resolution(0.01)).unwrap();

    let btag = finder.find(&ev.lepton, &ev.jets, &ev.met, SearchOptions::new(true, false)).unwrap();
    assert_eq!(btag.n_hypotheses, 4);
    assert_eq!(btag.assignment, TRUE_ROLES);

    // Jet 2 (0.20) out-ranks jet 1 (0.10) as light1 and jet 0 (0.90) out-ranks
    // jet 3 (0.85) as hadronic b: a single hypothesis survives.
    let ordered = finder.find(&ev.lepton, &ev.jets, &ev.met, SearchOptions::new(true, true)).unwrap();
    assert_eq!(ordered.n_hypotheses, 1);
    assert_eq!(ordered.assignment, JetAssignment::new(2, 1, 0, 3));
    assert_relative_eq!(ordered.chi2, btag.chi2, epsilon = 1e-6);
}

#[test]
fn test_six_jet_event_excludes_nothing() {
    let mut ev = perfect_event();
    ev.jets.push(JetCandidate::new(FourVector::from_pt_eta_phi_m(30.0, -1.0, 2.5, 0.0), 0.40));
    ev.jets.push(JetCandidate::new(FourVector::from_pt_eta_phi_m(25.0, 1.5, -2.0, 0.0), 0.05));

    let finder = HadronicTopFinder::new(FitterConfig::default()).unwrap();
    let r = finder.find(&ev.lepton, &ev.jets, &ev.met, SearchOptions::default()).unwrap();

    assert_eq!(r.n_hypotheses, 6 * 5 * 4 * 3);
    assert_eq!(r.n_excluded, 0);
    assert_eq!(r.assignment, TRUE_ROLES);
    assert!(r.chi2 < 1e-6, "chi2 = {}", r.chi2);
}

#[test]
fn test_btag_without_tags_is_insufficient() {
    let mut ev = perfect_event();
    for j in &mut ev.jets {
        j.b_discriminator = 0.1;
    }
    let res = find_hadronic_top(&ev.lepton, &ev.jets, &ev.met, true, false);
    assert!(matches!(res, Err(Error::InsufficientJets { available: 0, required: 2 })));
}

#[test]
fn test_three_jets_return_failure() {
    let ev = perfect_event();
    let res = find_hadronic_top(&ev.lepton, &ev.jets[..3], &ev.met, false, false);
    assert!(matches!(res, Err(Error::InsufficientJets { available: 3, required: 4 })));
}

#[test]
fn test_degenerate_neutrino_event_still_fits() {
    let ev = perfect_event();
    // MET back to back with the lepton: no real root at unit scales, but one
    // appears once the MET scale drops below ~0.67.
    let met = Met::new(-60.0, 0.0);
    let lepton = Lepton::muon(FourVector::from_pt_eta_phi_m(40.0, 0.2, 0.0, 0.0));
    let sol = solve_neutrino_pz(&lepton.p4, &met, MW).unwrap();
    assert_eq!(sol.kind, SolutionKind::Degenerate);

    let finder = HadronicTopFinder::new(FitterConfig {
        leptonic_top_constraint: false,
        ..FitterConfig::default()
    })
    .unwrap();
    let fit = finder.fit_hypothesis(&lepton, &ev.jets, &met, TRUE_ROLES).unwrap();
    assert!(fit.chi2.is_finite() && fit.chi2 >= 0.0);
    // The MET scale moves down to reduce the transverse mass.
    assert!(fit.state.scale(FitParameter::Met) < 1.0);
}

#[test]
fn test_smeared_events_batch() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    let smear = Normal::new(1.0, 0.05).unwrap();
    let base = perfect_event();

    let events: Vec<EventInput> = (0..8)
        .map(|_| {
            let jets = base
                .jets
                .iter()
                .map(|j| JetCandidate { p4: j.p4 * smear.sample(&mut rng), ..*j })
                .collect();
            EventInput::new(base.lepton, base.met, jets)
        })
        .collect();

    let finder = HadronicTopFinder::new(FitterConfig {
        jet_resolution: 0.05,
        ..FitterConfig::default()
    })
    .unwrap();
    let results = fit_events(&finder, &events, SearchOptions::new(true, false));
    assert_eq!(results.len(), events.len());

    let summary = BatchSummary::from_results(&results);
    assert_eq!(summary.n_events, 8);
    assert_eq!(summary.n_insufficient_jets, 0);
    assert!(summary.n_fitted >= 1);

    for r in results.iter().flatten() {
        assert!(r.chi2.is_finite() && r.chi2 >= 0.0);
        assert_eq!(r.n_hypotheses, 4);
        if r.neutrino_solution == SolutionKind::Real {
            assert_relative_eq!((r.lepton + r.neutrino).mass(), MW, epsilon = 1e-6);
        }
    }

    // Same input, same answer.
    let again = fit_events(&finder, &events, SearchOptions::new(true, false));
    for (a, b) in results.iter().zip(&again) {
        match (a, b) {
            (Ok(a), Ok(b)) => assert_eq!(a.assignment, b.assignment),
            (Err(a), Err(b)) => assert_eq!(a.to_string(), b.to_string()),
            _ => panic!("batch results differ between runs"),
        }
    }
}

#[test]
fn test_config_file_roundtrip() {
    let path = std::env::temp_dir().join(format!("lj_fit_config_{}.json", std::process::id()));
    let config = FitterConfig { top_mass: 173.0, jet_resolution: 0.08, ..FitterConfig::default() };
    std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

    let loaded = FitterConfig::from_json_file(&path).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(loaded, config);

    let missing = FitterConfig::from_json_file(path.with_extension("missing"));
    assert!(matches!(missing, Err(Error::Io(_))));
}
