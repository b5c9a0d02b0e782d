//! Jet-role hypotheses.
//!
//! A hypothesis assigns four distinct jets to the roles light quark 1, light
//! quark 2, hadronic-top b and leptonic-top b. Enumeration order is
//! lexicographic in `(light1, light2, hadronic_b, leptonic_b)` and is the
//! tie-break order of the search.

use lj_core::{Error, JetCandidate, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of jets a hypothesis consumes.
pub const JETS_PER_HYPOTHESIS: usize = 4;

/// Role of a jet under a given hypothesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JetRole {
    /// Not used by the hypothesis.
    None,
    /// Quark from the hadronic W.
    Light,
    /// b quark from the hadronic top.
    HadronicB,
    /// b quark from the leptonic top.
    LeptonicB,
}

/// Jet indices (into the input slice) for each role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JetAssignment {
    /// First light jet.
    pub light1: usize,
    /// Second light jet.
    pub light2: usize,
    /// Hadronic-top b jet.
    pub hadronic_b: usize,
    /// Leptonic-top b jet.
    pub leptonic_b: usize,
}

impl JetAssignment {
    /// Assignment from indices in role order.
    pub const fn new(light1: usize, light2: usize, hadronic_b: usize, leptonic_b: usize) -> Self {
        Self { light1, light2, hadronic_b, leptonic_b }
    }

    /// Indices in role order `(light1, light2, hadronic_b, leptonic_b)`.
    pub fn indices(&self) -> [usize; JETS_PER_HYPOTHESIS] {
        [self.light1, self.light2, self.hadronic_b, self.leptonic_b]
    }

    /// Role of jet `idx`.
    pub fn role_of(&self, idx: usize) -> JetRole {
        if idx == self.light1 || idx == self.light2 {
            JetRole::Light
        } else if idx == self.hadronic_b {
            JetRole::HadronicB
        } else if idx == self.leptonic_b {
            JetRole::LeptonicB
        } else {
            JetRole::None
        }
    }

    /// Roles for a jet list of length `n_jets`.
    pub fn roles(&self, n_jets: usize) -> Vec<JetRole> {
        (0..n_jets).map(|i| self.role_of(i)).collect()
    }

    fn is_distinct(&self) -> bool {
        let idx = self.indices();
        (0..idx.len()).all(|i| (i + 1..idx.len()).all(|j| idx[i] != idx[j]))
    }

    /// Distinct indices, all within `n_jets`.
    pub fn validate(&self, n_jets: usize) -> Result<()> {
        if let Some(&bad) = self.indices().iter().find(|&&i| i >= n_jets) {
            return Err(Error::Validation(format!(
                "jet index {bad} out of range for {n_jets} jets"
            )));
        }
        if !self.is_distinct() {
            return Err(Error::Validation(format!("jet indices not distinct: {self}")));
        }
        Ok(())
    }
}

impl fmt::Display for JetAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(j1={}, j2={}, bh={}, bl={})",
            self.light1, self.light2, self.hadronic_b, self.leptonic_b
        )
    }
}

/// Pruning switches for the enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    /// b roles only for tagged jets, light roles only for untagged jets.
    pub use_btag_info: bool,
    /// Respect discriminator ranking within the light pair and within the b pair.
    pub use_csv_order_info: bool,
}

impl SearchOptions {
    /// Options from the two flags.
    pub const fn new(use_btag_info: bool, use_csv_order_info: bool) -> Self {
        Self { use_btag_info, use_csv_order_info }
    }
}

/// Jet indices ordered by descending discriminator; ties keep input order.
pub fn discriminator_order(jets: &[JetCandidate]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..jets.len()).collect();
    order.sort_by(|&a, &b| {
        jets[b].b_discriminator.total_cmp(&jets[a].b_discriminator).then(a.cmp(&b))
    });
    order
}

/// Enumerate admissible hypotheses for `jets`.
///
/// - Without pruning: every ordered 4-tuple of distinct indices.
/// - `use_btag_info`: jets with discriminator above `working_point` may only
///   be b roles, the others only light roles.
/// - `use_csv_order_info`: `light1` must out-rank `light2` and `hadronic_b`
///   must out-rank `leptonic_b`, rank being the position in
///   [`discriminator_order`]. Light and b roles are not ranked against each
///   other.
///
/// Surviving tuples keep lexicographic order.
///
/// Fails with [`Error::InsufficientJets`] when the roles cannot be filled.
pub fn enumerate_hypotheses(
    jets: &[JetCandidate],
    options: SearchOptions,
    working_point: f64,
) -> Result<Vec<JetAssignment>> {
    let n = jets.len();
    if n < JETS_PER_HYPOTHESIS {
        return Err(Error::InsufficientJets { available: n, required: JETS_PER_HYPOTHESIS });
    }

    let tagged: Vec<bool> = jets.iter().map(|j| j.is_btagged(working_point)).collect();
    if options.use_btag_info {
        let n_tagged = tagged.iter().filter(|&&t| t).count();
        if n_tagged < 2 {
            return Err(Error::InsufficientJets { available: n_tagged, required: 2 });
        }
        let n_untagged = n - n_tagged;
        if n_untagged < 2 {
            return Err(Error::InsufficientJets { available: n_untagged, required: 2 });
        }
    }

    let mut rank = vec![0usize; n];
    for (r, &idx) in discriminator_order(jets).iter().enumerate() {
        rank[idx] = r;
    }
    let ordered =
        |first: usize, second: usize| !options.use_csv_order_info || rank[first] < rank[second];

    let light_ok = |i: usize| !options.use_btag_info || !tagged[i];
    let b_ok = |i: usize| !options.use_btag_info || tagged[i];

    let mut hypotheses = Vec::new();
    for l1 in (0..n).filter(|&i| light_ok(i)) {
        for l2 in (0..n).filter(|&i| i != l1 && light_ok(i) && ordered(l1, i)) {
            for bh in (0..n).filter(|&i| i != l1 && i != l2 && b_ok(i)) {
                for bl in (0..n).filter(|&i| i != l1 && i != l2 && i != bh && b_ok(i)) {
                    if ordered(bh, bl) {
                        hypotheses.push(JetAssignment::new(l1, l2, bh, bl));
                    }
                }
            }
        }
    }

    Ok(hypotheses)
}
