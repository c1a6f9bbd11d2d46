//! Legality rules constraining which atom may be mapped onto which.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::permuter::pip::Pip;

/// An enumerated type for the rules deciding whether a tentative mapping `origin → destination`
/// may be added to a permutation in progress.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LegalityPolicy {
    /// Every mapping is legal.
    #[default]
    Unconstrained,

    /// A mapping is legal only if every already-mapped neighbour of `origin` is mapped onto a
    /// neighbour of `destination`. Completed permutations then map bonded pairs onto bonded
    /// pairs.
    BondPreserving,

    /// In addition to [`Self::BondPreserving`], every already-assigned preimage of a neighbour
    /// of `destination` must be a neighbour of `origin`, so that unbonded pairs are not mapped
    /// onto bonded pairs either.
    BondPreservingTwoSided,
}

impl LegalityPolicy {
    /// Decides whether `origin → destination` may be added to `pip`. This has no side effects.
    pub fn is_legal(&self, pip: &Pip<'_>, origin: usize, destination: usize) -> bool {
        match self {
            Self::Unconstrained => true,
            Self::BondPreserving => Self::forward_bonds_kept(pip, origin, destination),
            Self::BondPreservingTwoSided => {
                Self::forward_bonds_kept(pip, origin, destination)
                    && Self::inverse_bonds_kept(pip, origin, destination)
            }
        }
    }

    fn forward_bonds_kept(pip: &Pip<'_>, origin: usize, destination: usize) -> bool {
        let molecule = pip.molecule();
        molecule.adjacent(origin).iter().all(|&adjacent| {
            pip.forward(adjacent)
                .map_or(true, |image| molecule.has_bond(destination, image))
        })
    }

    fn inverse_bonds_kept(pip: &Pip<'_>, origin: usize, destination: usize) -> bool {
        let molecule = pip.molecule();
        molecule.adjacent(destination).iter().all(|&adjacent| {
            pip.inverse(adjacent)
                .map_or(true, |preimage| molecule.has_bond(origin, preimage))
        })
    }
}

impl fmt::Display for LegalityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unconstrained => write!(f, "unconstrained"),
            Self::BondPreserving => write!(f, "bond-preserving"),
            Self::BondPreservingTwoSided => write!(f, "bond-preserving (two-sided)"),
        }
    }
}
