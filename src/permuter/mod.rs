//! Enumeration of the permutations admissible for a symmetry operation.
//!
//! Permutations are generated depth-first, one cycle at a time, within the equivalence classes
//! of a molecule. The cycle lengths are restricted to those compatible with the operation, and
//! every tentative mapping is vetted by a [`LegalityPolicy`]. Each complete permutation is handed
//! to a visitor as a fully accumulated [`Pip`].

use std::fmt;
use std::ops::ControlFlow;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::auxiliary::molecule::Molecule;
use crate::errors::CsmInputError;
use crate::operation::Operation;
use crate::permutation::Permutation;

pub mod legality;
pub mod pip;

use legality::LegalityPolicy;
use pip::Pip;

#[cfg(test)]
#[path = "permuter_tests.rs"]
mod permuter_tests;

/// A visitor receiving every complete permutation in progress. Returning
/// [`ControlFlow::Break`] stops the enumeration.
pub type Visitor<'v> = dyn FnMut(&Pip<'_>) -> ControlFlow<()> + 'v;

/// An enumerated type for how often the permuter checks its deadline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeoutCheck {
    /// The deadline is checked at equivalence-group and cycle boundaries.
    #[default]
    Coarse,

    /// The deadline is additionally checked before every mapping attempt.
    Fine,
}

impl fmt::Display for TimeoutCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Coarse => write!(f, "coarse"),
            Self::Fine => write!(f, "fine"),
        }
    }
}

/// Counters gathered during an enumeration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermuterStatistics {
    /// The number of complete permutations visited.
    pub perm_count: u64,

    /// The number of accepted mappings.
    pub branches: u64,

    /// The number of rejected mappings.
    pub dead_ends: u64,

    /// Boolean indicating if the enumeration was interrupted by the deadline.
    pub timed_out: bool,
}

/// Trait for generators of complete permutations in progress.
pub trait Permuter {
    /// Visits every permutation in the search space until the visitor breaks or the deadline
    /// passes.
    ///
    /// # Returns
    ///
    /// [`ControlFlow::Break`] if the enumeration was stopped early.
    fn permute(&mut self, visitor: &mut Visitor<'_>) -> ControlFlow<()>;

    /// Returns the counters gathered so far.
    fn statistics(&self) -> &PermuterStatistics;
}

// --------------------
// ConstrainedPermuter
// --------------------

/// A permuter enumerating, group by group, all permutations whose cycle lengths are admissible
/// for an operation and whose mappings satisfy a legality policy.
pub struct ConstrainedPermuter<'a> {
    molecule: &'a Molecule,

    pip: Pip<'a>,

    cycle_lengths: Vec<usize>,

    max_length: usize,

    deadline: Option<Instant>,

    timeout_check: TimeoutCheck,

    statistics: PermuterStatistics,
}

impl<'a> ConstrainedPermuter<'a> {
    /// Creates a permuter over the equivalence groups of `molecule`.
    ///
    /// # Errors
    ///
    /// Errors if `operation` is the chirality meta-operation, which must be decomposed first.
    pub fn new(
        molecule: &'a Molecule,
        operation: &Operation,
        policy: LegalityPolicy,
    ) -> Result<Self, CsmInputError> {
        if operation.is_meta() {
            return Err(CsmInputError(format!(
                "{operation} cannot be enumerated directly."
            )));
        }
        let cycle_lengths = operation.allowed_cycle_lengths();
        let max_length = cycle_lengths.iter().copied().max().unwrap_or(1);
        Ok(Self {
            molecule,
            pip: Pip::new(molecule, operation, policy),
            cycle_lengths,
            max_length,
            deadline: None,
            timeout_check: TimeoutCheck::default(),
            statistics: PermuterStatistics::default(),
        })
    }

    /// Sets a deadline after which the enumeration stops.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Option<Instant>, timeout_check: TimeoutCheck) -> Self {
        self.deadline = deadline;
        self.timeout_check = timeout_check;
        self
    }

    /// Returns the permutation in progress. Outside of an enumeration this is empty.
    pub fn pip(&self) -> &Pip<'a> {
        &self.pip
    }

    fn deadline_passed(&mut self) -> bool {
        if self.statistics.timed_out {
            return true;
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                log::debug!("Deadline passed; stopping the permutation enumeration.");
                self.statistics.timed_out = true;
            }
        }
        self.statistics.timed_out
    }

    fn try_switch(&mut self, origin: usize, destination: usize) -> bool {
        if self.pip.switch(origin, destination) {
            self.statistics.branches += 1;
            true
        } else {
            self.statistics.dead_ends += 1;
            false
        }
    }

    /// Permutes the groups from `igroup` onwards.
    fn permute_groups(&mut self, igroup: usize, visitor: &mut Visitor<'_>) -> ControlFlow<()> {
        if self.deadline_passed() {
            return ControlFlow::Break(());
        }
        let molecule = self.molecule;
        match molecule.equivalence_classes().get(igroup) {
            None => {
                self.statistics.perm_count += 1;
                visitor(&self.pip)
            }
            Some(group) => match group.split_first() {
                Some((&head, remainder)) => {
                    let mut cycle = vec![head];
                    self.build_cycle(igroup, &mut cycle, remainder, visitor)
                }
                None => self.permute_groups(igroup + 1, visitor),
            },
        }
    }

    /// Extends or closes the cycle under construction within group `igroup`. The cycle starts at
    /// its head and ends at the atom whose image is to be chosen next; `remainder` holds the
    /// atoms of the group not yet placed in any cycle.
    fn build_cycle(
        &mut self,
        igroup: usize,
        cycle: &mut Vec<usize>,
        remainder: &[usize],
        visitor: &mut Visitor<'_>,
    ) -> ControlFlow<()> {
        let head = cycle[0];
        let curr = cycle[cycle.len() - 1];
        let length = cycle.len();

        if self.cycle_lengths.contains(&length) && self.try_switch(curr, head) {
            let positions = self.molecule.positions();
            let checkpoint = self.pip.close_cycle(cycle, positions);
            let flow = match remainder.split_first() {
                None => self.permute_groups(igroup + 1, visitor),
                Some((&next_head, rest)) => {
                    if self.deadline_passed() {
                        ControlFlow::Break(())
                    } else {
                        let mut next_cycle = vec![next_head];
                        self.build_cycle(igroup, &mut next_cycle, rest, visitor)
                    }
                }
            };
            self.pip.unclose_cycle(checkpoint);
            self.pip.unswitch(curr, head);
            if flow.is_break() {
                return flow;
            }
        }

        if length < self.max_length {
            for (i, &next) in remainder.iter().enumerate() {
                if self.timeout_check == TimeoutCheck::Fine && self.deadline_passed() {
                    return ControlFlow::Break(());
                }
                if self.try_switch(curr, next) {
                    let next_remainder = remainder[..i]
                        .iter()
                        .chain(remainder[i + 1..].iter())
                        .copied()
                        .collect::<Vec<_>>();
                    cycle.push(next);
                    let flow = self.build_cycle(igroup, cycle, &next_remainder, visitor);
                    cycle.pop();
                    self.pip.unswitch(curr, next);
                    if flow.is_break() {
                        return flow;
                    }
                }
            }
        }
        ControlFlow::Continue(())
    }
}

impl Permuter for ConstrainedPermuter<'_> {
    fn permute(&mut self, visitor: &mut Visitor<'_>) -> ControlFlow<()> {
        self.permute_groups(0, visitor)
    }

    fn statistics(&self) -> &PermuterStatistics {
        &self.statistics
    }
}

// --------------------
// SinglePermPermuter
// --------------------

/// A permuter visiting exactly one user-supplied permutation.
pub struct SinglePermPermuter<'a> {
    pip: Pip<'a>,

    statistics: PermuterStatistics,
}

impl<'a> SinglePermPermuter<'a> {
    /// Builds the permutation in progress for `perm` directly, closing each of its cycles,
    /// without consulting any legality policy.
    ///
    /// # Errors
    ///
    /// Errors if `perm` is not a bijection of the atom indices of `molecule`, or if `operation`
    /// is the chirality meta-operation.
    pub fn new(
        molecule: &'a Molecule,
        operation: &Operation,
        perm: &[usize],
    ) -> Result<Self, CsmInputError> {
        if operation.is_meta() {
            return Err(CsmInputError(format!(
                "{operation} cannot be evaluated directly."
            )));
        }
        if perm.len() != molecule.n_atoms() {
            return Err(CsmInputError(format!(
                "The permutation has {} entries, but the molecule has {} atoms.",
                perm.len(),
                molecule.n_atoms()
            )));
        }
        let permutation = Permutation::from_image(perm)?;
        let mut pip = Pip::new(molecule, operation, LegalityPolicy::Unconstrained);
        for cycle in permutation.cycles() {
            for &i in cycle.iter() {
                pip.assign(i, perm[i]);
            }
            let _checkpoint = pip.close_cycle(cycle, molecule.positions());
        }
        Ok(Self {
            pip,
            statistics: PermuterStatistics::default(),
        })
    }

    pub fn pip(&self) -> &Pip<'a> {
        &self.pip
    }
}

impl Permuter for SinglePermPermuter<'_> {
    fn permute(&mut self, visitor: &mut Visitor<'_>) -> ControlFlow<()> {
        self.statistics.perm_count += 1;
        visitor(&self.pip)
    }

    fn statistics(&self) -> &PermuterStatistics {
        &self.statistics
    }
}

// =========
// Functions
// =========

/// Estimates the number of permutations in the search space of `operation`, ignoring bond
/// constraints.
///
/// For a group of $`m`$ atoms the count obeys
/// $`a(m) = \sum_{l \in L,\, l \le m} \frac{(m-1)!}{(m-l)!}\, a(m - l)`$ with $`a(0) = 1`$,
/// where $`L`$ is the set of admissible cycle lengths. The total is the product over groups.
pub fn estimate_permutation_count(groups: &[Vec<usize>], operation: &Operation) -> f64 {
    let lengths = operation.allowed_cycle_lengths();
    let max_m = groups.iter().map(Vec::len).max().unwrap_or(0);
    let mut counts = vec![1.0f64; max_m + 1];
    for m in 1..=max_m {
        counts[m] = lengths
            .iter()
            .filter(|&&l| l <= m)
            .map(|&l| {
                let arrangements = ((m - l + 1)..m).map(|x| x as f64).product::<f64>();
                arrangements * counts[m - l]
            })
            .sum();
    }
    groups.iter().map(|group| counts[group.len()]).product()
}
