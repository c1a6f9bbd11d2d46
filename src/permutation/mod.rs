//! Permutations of atom indices and their cycle structures.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::ops::Mul;

use derive_builder::Builder;
use indexmap::IndexSet;
use itertools::Itertools;
use num_traits::Pow;
use serde::{Deserialize, Serialize};

use crate::errors::CsmInputError;
use crate::operation::Operation;


/// A structure to manage permutation actions of a finite set of atom indices.
#[derive(Builder, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Permutation {
    /// The rank of the permutation, *i.e.* the number of elements in the finite set on which the
    /// permutation acts.
    rank: usize,

    /// If the permutation is to act on an ordered sequence of $`n`$ integers, $`0, 1, \ldots, n`$
    /// where $`n`$ is [`Self::rank`], then this gives the result of the action.
    #[builder(setter(custom))]
    image: Vec<usize>,

    #[builder(setter(skip), default = "self.calc_cycles()")]
    cycles: Vec<Vec<usize>>,
}

impl PermutationBuilder {
    fn image(&mut self, perm: &[usize]) -> &mut Self {
        self.image = Some(perm.to_vec());
        self
    }

    fn calc_cycles(&self) -> Vec<Vec<usize>> {
        let (Some(rank), Some(image)) = (self.rank, self.image.as_ref()) else {
            return vec![];
        };
        let mut remaining_indices = (0..rank).rev().collect::<IndexSet<usize>>();
        let mut cycles: Vec<Vec<usize>> = Vec::with_capacity(rank);
        while let Some(start) = remaining_indices.pop() {
            let mut cycle: Vec<usize> = Vec::with_capacity(remaining_indices.len() + 1);
            cycle.push(start);
            let mut idx = start;
            while image[idx] != start {
                idx = image[idx];
                remaining_indices.shift_remove(&idx);
                cycle.push(idx);
            }
            cycles.push(cycle);
        }
        cycles.sort_by_key(|cycle| (!cycle.len(), cycle.clone()));
        cycles
    }
}

impl Permutation {
    /// Returns a builder to construct a new permutation.
    #[must_use]
    fn builder() -> PermutationBuilder {
        PermutationBuilder::default()
    }

    /// Constructs a permutation from its image, validating that it is a bijection of
    /// $`\{0, \ldots, n - 1\}`$.
    ///
    /// # Errors
    ///
    /// Errors if an index is out of range or repeated.
    pub fn from_image(image: &[usize]) -> Result<Self, CsmInputError> {
        let rank = image.len();
        if let Some(bad) = image.iter().find(|&&i| i >= rank) {
            return Err(CsmInputError(format!(
                "Permutation index {bad} is out of range for {rank} atoms."
            )));
        }
        if image.iter().collect::<HashSet<_>>().len() != rank {
            return Err(CsmInputError(format!(
                "The permutation `{image:?}` is not a bijection."
            )));
        }
        Self::builder()
            .rank(rank)
            .image(image)
            .build()
            .map_err(|err| CsmInputError(err.to_string()))
    }

    /// Constructs a permutation of a given rank from a set of disjoint cycles. Indices not
    /// mentioned in any cycle are fixed.
    pub fn from_cycles(rank: usize, cycles: &[Vec<usize>]) -> Result<Self, CsmInputError> {
        let mut image = (0..rank).collect_vec();
        for cycle in cycles.iter().filter(|cycle| !cycle.is_empty()) {
            for (&idx, &img) in cycle.iter().zip(cycle.iter().cycle().skip(1)) {
                let slot = image.get_mut(idx).ok_or_else(|| {
                    CsmInputError(format!("Cycle index {idx} is out of range for {rank} atoms."))
                })?;
                *slot = img;
            }
        }
        Self::from_image(&image)
    }

    /// Constructs the identity permutation of a given rank.
    pub fn identity(rank: usize) -> Self {
        let image = (0..rank).collect_vec();
        Self {
            rank,
            cycles: image.iter().map(|&i| vec![i]).collect(),
            image,
        }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn image(&self) -> &Vec<usize> {
        &self.image
    }

    /// Obtains the cycle representation of the permutation.
    pub fn cycles(&self) -> &Vec<Vec<usize>> {
        &self.cycles
    }

    /// Obtains the pattern of the cycle representation of the permutation.
    pub fn cycle_pattern(&self) -> Vec<usize> {
        self.cycles
            .iter()
            .map(|cycle| cycle.len())
            .collect::<Vec<usize>>()
    }

    /// Returns `true` if this permutation is the identity permutation for this rank.
    pub fn is_identity(&self) -> bool {
        self.image == (0..self.rank).collect::<Vec<usize>>()
    }

    /// Checks the cycle structure of this permutation against the cycle lengths admissible
    /// for `operation`.
    pub fn check_cycles(&self, operation: &Operation) -> CycleStructureCheck {
        let allowed = operation.allowed_cycle_lengths();
        let cycle_counts = self.cycles.iter().map(Vec::len).counts();
        let invalid_atoms = self
            .cycles
            .iter()
            .filter(|cycle| !allowed.contains(&cycle.len()))
            .flatten()
            .copied()
            .sorted()
            .collect_vec();
        let num_invalid_cycles = self
            .cycles
            .iter()
            .filter(|cycle| !allowed.contains(&cycle.len()))
            .count();
        CycleStructureCheck {
            operation: operation.clone(),
            num_invalid_cycles,
            cycle_counts: cycle_counts.into_iter().collect(),
            invalid_atoms,
        }
    }
}

/// The cycle structure of a permutation measured against an operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleStructureCheck {
    /// The operation against which the cycles have been checked.
    pub operation: Operation,

    /// The number of cycles whose lengths are not admissible for the operation.
    pub num_invalid_cycles: usize,

    /// The number of cycles of each length.
    pub cycle_counts: BTreeMap<usize, usize>,

    /// The atoms lying in inadmissible cycles, in increasing order.
    pub invalid_atoms: Vec<usize>,
}

impl CycleStructureCheck {
    pub fn is_valid(&self) -> bool {
        self.num_invalid_cycles == 0
    }
}

impl fmt::Display for CycleStructureCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Cycle lengths (count): {}",
            self.cycle_counts
                .iter()
                .map(|(len, count)| format!("{len} ({count})"))
                .join(", ")
        )?;
        writeln!(
            f,
            "Cycles inadmissible for {}: {}",
            self.operation, self.num_invalid_cycles
        )?;
        if !self.invalid_atoms.is_empty() {
            writeln!(
                f,
                "Atoms in inadmissible cycles: {}",
                self.invalid_atoms.iter().join(", ")
            )?;
        }
        Ok(())
    }
}

// ---
// Mul
// ---
impl Mul<&'_ Permutation> for &Permutation {
    type Output = Permutation;

    /// Composes two permutations such that `(self * rhs)(i) = self(rhs(i))`.
    fn mul(self, rhs: &Permutation) -> Self::Output {
        assert_eq!(
            self.rank, rhs.rank,
            "The ranks of two multiplying permutations do not match."
        );
        let image = rhs.image.iter().map(|&ri| self.image[ri]).collect_vec();
        Self::Output::builder()
            .rank(self.rank)
            .image(&image)
            .build()
            .unwrap_or_else(|err| panic!("Unable to construct a product `Permutation`: {err}"))
    }
}

impl Mul<Permutation> for Permutation {
    type Output = Permutation;

    fn mul(self, rhs: Permutation) -> Self::Output {
        &self * &rhs
    }
}

// ---
// Pow
// ---
impl Pow<usize> for &Permutation {
    type Output = Permutation;

    fn pow(self, rhs: usize) -> Self::Output {
        (0..rhs).fold(Permutation::identity(self.rank), |acc, _| self * &acc)
    }
}

impl Pow<usize> for Permutation {
    type Output = Permutation;

    fn pow(self, rhs: usize) -> Self::Output {
        (&self).pow(rhs)
    }
}
