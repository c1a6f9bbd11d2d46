//! The permutation in progress and its incrementally accumulated algebraic state.

use nalgebra::{Matrix3, Vector3};

use crate::auxiliary::molecule::Molecule;
use crate::operation::{Operation, TrigTables};
use crate::permuter::legality::LegalityPolicy;
use crate::refplane::RefPlaneInput;

/// A token returned by [`Pip::close_cycle`] which must be handed back to
/// [`Pip::unclose_cycle`] to undo the closure.
#[must_use = "a closed cycle must be unclosed with its checkpoint"]
#[derive(Debug, PartialEq, Eq)]
pub struct CycleCheckpoint {
    depth: usize,
}

/// The saved state preceding a cycle closure. The previous power-table entries and the atoms of
/// the cycle live in the arenas of [`Pip`], starting at the recorded offsets.
#[derive(Clone, Debug)]
struct CycleRecord {
    a: Matrix3<f64>,
    b: Vector3<f64>,
    atoms_start: usize,
    powers_start: usize,
}

/// A permutation in progress (PIP).
///
/// Alongside the partial mapping `forward`/`inverse`, the PIP carries the symmetric matrix
/// $`\mathbf{A}`$, the vector $`\mathbf{B}`$ and the power table
/// $`\mathtt{powers}[k][i] = p^k(i)`$, all of which are updated every time a cycle of the
/// permutation is closed. Closures are undone in last-in-first-out order through checkpoints.
#[derive(Clone, Debug)]
pub struct Pip<'a> {
    molecule: &'a Molecule,

    policy: LegalityPolicy,

    forward: Vec<Option<usize>>,

    inverse: Vec<Option<usize>>,

    order: usize,

    is_zero_angle: bool,

    trig: TrigTables,

    a: Matrix3<f64>,

    b: Vector3<f64>,

    /// Entries of atoms not yet in a closed cycle hold the identity and carry no meaning.
    powers: Vec<Vec<usize>>,

    records: Vec<CycleRecord>,

    saved_atoms: Vec<usize>,

    saved_powers: Vec<usize>,
}

impl<'a> Pip<'a> {
    /// Creates an empty permutation in progress over the atoms of `molecule`.
    pub fn new(molecule: &'a Molecule, operation: &Operation, policy: LegalityPolicy) -> Self {
        let n_atoms = molecule.n_atoms();
        let order = operation.order();
        Self {
            molecule,
            policy,
            forward: vec![None; n_atoms],
            inverse: vec![None; n_atoms],
            order,
            is_zero_angle: operation.is_zero_angle(),
            trig: operation.trig_tables(),
            a: Matrix3::zeros(),
            b: Vector3::zeros(),
            powers: vec![(0..n_atoms).collect::<Vec<_>>(); order],
            records: Vec::with_capacity(n_atoms),
            saved_atoms: Vec::with_capacity(n_atoms),
            saved_powers: Vec::with_capacity(n_atoms * order),
        }
    }

    /// Returns the molecule being permuted, with the lifetime of the molecule itself.
    pub fn molecule(&self) -> &'a Molecule {
        self.molecule
    }

    pub fn forward(&self, atom: usize) -> Option<usize> {
        self.forward[atom]
    }

    pub fn inverse(&self, atom: usize) -> Option<usize> {
        self.inverse[atom]
    }

    pub fn a(&self) -> &Matrix3<f64> {
        &self.a
    }

    pub fn b(&self) -> &Vector3<f64> {
        &self.b
    }

    pub fn powers(&self) -> &[Vec<usize>] {
        &self.powers
    }

    pub fn trig(&self) -> &TrigTables {
        &self.trig
    }

    /// Returns `true` if no atom has been mapped.
    pub fn is_empty(&self) -> bool {
        self.forward.iter().all(Option::is_none) && self.inverse.iter().all(Option::is_none)
    }

    /// Returns the permutation as an image vector, or `None` if some atom is still unmapped.
    pub fn permutation(&self) -> Option<Vec<usize>> {
        self.forward.iter().copied().collect()
    }

    /// Attempts to map `origin` onto `destination`.
    ///
    /// # Returns
    ///
    /// `false` without any mutation if `origin` is already mapped, if `destination` is already
    /// taken, or if the legality policy rejects the mapping. `true` once the mapping has been
    /// recorded.
    pub fn switch(&mut self, origin: usize, destination: usize) -> bool {
        if self.forward[origin].is_some() || self.inverse[destination].is_some() {
            return false;
        }
        if !self.policy.is_legal(self, origin, destination) {
            return false;
        }
        self.assign(origin, destination);
        true
    }

    /// Records `origin → destination` without consulting the legality policy.
    ///
    /// # Panics
    ///
    /// Panics if either slot is already assigned.
    pub(crate) fn assign(&mut self, origin: usize, destination: usize) {
        assert!(
            self.forward[origin].is_none() && self.inverse[destination].is_none(),
            "Mapping {origin} → {destination} overwrites an assigned slot."
        );
        self.forward[origin] = Some(destination);
        self.inverse[destination] = Some(origin);
    }

    /// Removes the mapping `origin → destination`.
    ///
    /// # Panics
    ///
    /// Panics if the mapping is not currently held.
    pub fn unswitch(&mut self, origin: usize, destination: usize) {
        assert!(
            self.forward[origin] == Some(destination) && self.inverse[destination] == Some(origin),
            "Mapping {origin} → {destination} cannot be removed as it is not held."
        );
        self.forward[origin] = None;
        self.inverse[destination] = None;
    }

    /// Accumulates the contributions of a just-closed cycle into $`\mathbf{A}`$, $`\mathbf{B}`$
    /// and the power table.
    ///
    /// # Arguments
    ///
    /// * `cycle` - The atoms of the cycle, all of which must already be mapped within the cycle.
    /// * `positions` - The normalised positions of all atoms.
    ///
    /// # Returns
    ///
    /// A checkpoint from which [`Self::unclose_cycle`] restores the preceding state exactly.
    pub fn close_cycle(
        &mut self,
        cycle: &[usize],
        positions: &[Vector3<f64>],
    ) -> CycleCheckpoint {
        let record = CycleRecord {
            a: self.a,
            b: self.b,
            atoms_start: self.saved_atoms.len(),
            powers_start: self.saved_powers.len(),
        };
        self.saved_atoms.extend_from_slice(cycle);
        for k in 1..self.order {
            for &i in cycle.iter() {
                self.saved_powers.push(self.powers[k][i]);
                let next = self.forward[i]
                    .unwrap_or_else(|| panic!("Atom {i} of a closed cycle is not mapped."));
                let image = self.powers[k - 1][next];
                self.powers[k][i] = image;

                let qi = &positions[i];
                let qj = &positions[image];
                self.a += (qi * qj.transpose() + qj * qi.transpose()) * self.trig.multiplier[k];
                self.b += qi.cross(qj) * self.trig.sin_theta[k];
            }
        }
        self.records.push(record);
        CycleCheckpoint {
            depth: self.records.len(),
        }
    }

    /// Undoes the most recent cycle closure.
    ///
    /// # Panics
    ///
    /// Panics if `checkpoint` does not belong to the most recent closure.
    pub fn unclose_cycle(&mut self, checkpoint: CycleCheckpoint) {
        assert_eq!(
            checkpoint.depth,
            self.records.len(),
            "Cycle closures must be undone in reverse order."
        );
        let record = self
            .records
            .pop()
            .unwrap_or_else(|| panic!("No closed cycle to undo."));
        let n_cycle = self.saved_atoms.len() - record.atoms_start;
        let mut saved = record.powers_start;
        for k in 1..self.order {
            for c in 0..n_cycle {
                let i = self.saved_atoms[record.atoms_start + c];
                self.powers[k][i] = self.saved_powers[saved];
                saved += 1;
            }
        }
        self.saved_atoms.truncate(record.atoms_start);
        self.saved_powers.truncate(record.powers_start);
        self.a = record.a;
        self.b = record.b;
    }

    /// Gathers the data required by the reference-plane solver.
    pub fn ref_plane_input(&self) -> RefPlaneInput<'_> {
        RefPlaneInput {
            order: self.order,
            is_zero_angle: self.is_zero_angle,
            a: &self.a,
            b: &self.b,
            cos_theta: &self.trig.cos_theta,
            powers: &self.powers,
            positions: self.molecule.positions(),
        }
    }
}
