//! Molecules prepared for exact continuous symmetry measurement.

use std::collections::HashSet;
use std::fmt;

use indexmap::IndexMap;
use itertools::Itertools;
use log;
use nalgebra::{Point3, Vector3};

use crate::auxiliary::atom::Atom;
use crate::errors::CsmInputError;

#[cfg(test)]
#[path = "molecule_tests.rs"]
mod molecule_tests;

/// The smallest root-sum-square size of a geometry that can be normalised.
const MIN_NORM_FACTOR: f64 = 1e-10;

/// A structure containing a molecule whose atoms have been grouped into equivalence classes and
/// whose positions have been centred and scaled to unit root-sum-square size.
///
/// The equivalence classes are the groups within which atoms may be permuted. When chains are in
/// use, every class has been split by chain, so that each group only contains atoms of a single
/// chain.
#[derive(Clone, Debug)]
pub struct Molecule {
    atoms: Vec<Atom>,

    bonds: HashSet<(usize, usize)>,

    equivalence_classes: Vec<Vec<usize>>,

    chains: Option<IndexMap<String, Vec<usize>>>,

    centre: Point3<f64>,

    norm_factor: f64,

    positions: Vec<Vector3<f64>>,
}

impl Molecule {
    /// Prepares a molecule from a sequence of atoms.
    ///
    /// # Arguments
    ///
    /// * `atoms` - The atoms in order. Their indices are reassigned to their positions in this
    /// sequence.
    /// * `equivalence_classes` - Groups of mutually interchangeable atoms, which must partition
    /// all atom indices. If `None`, all atoms form a single class.
    /// * `use_chains` - Boolean indicating if every equivalence class is to be split by chain.
    /// * `use_mass` - Boolean indicating if the centre is mass-weighted.
    ///
    /// # Errors
    ///
    /// Errors if an adjacency or class index is out of range, if the classes do not partition
    /// the atoms, if a class cannot be split evenly across chains, if a mass used for weighting
    /// is not positive, or if all atoms coincide.
    pub fn from_atoms(
        atoms: Vec<Atom>,
        equivalence_classes: Option<Vec<Vec<usize>>>,
        use_chains: bool,
        use_mass: bool,
    ) -> Result<Self, CsmInputError> {
        let n_atoms = atoms.len();
        if n_atoms == 0 {
            return Err(CsmInputError("The molecule contains no atoms.".to_string()));
        }
        let mut atoms = atoms;
        atoms.iter_mut().enumerate().for_each(|(i, atom)| atom.index = i);

        let bonds = Self::construct_bonds(&mut atoms)?;
        let classes = match equivalence_classes {
            Some(classes) => {
                Self::validate_classes(&classes, n_atoms)?;
                classes
            }
            None => vec![(0..n_atoms).collect_vec()],
        };
        let chains = if use_chains {
            Some(Self::collect_chains(&atoms)?)
        } else {
            None
        };
        let equivalence_classes = match chains.as_ref() {
            Some(chains) => Self::split_classes_by_chain(&classes, &atoms, chains)?,
            None => classes,
        };

        if use_mass {
            if let Some(atom) = atoms
                .iter()
                .find(|atom| !(atom.atomic_mass.is_finite() && atom.atomic_mass > 0.0))
            {
                return Err(CsmInputError(format!(
                    "Atom {} ({}) has a non-positive mass of {} and cannot be used for mass \
                    weighting.",
                    atom.index, atom.atomic_symbol, atom.atomic_mass
                )));
            }
        }
        let centre = calc_centre(&atoms, use_mass);
        let norm_factor = atoms
            .iter()
            .map(|atom| (atom.coordinates - centre).norm_squared())
            .sum::<f64>()
            .sqrt();
        if norm_factor < MIN_NORM_FACTOR {
            return Err(CsmInputError(
                "All atoms coincide; the geometry cannot be normalised.".to_string(),
            ));
        }
        let positions = atoms
            .iter()
            .map(|atom| (atom.coordinates - centre) / norm_factor)
            .collect_vec();
        log::debug!(
            "Molecule normalised about ({:+.7}, {:+.7}, {:+.7}) with factor {:.7}.",
            centre[0],
            centre[1],
            centre[2],
            norm_factor
        );

        Ok(Self {
            atoms,
            bonds,
            equivalence_classes,
            chains,
            centre,
            norm_factor,
            positions,
        })
    }

    /// Symmetrises the adjacency lists in place and returns the set of directed bonds.
    fn construct_bonds(atoms: &mut [Atom]) -> Result<HashSet<(usize, usize)>, CsmInputError> {
        let n_atoms = atoms.len();
        let mut bonds = HashSet::new();
        for atom in atoms.iter() {
            for &j in atom.adjacent.iter() {
                if j >= n_atoms {
                    return Err(CsmInputError(format!(
                        "Atom {} is adjacent to atom {j}, which does not exist.",
                        atom.index
                    )));
                }
                if j == atom.index {
                    return Err(CsmInputError(format!(
                        "Atom {j} cannot be adjacent to itself."
                    )));
                }
                bonds.insert((atom.index, j));
                bonds.insert((j, atom.index));
            }
        }
        for i in 0..n_atoms {
            let missing = (0..n_atoms)
                .filter(|&j| bonds.contains(&(i, j)) && !atoms[i].adjacent.contains(&j))
                .collect_vec();
            let adjacent = &mut atoms[i].adjacent;
            adjacent.extend(missing);
            let unique = adjacent.iter().copied().unique().collect_vec();
            *adjacent = unique;
        }
        Ok(bonds)
    }

    fn validate_classes(classes: &[Vec<usize>], n_atoms: usize) -> Result<(), CsmInputError> {
        let mut seen = vec![false; n_atoms];
        for class in classes.iter() {
            if class.is_empty() {
                return Err(CsmInputError(
                    "Equivalence classes must not be empty.".to_string(),
                ));
            }
            for &i in class.iter() {
                match seen.get_mut(i) {
                    None => {
                        return Err(CsmInputError(format!(
                            "Equivalence class index {i} is out of range for {n_atoms} atoms."
                        )))
                    }
                    Some(true) => {
                        return Err(CsmInputError(format!(
                            "Atom {i} appears in more than one equivalence class."
                        )))
                    }
                    Some(flag) => *flag = true,
                }
            }
        }
        if let Some(missing) = seen.iter().position(|&flag| !flag) {
            return Err(CsmInputError(format!(
                "Atom {missing} does not belong to any equivalence class."
            )));
        }
        Ok(())
    }

    fn collect_chains(atoms: &[Atom]) -> Result<IndexMap<String, Vec<usize>>, CsmInputError> {
        let mut chains: IndexMap<String, Vec<usize>> = IndexMap::new();
        for atom in atoms.iter() {
            let chain = atom.chain.as_ref().ok_or_else(|| {
                CsmInputError(format!(
                    "Chains are in use, but atom {} has no chain label.",
                    atom.index
                ))
            })?;
            chains.entry(chain.clone()).or_default().push(atom.index);
        }
        Ok(chains)
    }

    /// Splits every equivalence class into one sub-class per chain, in chain order.
    fn split_classes_by_chain(
        classes: &[Vec<usize>],
        atoms: &[Atom],
        chains: &IndexMap<String, Vec<usize>>,
    ) -> Result<Vec<Vec<usize>>, CsmInputError> {
        let n_chains = chains.len();
        let mut groups = Vec::with_capacity(classes.len() * n_chains);
        for class in classes.iter() {
            if class.len() % n_chains != 0 {
                return Err(CsmInputError(format!(
                    "The equivalence class {class:?} cannot be split evenly across {n_chains} chains."
                )));
            }
            let expected = class.len() / n_chains;
            for chain in chains.keys() {
                let group = class
                    .iter()
                    .copied()
                    .filter(|&i| atoms[i].chain.as_ref() == Some(chain))
                    .collect_vec();
                if group.len() != expected {
                    return Err(CsmInputError(format!(
                        "Chain `{chain}` holds {} atoms of the equivalence class {class:?}, but {expected} are required.",
                        group.len()
                    )));
                }
                groups.push(group);
            }
        }
        Ok(groups)
    }

    pub fn n_atoms(&self) -> usize {
        self.atoms.len()
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    /// Returns the indices of the atoms bonded to atom `i`.
    pub fn adjacent(&self, i: usize) -> &[usize] {
        &self.atoms[i].adjacent
    }

    /// Returns `true` if atoms `i` and `j` are bonded.
    pub fn has_bond(&self, i: usize, j: usize) -> bool {
        self.bonds.contains(&(i, j))
    }

    pub fn bonds(&self) -> &HashSet<(usize, usize)> {
        &self.bonds
    }

    /// Returns the groups of mutually interchangeable atoms, split by chain if chains are in use.
    pub fn equivalence_classes(&self) -> &[Vec<usize>] {
        &self.equivalence_classes
    }

    pub fn chains(&self) -> Option<&IndexMap<String, Vec<usize>>> {
        self.chains.as_ref()
    }

    /// Returns the centre about which the positions have been normalised.
    pub fn centre(&self) -> &Point3<f64> {
        &self.centre
    }

    /// Returns the root-sum-square size of the centred geometry.
    pub fn norm_factor(&self) -> f64 {
        self.norm_factor
    }

    /// Returns the centred positions scaled so that the sum of their squared norms is one.
    pub fn positions(&self) -> &[Vector3<f64>] {
        &self.positions
    }
}

/// Calculates the centre of the atoms, weighted by their masses if `use_mass` is `true`.
fn calc_centre(atoms: &[Atom], use_mass: bool) -> Point3<f64> {
    let (weighted, total) = atoms.iter().fold(
        (Vector3::zeros(), 0.0),
        |(acc, tot): (Vector3<f64>, f64), atom| {
            let w = if use_mass { atom.atomic_mass } else { 1.0 };
            (acc + atom.coordinates.coords * w, tot + w)
        },
    );
    Point3::from(weighted / total)
}

impl fmt::Display for Molecule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "┈".repeat(66))?;
        writeln!(
            f,
            "{:>5} {:>3} {:>12} {:>12} {:>12}  {}",
            "#", "El", "x", "y", "z", "Bonded to"
        )?;
        writeln!(f, "{}", "┈".repeat(66))?;
        for atom in self.atoms.iter() {
            writeln!(f, "{atom}")?;
        }
        writeln!(f, "{}", "┈".repeat(66))?;
        writeln!(f, "Equivalence groups: {}", self.equivalence_classes.len())?;
        for (i, class) in self.equivalence_classes.iter().enumerate() {
            writeln!(f, "  {i:>3}: {}", class.iter().join(", "))?;
        }
        if let Some(chains) = self.chains.as_ref() {
            writeln!(f, "Chains: {}", chains.keys().join(", "))?;
        }
        Ok(())
    }
}
