//! Input configuration for CSM², which can be read in from a YAML file.

use anyhow::{self, format_err};
use itertools::Itertools;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::auxiliary::atom::{Atom, ElementMap};
use crate::auxiliary::molecule::Molecule;
use crate::drivers::exact_calculation::{ExactCalculationDriver, ExactCalculationParams};
use crate::drivers::Csm2Driver;
use crate::interfaces::InputHandle;
use crate::io::format::{csm2_error, csm2_output, log_subtitle, Csm2Output};


// ==================
// Struct definitions
// ==================

/// A structure specifying one atom in a YAML input file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputAtom {
    /// The element symbol of the atom.
    pub symbol: String,

    /// The Cartesian coordinates of the atom.
    pub coordinates: [f64; 3],

    /// The mass of the atom. If `None`, the mass of the most common isotope of the element is
    /// used.
    #[serde(default)]
    pub mass: Option<f64>,

    /// The indices of the atoms bonded to this atom.
    #[serde(default)]
    pub adjacent: Vec<usize>,

    /// The label of the chain to which this atom belongs.
    #[serde(default)]
    pub chain: Option<String>,
}

/// A structure specifying the molecule in a YAML input file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputMolecule {
    /// The atoms of the molecule, in order.
    pub atoms: Vec<InputAtom>,

    /// The classes of mutually exchangeable atoms. If `None`, all atoms form a single class.
    #[serde(default)]
    pub equivalence_classes: Option<Vec<Vec<usize>>>,

    /// Boolean indicating if every equivalence class is to be split further by chain.
    #[serde(default)]
    pub use_chains: bool,

    /// Boolean indicating if the molecule is to be centred at its centre of mass rather than at
    /// its geometric centre.
    #[serde(default)]
    pub use_mass: bool,
}

impl InputMolecule {
    /// Builds a normalised [`Molecule`] from this specification.
    ///
    /// # Errors
    ///
    /// Errors if an element is unknown and no mass is given, or if the molecule fails validation.
    pub fn to_molecule(&self) -> Result<Molecule, anyhow::Error> {
        let emap = ElementMap::new();
        let atoms = self
            .atoms
            .iter()
            .enumerate()
            .map(|(i, inp_atom)| {
                let coordinates = Point3::from(inp_atom.coordinates);
                let atom = match inp_atom.mass {
                    Some(mass) => Atom::with_mass(i, &inp_atom.symbol, coordinates, mass),
                    None => Atom::from_symbol(i, &inp_atom.symbol, coordinates, &emap)?,
                };
                let atom = atom.adjacent_to(&inp_atom.adjacent);
                Ok(match inp_atom.chain.as_ref() {
                    Some(chain) => atom.in_chain(chain),
                    None => atom,
                })
            })
            .collect::<Result<Vec<_>, anyhow::Error>>()?;
        Molecule::from_atoms(
            atoms,
            self.equivalence_classes.clone(),
            self.use_chains,
            self.use_mass,
        )
        .map_err(|err| format_err!(err))
    }
}

/// A structure containing `CSM2` input parameters which can be serialised into and deserialised
/// from a YAML input file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Input {
    /// Specification of the molecule to be measured.
    pub molecule: InputMolecule,

    /// Parameters of the exact calculation.
    pub exact_calculation: ExactCalculationParams,
}

impl InputHandle for Input {
    fn handle(&self) -> Result<(), anyhow::Error> {
        let mol = self.molecule.to_molecule()?;
        log_subtitle("Molecule");
        csm2_output!("");
        csm2_output!(
            "{} atoms, normalised about ({}) with a scale factor of {:.7}",
            mol.n_atoms(),
            mol.centre().iter().map(|x| format!("{x:+.7}")).join(", "),
            mol.norm_factor()
        );
        mol.log_output_display();
        csm2_output!("");

        let mut driver = ExactCalculationDriver::builder()
            .parameters(&self.exact_calculation)
            .molecule(&mol)
            .build()
            .map_err(|_| format_err!("Exact calculation driver cannot be constructed."))?;
        if let Err(err) = driver.run() {
            csm2_error!("{err}");
            return Err(err);
        }
        driver.result().map(|_| ())
    }
}
