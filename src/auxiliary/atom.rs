//! Atoms with positions, masses, adjacencies and chain labels.

use std::collections::HashMap;
use std::fmt;

use itertools::Itertools;
use nalgebra::Point3;
use periodic_table;
use serde::{Deserialize, Serialize};

use crate::errors::CsmInputError;

/// A struct storing a look-up of element symbols to give atomic numbers
/// and atomic masses.
pub struct ElementMap<'a> {
    /// A [HashMap] from a symbol string to a tuple of atomic number and atomic
    /// mass.
    pub map: HashMap<&'a str, (u32, f64)>,
}

impl Default for ElementMap<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementMap<'static> {
    /// Creates a new [`ElementMap`] for all elements in the periodic table.
    #[must_use]
    pub fn new() -> ElementMap<'static> {
        let map = periodic_table::periodic_table()
            .into_iter()
            .filter_map(|element| {
                parse_atomic_mass(element.atomic_mass)
                    .map(|mass| (element.symbol, (element.atomic_number, mass)))
            })
            .collect();
        ElementMap { map }
    }
}

/// Parses the atomic mass string in the format of [`periodic_table`] to a single float value.
///
/// # Arguments
///
/// * `mass_str` - A string of mass value that is either `x.y(z)` where the
///     uncertain digit `z` is enclosed in parentheses, or `[x]` where `x`
///     is the mass number in place of precise experimental values.
///
/// # Returns
///
/// The numeric mass value, or `None` if the string cannot be parsed.
fn parse_atomic_mass(mass_str: &str) -> Option<f64> {
    let mass = mass_str.replace(&['(', ')', '[', ']'][..], "");
    mass.parse::<f64>().ok()
}

/// Normalises an element symbol to its conventional capitalisation, *e.g.* `cl` to `Cl`.
fn normalise_symbol(symbol: &str) -> String {
    let mut chars = symbol.trim().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// A struct representing an atom in a molecule subjected to continuous symmetry measurement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    /// The index of the atom in its molecule.
    pub index: usize,

    /// The atomic symbol of the atom.
    pub atomic_symbol: String,

    /// The atomic mass used for mass-weighted centring.
    pub atomic_mass: f64,

    /// The position of the atom.
    pub coordinates: Point3<f64>,

    /// The indices of the atoms bonded to this atom, in input order.
    pub adjacent: Vec<usize>,

    /// The label of the chain to which this atom belongs, if any.
    pub chain: Option<String>,
}

impl Atom {
    /// Constructs an atom whose mass is looked up from its element symbol.
    ///
    /// # Errors
    ///
    /// Errors if the symbol is not a known element.
    pub fn from_symbol(
        index: usize,
        symbol: &str,
        coordinates: Point3<f64>,
        emap: &ElementMap,
    ) -> Result<Self, CsmInputError> {
        let atomic_symbol = normalise_symbol(symbol);
        let (_, atomic_mass) = emap.map.get(atomic_symbol.as_str()).ok_or_else(|| {
            CsmInputError(format!(
                "Unknown element symbol `{symbol}` for atom {index}; specify its mass explicitly."
            ))
        })?;
        Ok(Self::with_mass(index, &atomic_symbol, coordinates, *atomic_mass))
    }

    /// Constructs an atom with an explicitly given mass.
    pub fn with_mass(index: usize, symbol: &str, coordinates: Point3<f64>, mass: f64) -> Self {
        Self {
            index,
            atomic_symbol: normalise_symbol(symbol),
            atomic_mass: mass,
            coordinates,
            adjacent: vec![],
            chain: None,
        }
    }

    /// Sets the adjacency list of this atom.
    #[must_use]
    pub fn adjacent_to(mut self, adjacent: &[usize]) -> Self {
        self.adjacent = adjacent.to_vec();
        self
    }

    /// Sets the chain label of this atom.
    #[must_use]
    pub fn in_chain(mut self, chain: &str) -> Self {
        self.chain = Some(chain.to_string());
        self
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>5} {:>3} {:+12.7} {:+12.7} {:+12.7}  [{}]",
            self.index,
            self.atomic_symbol,
            self.coordinates[0],
            self.coordinates[1],
            self.coordinates[2],
            self.adjacent.iter().join(", ")
        )?;
        if let Some(chain) = self.chain.as_ref() {
            write!(f, "  chain {chain}")?;
        }
        Ok(())
    }
}
