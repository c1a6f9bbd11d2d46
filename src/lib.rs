//! # CSM²: Exact Continuous Symmetry Measures
//!
//! CSM² is a program for the exact calculation of **C**ontinuous **S**ymmetry **M**easures
//! written in Rust. Given a molecule, with its atoms grouped into classes of mutually
//! exchangeable atoms and optionally connected by bonds, and a target symmetry operation, CSM²
//! finds the permutation of the atoms and the symmetry axis (or mirror-plane normal) that
//! minimise the squared distance between the molecule and the nearest structure having that
//! symmetry. Positions are first centred and scaled to unit root-sum-square size, so that the
//! measure ranges from 0, for an exactly symmetric molecule, to 100.
//!
//! The following target operations are supported:
//! - proper rotations $`C_n`$,
//! - improper rotations $`S_n`$ with even $`n`$,
//! - the mirror plane $`\sigma`$ and the inversion centre $`i`$, and
//! - the chirality measure, which is the smallest of the measures for $`\sigma`$ and
//!   $`S_2, S_4, \ldots`$.
//!
//! The search space can be restricted to permutations preserving the bonds of the molecule, and
//! a single user-supplied permutation can be measured instead of searching.
//!
//! ## Examples and usage
//!
//! For most items (structs, enums, functions, and traits), their usages are illustrated in test
//! functions. The compiled `csm2` binary reads a YAML configuration file containing a `molecule`
//! section and an `exact_calculation` section; see `tests/input` for examples.
//!
//! ## License
//!
//! GNU Lesser General Public License v3.0.

pub mod auxiliary;
pub mod drivers;
pub mod errors;
pub mod interfaces;
pub mod io;
pub mod operation;
pub mod permutation;
pub mod permuter;
pub mod refplane;
