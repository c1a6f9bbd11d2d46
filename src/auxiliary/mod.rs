//! Molecular data on which continuous symmetry measures are computed.

pub mod atom;
pub mod molecule;
