//! Error types raised before any search takes place.

use std::error::Error;
use std::fmt;

/// Error for invalid user input: malformed permutations, uneven chain splits, out-of-range
/// indices and invalid operation orders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsmInputError(pub String);

impl fmt::Display for CsmInputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CSM input error: {}", self.0)
    }
}

impl Error for CsmInputError {}
