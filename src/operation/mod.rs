//! Symmetry operations against which continuous symmetry measures are evaluated.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::CsmInputError;


// ==================
// Struct definitions
// ==================

/// An enumerated type to classify symmetry operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    /// Variant for proper rotations $`C_n`$.
    CN,

    /// Variant for improper rotations $`S_n`$ with even $`n`$.
    SN,

    /// Variant for the mirror plane $`\sigma = S_1`$.
    CS,

    /// Variant for the inversion centre $`i = S_2`$.
    CI,

    /// Variant for the chirality meta-operation: the best of $`\sigma`$ and $`S_{2k}`$.
    CH,
}

/// A structure describing a target symmetry operation.
///
/// Operations are validated on construction: $`C_n`$ requires $`n \ge 2`$, $`S_n`$ requires an
/// even $`n \ge 2`$, and $`\sigma`$, $`i`$ and the chirality meta-operation carry order 2.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Operation {
    kind: OperationKind,
    order: usize,
}

/// Trigonometric tables for the rotation angles $`\theta_k = 2\pi k / n`$ of an operation.
///
/// Index 0 corresponds to the identity power and holds zero in every table.
#[derive(Clone, Debug, PartialEq)]
pub struct TrigTables {
    /// $`\sin\theta_k`$.
    pub sin_theta: Vec<f64>,

    /// $`\cos\theta_k`$.
    pub cos_theta: Vec<f64>,

    /// The coefficient multiplying the symmetrised outer products accumulated into the matrix
    /// $`\mathbf{A}`$ for power $`k`$.
    pub multiplier: Vec<f64>,
}

// =====================
// Trait implementations
// =====================

impl Operation {
    /// Constructs and validates an operation.
    ///
    /// # Errors
    ///
    /// Errors if `order` is not admissible for `kind`.
    pub fn new(kind: OperationKind, order: usize) -> Result<Self, CsmInputError> {
        match kind {
            OperationKind::CN if order < 2 => Err(CsmInputError(format!(
                "C{order} is not a valid proper rotation; the order must be at least 2."
            ))),
            OperationKind::SN if order < 2 || order % 2 != 0 => Err(CsmInputError(format!(
                "S{order} is not a valid improper rotation; the order must be even and at least 2."
            ))),
            OperationKind::CS | OperationKind::CI | OperationKind::CH if order != 2 => {
                Err(CsmInputError(format!(
                    "The {kind:?} operation must have order 2, but order {order} was given."
                )))
            }
            _ => Ok(Self { kind, order }),
        }
    }

    /// Constructs the proper rotation $`C_n`$.
    pub fn cn(order: usize) -> Result<Self, CsmInputError> {
        Self::new(OperationKind::CN, order)
    }

    /// Constructs the improper rotation $`S_n`$.
    pub fn sn(order: usize) -> Result<Self, CsmInputError> {
        Self::new(OperationKind::SN, order)
    }

    /// Constructs the mirror plane.
    pub fn cs() -> Self {
        Self {
            kind: OperationKind::CS,
            order: 2,
        }
    }

    /// Constructs the inversion centre.
    pub fn ci() -> Self {
        Self {
            kind: OperationKind::CI,
            order: 2,
        }
    }

    /// Constructs the chirality meta-operation.
    pub fn ch() -> Self {
        Self {
            kind: OperationKind::CH,
            order: 2,
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Returns `true` for every operation except proper rotations.
    pub fn is_improper(&self) -> bool {
        self.kind != OperationKind::CN
    }

    /// Returns `true` if the operation has a zero rotation angle, *i.e.* it is a pure
    /// reflection.
    pub fn is_zero_angle(&self) -> bool {
        self.kind == OperationKind::CS
    }

    /// Returns `true` for the chirality meta-operation, which must be decomposed into concrete
    /// operations before any search.
    pub fn is_meta(&self) -> bool {
        self.kind == OperationKind::CH
    }

    /// Returns the cycle lengths admissible in a permutation realising this operation, in
    /// increasing order.
    pub fn allowed_cycle_lengths(&self) -> Vec<usize> {
        let mut lengths = vec![1];
        if self.kind == OperationKind::SN && self.order > 2 {
            lengths.push(2);
        }
        if self.order > 1 {
            lengths.push(self.order);
        }
        lengths
    }

    /// Computes the trigonometric tables for the powers $`k = 0, \ldots, n - 1`$ of this
    /// operation.
    pub fn trig_tables(&self) -> TrigTables {
        let n = self.order;
        let mut sin_theta = vec![0.0; n];
        let mut cos_theta = vec![0.0; n];
        let mut multiplier = vec![0.0; n];
        for k in 1..n {
            let theta = if self.is_zero_angle() {
                0.0
            } else {
                2.0 * PI * (k as f64) / (n as f64)
            };
            sin_theta[k] = theta.sin();
            cos_theta[k] = theta.cos();
            multiplier[k] = if self.is_improper() && k % 2 == 1 {
                -1.0 - theta.cos()
            } else {
                1.0 - theta.cos()
            };
        }
        TrigTables {
            sin_theta,
            cos_theta,
            multiplier,
        }
    }

    /// Returns a short symbol for this operation, such as `C3` or `S4`.
    pub fn symbol(&self) -> String {
        match self.kind {
            OperationKind::CN => format!("C{}", self.order),
            OperationKind::SN => format!("S{}", self.order),
            OperationKind::CS => "CS".to_string(),
            OperationKind::CI => "CI".to_string(),
            OperationKind::CH => "CH".to_string(),
        }
    }

    /// Returns a descriptive name for this operation.
    pub fn name(&self) -> String {
        match self.kind {
            OperationKind::CN | OperationKind::SN => format!("{} symmetry", self.symbol()),
            OperationKind::CS => "Mirror symmetry".to_string(),
            OperationKind::CI => "Inversion (S2)".to_string(),
            OperationKind::CH => "Chirality".to_string(),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

impl FromStr for Operation {
    type Err = CsmInputError;

    /// Parses an operation symbol. Accepted forms are `cN`, `sN`, `cs`, `ci` and `ch`,
    /// case-insensitively; `s1` is read as a mirror plane.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        match lower.as_str() {
            "cs" | "s1" => return Ok(Self::cs()),
            "ci" => return Ok(Self::ci()),
            "ch" => return Ok(Self::ch()),
            _ => {}
        }
        let (head, tail) = lower.split_at(lower.char_indices().nth(1).map_or(0, |(i, _)| i));
        let order = tail.parse::<usize>().map_err(|_| {
            CsmInputError(format!("Unable to parse `{s}` as a symmetry operation."))
        })?;
        match head {
            "c" => Self::cn(order),
            "s" => Self::sn(order),
            _ => Err(CsmInputError(format!(
                "Unable to parse `{s}` as a symmetry operation."
            ))),
        }
    }
}

impl TryFrom<String> for Operation {
    type Error = CsmInputError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Operation> for String {
    fn from(op: Operation) -> Self {
        op.symbol().to_lowercase()
    }
}
