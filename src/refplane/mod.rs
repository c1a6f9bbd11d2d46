//! The reference-plane solver: the optimal symmetry-element direction and the continuous
//! symmetry measure of a complete permutation.
//!
//! For a permutation $`p`$ with accumulated matrix $`\mathbf{A}`$ and vector $`\mathbf{B}`$, the
//! optimal direction is governed by the largest real root $`\lambda_{\mathrm{max}}`$ of the
//! secular equation
//!
//! ```math
//! \sum_j \frac{(\mathbf{m}_j^{\mathsf{T}} \mathbf{B})^2}{(\lambda_j - x)^2} = 1,
//! ```
//!
//! where $`\lambda_j`$ and $`\mathbf{m}_j`$ are the eigenvalues and eigenvectors of
//! $`\mathbf{A}`$. The equation is cleared of denominators into a polynomial whose roots are
//! located as the eigenvalues of its companion matrix.

use std::error::Error;
use std::fmt;

use itertools::Itertools;
use nalgebra::{DMatrix, Matrix3, Matrix3x2, Schur, Vector3};
use num_complex::Complex;


/// Roots whose imaginary parts are smaller than this are considered real.
pub const ZERO_IM_PART_MAX: f64 = 1e-3;

/// Eigenvalues this close to $`\lambda_{\mathrm{max}}`$ select their eigenvector as the direction.
pub const DEGENERACY_THRESHOLD: f64 = 1e-6;

/// CSM values below this indicate exact symmetry.
pub const ZERO_CSM_THRESHOLD: f64 = 1e-9;

/// Squared projections of $`\mathbf{B}`$ at or below this are treated as vanishing, so that the
/// corresponding factor $`(\lambda_j - x)^2`$ is removed before root finding.
const DEFLATION_THRESHOLD: f64 = 1e-24;

/// Eigenvalues of $`\mathbf{A}`$ closer than this are treated as coincident.
const COINCIDENCE_THRESHOLD: f64 = 1e-12;

const MAX_SCHUR_ITERATIONS: usize = 10_000;

// ==================
// Struct definitions
// ==================

/// The data from which the reference plane of a complete permutation is solved.
#[derive(Clone, Debug)]
pub struct RefPlaneInput<'a> {
    /// The order $`n`$ of the operation.
    pub order: usize,

    /// Boolean indicating if the operation has a zero rotation angle.
    pub is_zero_angle: bool,

    pub a: &'a Matrix3<f64>,

    pub b: &'a Vector3<f64>,

    /// $`\cos\theta_k`$ for $`k = 0, \ldots, n - 1`$.
    pub cos_theta: &'a [f64],

    /// The power table $`p^k(i)`$ of the permutation.
    pub powers: &'a [Vec<usize>],

    /// The normalised atom positions.
    pub positions: &'a [Vector3<f64>],
}

/// The solution of the reference-plane problem for one permutation.
#[derive(Clone, Debug, PartialEq)]
pub struct RefPlane {
    /// The continuous symmetry measure, between 0 and 100.
    pub csm: f64,

    /// The optimal axis of rotation or normal to the mirror plane.
    pub direction: Vector3<f64>,

    /// Two unit vectors completing [`Self::direction`] to an orthonormal basis. These are only
    /// computed when requested and when the symmetry is exact.
    pub reference_vectors: Option<(Vector3<f64>, Vector3<f64>)>,
}

/// Error raised when the secular polynomial has no real root or its roots cannot be found.
#[derive(Debug, Clone)]
pub struct RefPlaneError(pub String);

impl fmt::Display for RefPlaneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Reference-plane error: {}", self.0)
    }
}

impl Error for RefPlaneError {}

// =========
// Functions
// =========

/// Solves for the optimal direction and the CSM of a complete permutation.
///
/// # Arguments
///
/// * `input` - The accumulated data of the permutation.
/// * `prochirality` - Boolean indicating if reference vectors orthogonal to the direction are to
/// be returned when the symmetry turns out to be exact.
///
/// # Errors
///
/// Errors if no real root of the secular polynomial can be found.
pub fn calc_ref_plane(
    input: &RefPlaneInput<'_>,
    prochirality: bool,
) -> Result<RefPlane, RefPlaneError> {
    let eigen = input.a.symmetric_eigen();
    let lambdas = eigen.eigenvalues.iter().copied().collect_vec();
    let eigenvectors = eigen
        .eigenvectors
        .column_iter()
        .map(|col| col.into_owned())
        .collect_vec();
    let (csm, direction) = solve_secular(input, &lambdas, &eigenvectors)?;
    let reference_vectors = if prochirality && csm < ZERO_CSM_THRESHOLD {
        Some(orthonormal_complement(&direction))
    } else {
        None
    };
    Ok(RefPlane {
        csm,
        direction,
        reference_vectors,
    })
}

/// Solves the reference-plane problem with the direction restricted to the plane spanned by two
/// orthonormal vectors.
///
/// # Errors
///
/// Errors if no real root of the secular polynomial can be found.
pub fn calc_ref_plane_in_span(
    input: &RefPlaneInput<'_>,
    v1: &Vector3<f64>,
    v2: &Vector3<f64>,
) -> Result<RefPlane, RefPlaneError> {
    let v = Matrix3x2::from_columns(&[*v1, *v2]);
    let a_2d = v.transpose() * input.a * v;
    let eigen = a_2d.symmetric_eigen();
    let lambdas = eigen.eigenvalues.iter().copied().collect_vec();
    let eigenvectors = eigen
        .eigenvectors
        .column_iter()
        .map(|col| v * col)
        .collect_vec();
    let (csm, direction) = solve_secular(input, &lambdas, &eigenvectors)?;
    Ok(RefPlane {
        csm,
        direction,
        reference_vectors: Some((*v1, *v2)),
    })
}

/// Carries out the secular construction given the eigenpairs of the (possibly projected)
/// matrix $`\mathbf{A}`$, with eigenvectors expressed in three dimensions.
fn solve_secular(
    input: &RefPlaneInput<'_>,
    lambdas: &[f64],
    eigenvectors: &[Vector3<f64>],
) -> Result<(f64, Vector3<f64>), RefPlaneError> {
    let m_t_b = eigenvectors
        .iter()
        .map(|vec| vec.dot(input.b))
        .collect_vec();
    let m_t_b_2 = m_t_b.iter().map(|m| m * m).collect_vec();
    let roots = secular_roots(lambdas, &m_t_b_2)?;
    let lambda_max = select_lambda_max(&roots).ok_or_else(|| {
        RefPlaneError(format!(
            "The secular polynomial has no real root among {}.",
            roots.iter().map(|r| format!("{r:.6}")).join(", ")
        ))
    })?;

    let (direction, m_max_b) = if input.is_zero_angle || input.order == 2 {
        let (j_closest, _) = lambdas
            .iter()
            .enumerate()
            .fold((0, f64::INFINITY), |(j_best, d_best), (j, &lambda)| {
                let d = (lambda - lambda_max).abs();
                if d < d_best {
                    (j, d)
                } else {
                    (j_best, d_best)
                }
            });
        (eigenvectors[j_closest], 0.0)
    } else {
        let direction = match lambdas
            .iter()
            .position(|&lambda| (lambda - lambda_max).abs() < DEGENERACY_THRESHOLD)
        {
            Some(j) => eigenvectors[j],
            None => lambdas
                .iter()
                .zip(m_t_b.iter())
                .zip(eigenvectors.iter())
                .fold(Vector3::zeros(), |acc, ((&lambda, &m), vec)| {
                    acc + vec * (m / (lambda - lambda_max))
                }),
        };
        let m_max_b = direction.dot(input.b);
        (direction, m_max_b)
    };

    let csm = calc_csm(input, lambda_max, m_max_b);
    Ok((csm, direction))
}

/// Evaluates the CSM from $`\lambda_{\mathrm{max}}`$ and the projection of $`\mathbf{B}`$ onto the
/// direction.
fn calc_csm(input: &RefPlaneInput<'_>, lambda_max: f64, m_max_b: f64) -> f64 {
    let positions = input.positions;
    let overlap = (1..input.order).fold(1.0, |acc, k| {
        let dots = positions
            .iter()
            .zip(input.powers[k].iter())
            .map(|(q, &image)| q.dot(&positions[image]))
            .sum::<f64>();
        acc + input.cos_theta[k] * dots
    });
    let overlap = overlap + (lambda_max - m_max_b) / 2.0;
    (100.0 * (1.0 - overlap / (input.order as f64))).abs()
}

/// Builds the coefficients, highest degree first, of the monic degree-6 polynomial
/// $`\prod_j (\lambda_j - x)^2 - \sum_j m_j \prod_{l \ne j} (\lambda_l - x)^2`$.
///
/// # Arguments
///
/// * `l` - The eigenvalues $`\lambda_j`$ of $`\mathbf{A}`$.
/// * `m` - The squared projections $`(\mathbf{m}_j^{\mathsf{T}} \mathbf{B})^2`$.
pub fn build_polynomial(l: &[f64; 3], m: &[f64; 3]) -> [f64; 7] {
    let [l0, l1, l2] = *l;
    let [m0, m1, m2] = *m;
    let c0 = 1.0;
    let c1 = -2.0 * (l0 + l1 + l2);
    let c2 = l0 * l0 + l1 * l1 + l2 * l2 - m0 - m1 - m2
        + 4.0 * (l0 * l1 + l0 * l2 + l1 * l2);
    let c3 = -8.0 * l0 * l1 * l2
        + 2.0
            * (m0 * l1 + m0 * l2 + m1 * l0 + m1 * l2 + m2 * l0 + m2 * l1
                - l0 * l2 * l2
                - l0 * l0 * l1
                - l0 * l0 * l2
                - l0 * l1 * l1
                - l1 * l1 * l2
                - l1 * l2 * l2);
    let c4 = 4.0 * (l0 * l1 * l2 * (l0 + l1 + l2) - (m2 * l0 * l1 + m1 * l0 * l2 + m0 * l2 * l1))
        - m0 * (l1 * l1 + l2 * l2)
        - m1 * (l0 * l0 + l2 * l2)
        - m2 * (l0 * l0 + l1 * l1)
        + l0 * l0 * l1 * l1
        + l1 * l1 * l2 * l2
        + l0 * l0 * l2 * l2;
    let c5 = 2.0
        * (m0 * l1 * l2 * (l1 + l2) + m1 * l0 * l2 * (l0 + l2) + m2 * l0 * l1 * (l0 + l1))
        - 2.0
            * (l0 * l1 * l1 * l2 * l2 + l0 * l0 * l1 * l2 * l2 + l0 * l0 * l1 * l1 * l2);
    let c6 = -m0 * l1 * l1 * l2 * l2 - m1 * l0 * l0 * l2 * l2 - m2 * l0 * l0 * l1 * l1
        + l0 * l0 * l1 * l1 * l2 * l2;
    [c0, c1, c2, c3, c4, c5, c6]
}

/// Builds the secular polynomial for any number of `(λ, m)` terms by explicit polynomial
/// multiplication. Coefficients are ordered from the highest degree.
pub fn build_secular_polynomial(terms: &[(f64, f64)]) -> Vec<f64> {
    let squares = terms
        .iter()
        .map(|&(lambda, _)| vec![1.0, -2.0 * lambda, lambda * lambda])
        .collect_vec();
    let product_except = |skip: Option<usize>| {
        squares
            .iter()
            .enumerate()
            .filter(|(j, _)| Some(*j) != skip)
            .fold(vec![1.0], |acc, (_, sq)| poly_mul(&acc, sq))
    };
    let mut poly = product_except(None);
    let degree = poly.len() - 1;
    for (j, &(_, m)) in terms.iter().enumerate() {
        let partial = product_except(Some(j));
        let offset = degree + 1 - partial.len();
        for (c, p) in poly[offset..].iter_mut().zip(partial.iter()) {
            *c -= m * p;
        }
    }
    poly
}

fn poly_mul(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; a.len() + b.len() - 1];
    for (i, x) in a.iter().enumerate() {
        for (j, y) in b.iter().enumerate() {
            out[i + j] += x * y;
        }
    }
    out
}

/// Finds all roots of the secular polynomial. Factors $`(\lambda_j - x)^2`$ that are known
/// exactly, because $`m_j`$ vanishes or because $`\lambda_j`$ coincides with another eigenvalue,
/// are taken out first and contribute $`\lambda_j`$ directly.
fn secular_roots(lambdas: &[f64], m_t_b_2: &[f64]) -> Result<Vec<Complex<f64>>, RefPlaneError> {
    let mut known = vec![];
    let mut terms: Vec<(f64, f64)> = vec![];
    for (&lambda, &m) in lambdas.iter().zip(m_t_b_2.iter()) {
        if m <= DEFLATION_THRESHOLD {
            known.extend([lambda, lambda]);
        } else if let Some(term) = terms
            .iter_mut()
            .find(|(l, _)| (l - lambda).abs() <= COINCIDENCE_THRESHOLD)
        {
            term.1 += m;
            known.extend([lambda, lambda]);
        } else {
            terms.push((lambda, m));
        }
    }
    let coeffs = match (terms.as_slice(), lambdas.len()) {
        ([(l0, m0), (l1, m1), (l2, m2)], 3) => {
            build_polynomial(&[*l0, *l1, *l2], &[*m0, *m1, *m2]).to_vec()
        }
        _ => build_secular_polynomial(&terms),
    };
    let mut roots = find_poly_roots(&coeffs)?;
    roots.extend(known.into_iter().map(|lambda| Complex::new(lambda, 0.0)));
    Ok(roots)
}

/// Finds the roots of a polynomial, given with its highest-degree coefficient first, as the
/// eigenvalues of its companion matrix. Trailing zero coefficients yield roots at zero.
///
/// # Errors
///
/// Errors if the leading coefficient vanishes or the eigenvalue iteration does not converge.
pub fn find_poly_roots(coeffs: &[f64]) -> Result<Vec<Complex<f64>>, RefPlaneError> {
    let leading = *coeffs
        .first()
        .ok_or_else(|| RefPlaneError("An empty polynomial has no roots.".to_string()))?;
    if leading == 0.0 {
        return Err(RefPlaneError(
            "The leading polynomial coefficient vanishes.".to_string(),
        ));
    }
    let n_trailing_zeros = coeffs.iter().rev().take_while(|&&c| c == 0.0).count();
    let significant = &coeffs[..coeffs.len() - n_trailing_zeros];
    let degree = significant.len() - 1;
    let mut roots = vec![Complex::new(0.0, 0.0); n_trailing_zeros];
    match degree {
        0 => {}
        1 => roots.push(Complex::new(-significant[1] / leading, 0.0)),
        _ => {
            let companion = DMatrix::from_fn(degree, degree, |i, j| {
                if i == 0 {
                    -significant[j + 1] / leading
                } else if i == j + 1 {
                    1.0
                } else {
                    0.0
                }
            });
            let schur = Schur::try_new(companion, f64::EPSILON, MAX_SCHUR_ITERATIONS)
                .ok_or_else(|| {
                    RefPlaneError(format!(
                        "The roots of the polynomial {significant:?} could not be found."
                    ))
                })?;
            roots.extend(schur.complex_eigenvalues().iter().copied());
        }
    }
    Ok(roots)
}

/// Selects the largest real part among the roots with negligible imaginary parts.
pub fn select_lambda_max(roots: &[Complex<f64>]) -> Option<f64> {
    roots
        .iter()
        .filter(|root| root.im.abs() < ZERO_IM_PART_MAX)
        .map(|root| root.re)
        .fold(None, |acc: Option<f64>, re| {
            Some(acc.map_or(re, |best| best.max(re)))
        })
}

/// Completes a direction to an orthonormal basis by Gram--Schmidt orthogonalisation of the
/// Cartesian axis least aligned with it.
fn orthonormal_complement(direction: &Vector3<f64>) -> (Vector3<f64>, Vector3<f64>) {
    let d = direction.normalize();
    let seed = Vector3::ith(d.iamin(), 1.0);
    let v1 = (seed - d * d.dot(&seed)).normalize();
    let v2 = d.cross(&v1);
    (v1, v2)
}
