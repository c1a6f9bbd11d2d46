//! Driver for the exact calculation of continuous symmetry measures.
//!
//! For a target operation, every admissible permutation of the atoms is enumerated by a
//! [`ConstrainedPermuter`] (or a single user-supplied permutation is evaluated by a
//! [`SinglePermPermuter`]), the reference-plane problem is solved for each, and the permutation
//! with the smallest measure is kept.
//!
//! The chirality meta-operation is resolved here by measuring the mirror plane first and then,
//! unless the molecule is already found to be achiral, the improper rotations
//! $`S_2, S_4, \ldots, S_{n_{\mathrm{max}}}`$ in turn.

use std::error::Error;
use std::fmt;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, format_err};
use derive_builder::Builder;
use itertools::Itertools;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::auxiliary::molecule::Molecule;
use crate::drivers::Csm2Driver;
use crate::io::format::{
    csm2_output, csm2_warn, log_micsec_begin, log_micsec_end, log_subtitle, log_title, nice_bool,
    write_subtitle, Csm2Output,
};
use crate::io::write_csm2_yaml;
use crate::operation::Operation;
use crate::permutation::{CycleStructureCheck, Permutation};
use crate::permuter::legality::LegalityPolicy;
use crate::permuter::{
    estimate_permutation_count, ConstrainedPermuter, Permuter, PermuterStatistics,
    SinglePermPermuter, TimeoutCheck,
};
use crate::refplane::{calc_ref_plane, calc_ref_plane_in_span, ZERO_CSM_THRESHOLD};


/// The number of permutations between two progress reports.
const PROGRESS_INTERVAL: u64 = 1_000_000;

/// The measure below which the chirality sweep stops.
const MIN_CHIRALITY_CSM: f64 = 1e-8;

// ==================
// Struct definitions
// ==================

// ----------
// Parameters
// ----------

fn default_timeout() -> f64 {
    300.0
}
fn default_sn_max() -> usize {
    8
}

/// A structure containing control parameters for exact CSM calculations.
#[derive(Clone, Builder, Debug, Serialize, Deserialize)]
pub struct ExactCalculationParams {
    /// The target symmetry operation.
    pub operation: Operation,

    /// The policy deciding which atom mappings may be made during the enumeration.
    #[builder(default = "LegalityPolicy::Unconstrained")]
    #[serde(default)]
    pub legality: LegalityPolicy,

    /// An optional permutation, given as the image of every atom index, to be measured on its
    /// own instead of searching the permutation space.
    #[builder(default = "None")]
    #[serde(default)]
    pub permutation: Option<Vec<usize>>,

    /// The wall-clock limit in seconds for the whole calculation.
    #[builder(default = "300.0")]
    #[serde(default = "default_timeout")]
    pub timeout: f64,

    /// How often the permuter checks the wall-clock limit.
    #[builder(default = "TimeoutCheck::Coarse")]
    #[serde(default)]
    pub timeout_check: TimeoutCheck,

    /// Boolean indicating if, once an exact symmetry has been found, the measure is to be
    /// re-evaluated with the direction restricted to the plane orthogonal to the symmetry
    /// direction.
    #[builder(default = "false")]
    #[serde(default)]
    pub prochirality: bool,

    /// The largest order of the improper rotations tried by the chirality meta-operation.
    #[builder(default = "8")]
    #[serde(default = "default_sn_max")]
    pub sn_max: usize,

    /// Optional name (without the `.yml` extension) for saving the result as a YAML file. If
    /// `None`, the result will not be saved.
    #[builder(default = "None")]
    #[serde(default)]
    pub result_save_name: Option<PathBuf>,
}

impl ExactCalculationParams {
    /// Returns a builder to construct a [`ExactCalculationParams`] structure.
    pub fn builder() -> ExactCalculationParamsBuilder {
        ExactCalculationParamsBuilder::default()
    }
}

impl fmt::Display for ExactCalculationParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Target operation: {} ({})",
            self.operation,
            self.operation.name()
        )?;
        if self.operation.is_meta() {
            writeln!(f, "  Largest improper rotation order tried: {}", self.sn_max)?;
        }
        writeln!(f, "Mapping legality: {}", self.legality)?;
        writeln!(
            f,
            "User-supplied permutation: {}",
            self.permutation
                .as_ref()
                .map(|perm| format!("[{}]", perm.iter().join(", ")))
                .unwrap_or_else(|| nice_bool(false))
        )?;
        writeln!(
            f,
            "Timeout: {:.1} s ({} checks)",
            self.timeout, self.timeout_check
        )?;
        writeln!(f, "Prochirality: {}", nice_bool(self.prochirality))?;
        writeln!(
            f,
            "Save exact calculation results to file: {}",
            if let Some(name) = self.result_save_name.as_ref() {
                format!("{}.yml", name.display())
            } else {
                nice_bool(false)
            }
        )?;
        writeln!(f)?;
        Ok(())
    }
}

// -----
// State
// -----

/// A permutation together with the measure and direction it achieves for an operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CsmState {
    /// The operation against which the measure has been evaluated.
    pub operation: Operation,

    /// The permutation, as the image of every atom index.
    pub permutation: Vec<usize>,

    /// The continuous symmetry measure, between 0 and 100.
    pub csm: f64,

    /// The optimal axis of the operation, or the normal of the mirror plane.
    pub direction: Vector3<f64>,

    /// Boolean indicating if no exact symmetry has been found for the operation.
    pub is_chiral: bool,

    /// The number of permutations enumerated when this state was produced.
    pub serial: u64,
}

impl CsmState {
    /// Returns a placeholder state carrying an infinitely poor measure.
    fn placeholder(operation: &Operation) -> Self {
        Self {
            operation: operation.clone(),
            permutation: vec![],
            csm: f64::MAX,
            direction: Vector3::zeros(),
            is_chiral: true,
            serial: 0,
        }
    }

    /// Returns `true` if no permutation has been measured for this state.
    pub fn is_placeholder(&self) -> bool {
        self.permutation.is_empty() && self.csm == f64::MAX
    }
}

impl fmt::Display for CsmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Operation: {}", self.operation)?;
        writeln!(f, "CSM: {:.6}", self.csm)?;
        writeln!(
            f,
            "Direction: ({})",
            self.direction.iter().map(|x| format!("{x:+.6}")).join(", ")
        )?;
        writeln!(f, "Chiral: {}", nice_bool(self.is_chiral))?;
        writeln!(f, "Permutation: [{}]", self.permutation.iter().join(", "))?;
        Ok(())
    }
}

// ----------
// Statistics
// ----------

/// Counters gathered over all the searches of an exact calculation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExactStatistics {
    /// The number of complete permutations measured.
    pub perm_count: u64,

    /// The number of accepted mappings.
    pub branches: u64,

    /// The number of rejected mappings.
    pub dead_ends: u64,

    /// The number of permutations skipped because the reference-plane solver failed.
    pub solver_failures: u64,

    /// The wall-clock run time in seconds.
    pub runtime: f64,
}

impl ExactStatistics {
    fn absorb(&mut self, stats: &PermuterStatistics, solver_failures: u64) {
        self.perm_count += stats.perm_count;
        self.branches += stats.branches;
        self.dead_ends += stats.dead_ends;
        self.solver_failures += solver_failures;
    }
}

impl fmt::Display for ExactStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Number of permutations: {}", self.perm_count)?;
        writeln!(
            f,
            "Number of branches in permutation tree: {}",
            self.branches
        )?;
        writeln!(f, "Number of dead ends: {}", self.dead_ends)?;
        if self.solver_failures > 0 {
            writeln!(f, "Number of solver failures: {}", self.solver_failures)?;
        }
        writeln!(f, "Run time: {:.3} s", self.runtime)?;
        Ok(())
    }
}

// ------
// Result
// ------

/// A structure to contain exact CSM calculation results.
#[derive(Clone, Builder, Debug, Serialize, Deserialize)]
pub struct ExactCalculationResult {
    /// The control parameters used to obtain this set of results.
    pub parameters: ExactCalculationParams,

    /// The best state found. For the chirality meta-operation, this carries the operation
    /// realising the smallest measure.
    pub best: CsmState,

    /// The counters of the calculation.
    pub statistics: ExactStatistics,

    /// Boolean indicating if the search space has been fully explored or an exact symmetry
    /// found before the timeout.
    pub completed: bool,

    /// The cycle structure of a user-supplied permutation relative to the best operation.
    #[builder(default = "None")]
    pub cycle_check: Option<CycleStructureCheck>,
}

impl ExactCalculationResult {
    /// Returns a builder to construct a [`ExactCalculationResult`] structure.
    fn builder() -> ExactCalculationResultBuilder {
        ExactCalculationResultBuilder::default()
    }
}

impl fmt::Display for ExactCalculationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_subtitle(f, &format!("Best {} state", self.best.operation))?;
        writeln!(f)?;
        write!(f, "{}", self.best)?;
        writeln!(f)?;
        if let Some(cycle_check) = self.cycle_check.as_ref() {
            write!(f, "{cycle_check}")?;
            writeln!(f)?;
        }
        write!(f, "{}", self.statistics)?;
        writeln!(
            f,
            "Search completed: {}",
            if self.completed {
                nice_bool(true)
            } else {
                "no (timed out)".to_string()
            }
        )?;
        writeln!(f)?;
        Ok(())
    }
}

// -----
// Error
// -----

/// Error raised when no finite measure could be obtained for any permutation.
#[derive(Debug, Clone)]
pub struct CsmValueError {
    /// A description of the failure.
    pub message: String,

    /// The placeholder best state at the time of failure.
    pub state: Box<CsmState>,
}

impl fmt::Display for CsmValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CSM value error: {}", self.message)
    }
}

impl Error for CsmValueError {}

/// The outcome of one search over the permutations of a single operation.
struct SearchOutcome {
    best: CsmState,
    reference_vectors: Option<(Vector3<f64>, Vector3<f64>)>,
    is_exact: bool,
    timed_out: bool,
}

/// A callback receiving the state of every measured permutation.
pub type CsmStateCallback<'a> = Box<dyn FnMut(&CsmState) + 'a>;

// ------
// Driver
// ------

/// A driver for exact CSM calculations.
#[derive(Builder)]
pub struct ExactCalculationDriver<'a> {
    /// The control parameters for the exact calculation.
    parameters: &'a ExactCalculationParams,

    /// The prepared molecule to be measured.
    molecule: &'a Molecule,

    /// An optional callback invoked with the state of every measured permutation.
    #[builder(setter(skip), default = "None")]
    callback: Option<CsmStateCallback<'a>>,

    /// The result of the exact calculation.
    #[builder(setter(skip), default = "None")]
    result: Option<ExactCalculationResult>,
}

impl<'a> ExactCalculationDriver<'a> {
    /// Returns a builder to construct a [`ExactCalculationDriver`] structure.
    pub fn builder() -> ExactCalculationDriverBuilder<'a> {
        ExactCalculationDriverBuilder::default()
    }

    /// Registers a callback to be invoked with the state of every measured permutation, for
    /// tracing purposes.
    pub fn set_callback(&mut self, callback: impl FnMut(&CsmState) + 'a) {
        self.callback = Some(Box::new(callback));
    }

    /// Measures every admissible permutation for one operation and keeps the best.
    ///
    /// # Arguments
    ///
    /// * `operation` - The operation, which must not be the chirality meta-operation.
    /// * `deadline` - The instant after which the enumeration stops.
    /// * `fixed_vectors` - If given, the direction is restricted to the plane spanned by these
    /// two orthonormal vectors.
    /// * `statistics` - The counters to which those of this search are added.
    fn search(
        &mut self,
        operation: &Operation,
        deadline: Option<Instant>,
        fixed_vectors: Option<(Vector3<f64>, Vector3<f64>)>,
        statistics: &mut ExactStatistics,
    ) -> Result<SearchOutcome, anyhow::Error> {
        let params = self.parameters;
        let molecule = self.molecule;
        let callback = &mut self.callback;
        let want_vectors = params.prochirality && fixed_vectors.is_none();

        let mut permuter: Box<dyn Permuter + 'a> = match params.permutation.as_ref() {
            Some(perm) => Box::new(SinglePermPermuter::new(molecule, operation, perm)?),
            None => {
                let estimate =
                    estimate_permutation_count(molecule.equivalence_classes(), operation);
                csm2_output!(
                    "There are {estimate:.0} possible permutations for {operation} before bond \
                    constraints are applied."
                );
                Box::new(
                    ConstrainedPermuter::new(molecule, operation, params.legality)?
                        .with_deadline(deadline, params.timeout_check),
                )
            }
        };

        let start = Instant::now();
        let mut best = CsmState::placeholder(operation);
        let mut reference_vectors = None;
        let mut is_exact = false;
        let mut serial = 0u64;
        let mut solver_failures = 0u64;
        let flow = permuter.permute(&mut |pip| {
            serial += 1;
            if serial % PROGRESS_INTERVAL == 0 {
                csm2_output!(
                    "Calculated for {} million permutations thus far... Time: {:.3} s",
                    serial / PROGRESS_INTERVAL,
                    start.elapsed().as_secs_f64()
                );
            }
            let input = pip.ref_plane_input();
            let solved = match fixed_vectors {
                None => calc_ref_plane(&input, want_vectors),
                Some((v1, v2)) => calc_ref_plane_in_span(&input, &v1, &v2),
            };
            let plane = match solved {
                Ok(plane) => plane,
                Err(err) => {
                    solver_failures += 1;
                    csm2_warn!("{err} Permutation #{serial} for {operation} is skipped.");
                    return ControlFlow::Continue(());
                }
            };
            let Some(permutation) = pip.permutation() else {
                return ControlFlow::Continue(());
            };
            if let Some(callback) = callback.as_mut() {
                callback(&CsmState {
                    operation: operation.clone(),
                    permutation: permutation.clone(),
                    csm: plane.csm,
                    direction: plane.direction,
                    is_chiral: plane.csm >= ZERO_CSM_THRESHOLD,
                    serial,
                });
            }
            if plane.csm < best.csm {
                best = CsmState {
                    operation: operation.clone(),
                    permutation,
                    csm: plane.csm,
                    direction: plane.direction,
                    is_chiral: true,
                    serial,
                };
                if plane.csm.abs() < ZERO_CSM_THRESHOLD {
                    is_exact = true;
                    reference_vectors = plane.reference_vectors;
                    return ControlFlow::Break(());
                }
            }
            ControlFlow::Continue(())
        });

        // A break is either an exact match or the deadline; both are recorded already.
        let permuter_stats = permuter.statistics();
        statistics.absorb(permuter_stats, solver_failures);
        log::debug!(
            "Search for {operation} {}: {} permutations, {} branches, {} dead ends.",
            if flow.is_break() { "stopped early" } else { "exhausted" },
            permuter_stats.perm_count,
            permuter_stats.branches,
            permuter_stats.dead_ends
        );
        Ok(SearchOutcome {
            best,
            reference_vectors,
            is_exact,
            timed_out: permuter_stats.timed_out,
        })
    }

    /// Measures one concrete operation, following up with the prochirality pass if requested
    /// and an exact symmetry has been found.
    fn calculate_operation(
        &mut self,
        operation: &Operation,
        deadline: Option<Instant>,
        statistics: &mut ExactStatistics,
    ) -> Result<SearchOutcome, anyhow::Error> {
        let outcome = self.search(operation, deadline, None, statistics)?;
        if !(self.parameters.prochirality && outcome.is_exact) {
            return Ok(outcome);
        }
        let Some(fixed_vectors) = outcome.reference_vectors else {
            return Ok(outcome);
        };
        csm2_output!(
            "Found exact {operation} symmetry along ({}). Computing prochirality.",
            outcome
                .best
                .direction
                .iter()
                .map(|x| format!("{x:+.6}"))
                .join(", ")
        );
        let prochiral = self.search(operation, deadline, Some(fixed_vectors), statistics)?;
        if prochiral.best.is_placeholder() {
            return Ok(outcome);
        }
        Ok(SearchOutcome {
            best: prochiral.best,
            reference_vectors: Some(fixed_vectors),
            is_exact: true,
            timed_out: outcome.timed_out || prochiral.timed_out,
        })
    }

    /// Resolves the chirality meta-operation into a mirror-plane search followed by a sweep of
    /// improper rotations, keeping the best.
    fn calculate_chirality(
        &mut self,
        deadline: Option<Instant>,
        statistics: &mut ExactStatistics,
    ) -> Result<SearchOutcome, anyhow::Error> {
        let sn_max = self.parameters.sn_max;
        let candidates = std::iter::once(Ok(Operation::cs()))
            .chain((2..=sn_max).step_by(2).map(Operation::sn))
            .collect::<Result<Vec<_>, _>>()?;

        let mut overall: Option<SearchOutcome> = None;
        let mut timed_out = false;
        for operation in candidates.iter() {
            if overall
                .as_ref()
                .map(|best| best.best.csm < MIN_CHIRALITY_CSM)
                .unwrap_or(false)
            {
                break;
            }
            log_micsec_begin(&format!("{operation} search"));
            let outcome = self.calculate_operation(operation, deadline, statistics)?;
            timed_out = timed_out || outcome.timed_out;
            if outcome.best.is_placeholder() {
                csm2_output!("No measure could be obtained for {operation}.");
            } else {
                csm2_output!("{operation} measure: {:.6}", outcome.best.csm);
            }
            log_micsec_end(&format!("{operation} search"));
            csm2_output!("");

            let improved = overall
                .as_ref()
                .map(|best| outcome.best.csm < best.best.csm)
                .unwrap_or(true);
            if improved {
                overall = Some(outcome);
            }
        }
        let mut overall =
            overall.ok_or_else(|| format_err!("No operation to try for chirality."))?;
        overall.timed_out = timed_out;
        Ok(overall)
    }

    /// Executes the exact calculation.
    fn calculate(&mut self) -> Result<(), anyhow::Error> {
        log_title("Exact CSM Calculation");
        csm2_output!("");
        let params = self.parameters;
        params.log_output_display();

        if !(params.timeout.is_finite() && params.timeout > 0.0) {
            bail!(
                "The timeout must be a positive number of seconds, but {} is given.",
                params.timeout
            );
        }
        if let Some(perm) = params.permutation.as_ref() {
            if perm.len() != self.molecule.n_atoms() {
                bail!(
                    "The permutation has {} entries, but the molecule has {} atoms.",
                    perm.len(),
                    self.molecule.n_atoms()
                );
            }
        }

        let start = Instant::now();
        let deadline = Duration::try_from_secs_f64(params.timeout)
            .ok()
            .and_then(|timeout| start.checked_add(timeout));
        let mut statistics = ExactStatistics::default();

        log_subtitle("Permutation search");
        csm2_output!("");
        let outcome = if params.operation.is_meta() {
            self.calculate_chirality(deadline, &mut statistics)?
        } else {
            self.calculate_operation(&params.operation, deadline, &mut statistics)?
        };
        statistics.runtime = start.elapsed().as_secs_f64();
        csm2_output!("");

        if outcome.best.is_placeholder() {
            return Err(CsmValueError {
                message: format!(
                    "Failed to calculate a CSM value for {}.",
                    params.operation
                ),
                state: Box::new(outcome.best),
            }
            .into());
        }
        if outcome.timed_out {
            csm2_warn!(
                "The search timed out after {:.1} s. The best result so far is reported.",
                params.timeout
            );
        }

        let mut best = outcome.best;
        best.is_chiral = !outcome.is_exact;
        let cycle_check = params
            .permutation
            .as_ref()
            .map(|perm| Permutation::from_image(perm).map(|perm| perm.check_cycles(&best.operation)))
            .transpose()?;

        self.result = ExactCalculationResult::builder()
            .parameters(params.clone())
            .best(best)
            .statistics(statistics)
            .completed(!outcome.timed_out)
            .cycle_check(cycle_check)
            .build()
            .ok();

        // Save exact calculation result, if requested
        if let Some(exact_res) = self.result.as_ref() {
            exact_res.log_output_display();
            if let Some(name) = params.result_save_name.as_ref() {
                write_csm2_yaml(name, exact_res)?;
                csm2_output!(
                    "Exact calculation results saved as {}.yml.",
                    name.display()
                );
                csm2_output!("");
            }
        }

        Ok(())
    }
}

impl<'a> Csm2Driver for ExactCalculationDriver<'a> {
    type Params = ExactCalculationParams;

    type Outcome = ExactCalculationResult;

    fn result(&self) -> Result<&Self::Outcome, anyhow::Error> {
        self.result
            .as_ref()
            .ok_or_else(|| format_err!("No exact calculation results found."))
    }

    fn run(&mut self) -> Result<(), anyhow::Error> {
        self.calculate()
    }
}
