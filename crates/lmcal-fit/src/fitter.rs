use std::path::Path;

use lmcal_core::{CalError, TensileTest};

use crate::writer::WriterRegistry;

/// Optimizer driven one simulation batch at a time.
///
/// Directory indices are assigned densely: batch `n` (1-based) occupies
/// `[(n - 1) * S, n * S)` under [`Fitter::sim_dir`], where `S` is
/// [`Fitter::sims_per_iteration`]. Result `i` of a batch belongs to the
/// `i`-th directory of that batch.
pub trait Fitter: Sized {
    /// Number of batches generated so far.
    fn opt_index(&self) -> usize;

    /// Number of simulations in every batch.
    fn sims_per_iteration(&self) -> usize;

    /// Directory under which numbered simulation directories are created.
    fn sim_dir(&self) -> &Path;

    /// Writes the next batch of simulation inputs and increments the iteration index.
    fn generate_simulation_inputs(&mut self, writers: &WriterRegistry) -> Result<(), CalError>;

    /// Ingests the results of the latest batch, ordered by directory index.
    fn add_simulated_tensile_tests(&mut self, tests: Vec<TensileTest>) -> Result<(), CalError>;

    /// Persists the full fitter state.
    fn to_json_file(&self, path: &Path) -> Result<(), CalError>;

    /// Restores a fitter persisted with [`Fitter::to_json_file`].
    fn from_json_file(path: &Path) -> Result<Self, CalError>;
}
