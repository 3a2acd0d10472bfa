use std::ops::Range;
use std::path::Path;

use lmcal_core::{CalError, ErrorInfo, TensileTest};
use lmcal_fit::{Fitter, FitterSetUp, LmFitter, ParamTree, WriterRegistry};
use lmcal_io::{read_simulation_table, read_tensile_test_data};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::RunConfig;

/// Directory indices of the batch generated by iteration `opt_index`.
///
/// Batch `n` owns `[(n - 1) * S, n * S)`; an index of zero means no batch
/// was ever generated.
pub fn simulation_batch(opt_index: usize, sims_per_iteration: usize) -> Result<Range<usize>, CalError> {
    let Some(previous) = opt_index.checked_sub(1) else {
        return Err(CalError::PrematureIteration(
            ErrorInfo::new(
                "lmcal_run.no_batch",
                "the checkpointed fitter has not generated any simulations",
            )
            .with_hint("run `lmcal set-up` to generate the first batch"),
        ));
    };
    let start = previous * sims_per_iteration;
    Ok(start..start + sims_per_iteration)
}

/// Where a calibration run currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationStage {
    /// No checkpoint exists yet.
    Uninitialized,
    /// The first batch was generated; no results were ingested.
    SetUp,
    /// At least one batch of results was ingested.
    Iterating,
}

/// Summary printed by `lmcal status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    /// Current stage.
    pub stage: CalibrationStage,
    /// Batches generated so far.
    pub opt_index: usize,
    /// Simulations per batch.
    pub sims_per_iteration: usize,
    /// Directories whose results the next `iterate` will read.
    pub pending_batch: Option<Range<usize>>,
    /// Fit error of every completed iteration.
    pub errors: Vec<f64>,
    /// Damping factor used by every completed iteration.
    pub damping: Vec<f64>,
    /// Parameter values of the lowest-error iteration.
    pub best_parameters: Vec<(String, Vec<f64>)>,
}

impl StatusReport {
    fn uninitialized() -> Self {
        Self {
            stage: CalibrationStage::Uninitialized,
            opt_index: 0,
            sims_per_iteration: 0,
            pending_batch: None,
            errors: Vec::new(),
            damping: Vec::new(),
            best_parameters: Vec::new(),
        }
    }
}

/// Drives a calibration run across process invocations through the checkpoint.
pub struct IterationController {
    config: RunConfig,
    writers: WriterRegistry,
}

impl IterationController {
    /// Creates a controller over `config` using the given inputs writers.
    pub fn new(config: RunConfig, writers: WriterRegistry) -> Self {
        Self { config, writers }
    }

    /// The run configuration.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Loads and converts the configured experimental curve.
    pub fn load_experimental_curve(&self) -> Result<TensileTest, CalError> {
        let path = &self.config.paths.experimental_data;
        let records = read_tensile_test_data(path).map_err(|err| set_up_error("lmcal_run.experimental_data", path, err))?;
        let index = self.config.experiment.orientation_index;
        let Some(record) = records.get(index) else {
            return Err(CalError::SetUp(
                ErrorInfo::new(
                    "lmcal_run.orientation_index",
                    format!("orientation index {index} is out of range"),
                )
                .with_path(path)
                .with_context("records", records.len().to_string()),
            ));
        };
        debug!(orientation = record.orientation, samples = record.len(), "selected experimental record");
        record
            .to_tensile_test(self.config.experiment.stress_scale)
            .map_err(|err| set_up_error("lmcal_run.experimental_data", path, err))
    }

    /// Starts a run: builds the fitter, writes the first batch, checkpoints.
    pub fn set_up(&self) -> Result<LmFitter, CalError> {
        let paths = &self.config.paths;
        let experimental = self.load_experimental_curve()?;
        let material_params = ParamTree::load_yaml(&paths.material_params)?;

        let mut fitter = LmFitter::new(FitterSetUp {
            experimental,
            material_params,
            fitting_params: self.config.fitting_parameters.clone(),
            inputs_writer: self.config.inputs_writer.clone(),
            base_sim_dir: paths.base_sim_dir.clone(),
            sim_dir: paths.sim_dir.clone(),
            initial_damping: self.config.initial_damping.clone(),
        })?;
        fitter.generate_simulation_inputs(&self.writers)?;

        if paths.checkpoint.exists() {
            warn!(path = %paths.checkpoint.display(), "overwriting existing checkpoint");
        }
        fitter.to_json_file(&paths.checkpoint)?;
        info!(
            sims = fitter.sims_per_iteration(),
            sim_dir = %fitter.sim_dir().display(),
            "set-up complete"
        );
        Ok(fitter)
    }

    /// Advances the run by one iteration.
    ///
    /// The checkpoint is only rewritten after every result of the pending
    /// batch was read and the next batch was generated.
    pub fn iterate<F: Fitter>(&self) -> Result<F, CalError> {
        let checkpoint = &self.config.paths.checkpoint;
        let mut fitter = F::from_json_file(checkpoint)?;
        let batch = simulation_batch(fitter.opt_index(), fitter.sims_per_iteration())?;
        info!(opt_index = fitter.opt_index(), ?batch, "collecting simulation results");

        let tests = self.collect_simulated_tests(fitter.sim_dir(), batch)?;
        fitter.add_simulated_tensile_tests(tests)?;
        fitter.generate_simulation_inputs(&self.writers)?;
        fitter.to_json_file(checkpoint)?;
        info!(opt_index = fitter.opt_index(), "iteration complete");
        Ok(fitter)
    }

    /// Reads the simulated curves of `batch`, ordered by directory index.
    ///
    /// Every output must exist before any is parsed.
    pub fn collect_simulated_tests(
        &self,
        sim_dir: &Path,
        batch: Range<usize>,
    ) -> Result<Vec<TensileTest>, CalError> {
        let output = &self.config.paths.simulation_output;
        let outputs: Vec<_> = batch.map(|i| (i, sim_dir.join(i.to_string()).join(output))).collect();
        if let Some((index, path)) = outputs.iter().find(|(_, path)| !path.is_file()) {
            return Err(CalError::MissingSimulationOutput(
                ErrorInfo::new(
                    "lmcal_run.missing_output",
                    format!("simulation {index} has no output"),
                )
                .with_path(path)
                .with_context("index", index.to_string())
                .with_hint("wait for every simulation of the batch to finish"),
            ));
        }

        let columns = &self.config.simulation_columns;
        outputs
            .iter()
            .map(|(index, path)| {
                let table = read_simulation_table(path)?;
                let strain = table.column_by_label(&columns.strain)?;
                let stress = table.column_by_label(&columns.stress)?;
                debug!(index, rows = table.n_rows(), "read simulation output");
                TensileTest::from_true(strain, stress)
            })
            .collect()
    }

    /// Reports the stage of the run recorded in the checkpoint.
    pub fn status(&self) -> Result<StatusReport, CalError> {
        let fitter = match LmFitter::from_json_file(&self.config.paths.checkpoint) {
            Ok(fitter) => fitter,
            Err(CalError::NoCheckpoint(_)) => return Ok(StatusReport::uninitialized()),
            Err(err) => return Err(err),
        };

        let stage = if fitter.iterations().is_empty() {
            CalibrationStage::SetUp
        } else {
            CalibrationStage::Iterating
        };
        let pending_batch = if fitter.awaiting_results() {
            simulation_batch(fitter.opt_index(), fitter.sims_per_iteration()).ok()
        } else {
            None
        };
        let best_parameters = fitter
            .best_iteration()
            .map(|it| fitter.parameter_values(&it.scales))
            .unwrap_or_default();

        Ok(StatusReport {
            stage,
            opt_index: fitter.opt_index(),
            sims_per_iteration: fitter.sims_per_iteration(),
            pending_batch,
            errors: fitter.iterations().iter().map(|it| it.error).collect(),
            damping: fitter.damping_history().to_vec(),
            best_parameters,
        })
    }
}

fn set_up_error(code: &str, path: &Path, err: CalError) -> CalError {
    let cause = err.info().code.clone();
    CalError::SetUp(
        ErrorInfo::new(code, err.to_string())
            .with_path(path)
            .with_context("cause", cause),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batches_are_contiguous() {
        assert_eq!(simulation_batch(1, 3).unwrap(), 0..3);
        assert_eq!(simulation_batch(2, 3).unwrap(), 3..6);
        assert_eq!(simulation_batch(4, 5).unwrap(), 15..20);
    }

    #[test]
    fn zero_index_is_premature() {
        let err = simulation_batch(0, 3).unwrap_err();
        assert!(matches!(err, CalError::PrematureIteration(_)));
    }
}
