use std::fs;
use std::path::{Path, PathBuf};

use lmcal_core::{CalError, ErrorInfo, TensileTest};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::checkpoint;
use crate::fitter::Fitter;
use crate::params::{FittingParameter, ParamTree};
use crate::step::{self, GRID_POINTS};
use crate::writer::{InputsWriterSpec, WriterRegistry};

/// Smallest fraction of its previous value a scale may shrink to in one step.
const MIN_SCALE_RATIO: f64 = 0.1;

/// Everything needed to start a calibration.
#[derive(Debug, Clone)]
pub struct FitterSetUp {
    /// Target curve, stress in Pa.
    pub experimental: TensileTest,
    /// Material document the fitted values are written into.
    pub material_params: ParamTree,
    /// Calibrated parameters.
    pub fitting_params: Vec<FittingParameter>,
    /// Writer producing each simulation's input files.
    pub inputs_writer: InputsWriterSpec,
    /// Template directory copied into every simulation directory.
    pub base_sim_dir: PathBuf,
    /// Parent of the numbered simulation directories.
    pub sim_dir: PathBuf,
    /// Damping factors for the first iterations, in order.
    pub initial_damping: Vec<f64>,
}

/// Results of one completed batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LmIteration {
    /// Parameter scales of the batch's centre simulation.
    pub scales: Vec<f64>,
    /// RMS of the normalised stress residual at the centre.
    pub error: f64,
    /// Normalised residual at the centre.
    pub residual: Vec<f64>,
    /// Forward-difference Jacobian columns, one per parameter.
    pub jacobian: Vec<Vec<f64>>,
}

/// Levenberg–Marquardt fitter over multiplicative parameter scales.
///
/// Each batch holds one centre simulation followed by one forward
/// perturbation per fitting parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LmFitter {
    exp_tensile_test: TensileTest,
    material_params: ParamTree,
    fitting_params: Vec<FittingParameter>,
    inputs_writer: InputsWriterSpec,
    base_sim_dir: PathBuf,
    sim_dir: PathBuf,
    initial_damping: Vec<f64>,
    strain_grid: Vec<f64>,
    opt_index: usize,
    sims_per_iteration: usize,
    next_scales: Vec<f64>,
    param_history: Vec<Vec<f64>>,
    damping_history: Vec<f64>,
    iterations: Vec<LmIteration>,
}

impl LmFitter {
    /// Validates the set-up and builds a fitter with no batches generated.
    pub fn new(setup: FitterSetUp) -> Result<Self, CalError> {
        if setup.fitting_params.is_empty() {
            return Err(fitter_error("lmcal_fit.no_parameters", "at least one fitting parameter is required"));
        }
        if setup.initial_damping.is_empty() || setup.initial_damping.iter().any(|d| !d.is_finite() || *d <= 0.0) {
            return Err(fitter_error(
                "lmcal_fit.initial_damping",
                "initial damping must be a non-empty list of positive values",
            ));
        }
        let mut probe = setup.material_params.clone();
        for param in &setup.fitting_params {
            if param.initial_value.is_empty() || !param.step_size.is_finite() || param.step_size <= 0.0 {
                return Err(CalError::Fitter(
                    ErrorInfo::new(
                        "lmcal_fit.parameter_invalid",
                        "fitting parameter needs a value and a positive step size",
                    )
                    .with_context("parameter", param.name.as_str()),
                ));
            }
            param.apply(&mut probe, 1.0)?;
        }

        let n_params = setup.fitting_params.len();
        Ok(Self {
            strain_grid: step::strain_grid(&setup.experimental, GRID_POINTS),
            exp_tensile_test: setup.experimental,
            material_params: setup.material_params,
            fitting_params: setup.fitting_params,
            inputs_writer: setup.inputs_writer,
            base_sim_dir: setup.base_sim_dir,
            sim_dir: setup.sim_dir,
            initial_damping: setup.initial_damping,
            opt_index: 0,
            sims_per_iteration: n_params + 1,
            next_scales: vec![1.0; n_params],
            param_history: Vec::new(),
            damping_history: Vec::new(),
            iterations: Vec::new(),
        })
    }

    /// Experimental target curve.
    pub fn experimental(&self) -> &TensileTest {
        &self.exp_tensile_test
    }

    /// Calibrated parameters.
    pub fn fitting_params(&self) -> &[FittingParameter] {
        &self.fitting_params
    }

    /// Base simulation directory copied into every new simulation directory.
    pub fn base_sim_dir(&self) -> &Path {
        &self.base_sim_dir
    }

    /// Centre scales of every generated batch.
    pub fn param_history(&self) -> &[Vec<f64>] {
        &self.param_history
    }

    /// Damping used for each step taken so far.
    pub fn damping_history(&self) -> &[f64] {
        &self.damping_history
    }

    /// Completed iterations in order.
    pub fn iterations(&self) -> &[LmIteration] {
        &self.iterations
    }

    /// Scales the next batch will be centred on.
    pub fn next_scales(&self) -> &[f64] {
        &self.next_scales
    }

    /// True when a generated batch has not had its results ingested yet.
    pub fn awaiting_results(&self) -> bool {
        self.iterations.len() < self.opt_index
    }

    /// Iteration with the lowest error so far.
    pub fn best_iteration(&self) -> Option<&LmIteration> {
        self.iterations
            .iter()
            .min_by(|a, b| a.error.total_cmp(&b.error))
    }

    /// Parameter values (name, value) for the given scales.
    pub fn parameter_values(&self, scales: &[f64]) -> Vec<(String, Vec<f64>)> {
        self.fitting_params
            .iter()
            .zip(scales)
            .map(|(param, scale)| {
                (
                    param.name.clone(),
                    param.initial_value.iter().map(|v| v * scale).collect(),
                )
            })
            .collect()
    }

    /// Material document with every fitting parameter set for `scales`.
    pub fn material_for(&self, scales: &[f64]) -> Result<ParamTree, CalError> {
        let mut doc = self.material_params.clone();
        for (param, scale) in self.fitting_params.iter().zip(scales) {
            param.apply(&mut doc, *scale)?;
        }
        Ok(doc)
    }

    fn perturbations(&self, centre: &[f64]) -> Vec<f64> {
        self.fitting_params
            .iter()
            .zip(centre)
            .map(|(param, scale)| {
                if *scale == 0.0 {
                    param.step_size
                } else {
                    scale * param.step_size
                }
            })
            .collect()
    }

    fn trial_scales(&self, centre: &[f64]) -> Vec<Vec<f64>> {
        let mut trials = Vec::with_capacity(self.sims_per_iteration);
        trials.push(centre.to_vec());
        for (j, delta) in self.perturbations(centre).into_iter().enumerate() {
            let mut trial = centre.to_vec();
            trial[j] += delta;
            trials.push(trial);
        }
        trials
    }

    /// Damping for the step after iteration `k` and the iteration to step from.
    fn choose_damping(&self, k: usize, error: f64) -> (usize, f64) {
        if let Some(&damping) = self.initial_damping.get(k) {
            return (k, damping);
        }
        let previous = self.damping_history.last().copied().unwrap_or(1.0);
        let best_before = self.iterations[..k]
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.error.total_cmp(&b.1.error));
        match best_before {
            Some((idx, best)) if best.error <= error => (idx, previous * 2.0),
            _ => (k, previous / 2.0),
        }
    }
}

fn fitter_error(code: &str, message: &str) -> CalError {
    CalError::Fitter(ErrorInfo::new(code, message))
}

/// Replaces `dest` with a copy of `base`.
fn prepare_sim_dir(base: &Path, dest: &Path) -> Result<(), CalError> {
    if !base.is_dir() {
        return Err(CalError::Io(
            ErrorInfo::new("lmcal_fit.base_sim_dir", "base simulation directory does not exist")
                .with_path(base),
        ));
    }
    if dest.exists() {
        fs::remove_dir_all(dest).map_err(|err| CalError::io("lmcal_fit.sim_dir_clear", dest, err))?;
    }
    for entry in WalkDir::new(base) {
        let entry = entry.map_err(|err| CalError::io("lmcal_fit.base_sim_walk", base, err))?;
        let relative = entry
            .path()
            .strip_prefix(base)
            .map_err(|err| CalError::io("lmcal_fit.base_sim_walk", entry.path(), err))?;
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|err| CalError::io("lmcal_fit.sim_dir_create", &target, err))?;
        } else {
            fs::copy(entry.path(), &target).map_err(|err| CalError::io("lmcal_fit.sim_dir_copy", &target, err))?;
        }
    }
    Ok(())
}

impl Fitter for LmFitter {
    fn opt_index(&self) -> usize {
        self.opt_index
    }

    fn sims_per_iteration(&self) -> usize {
        self.sims_per_iteration
    }

    fn sim_dir(&self) -> &Path {
        &self.sim_dir
    }

    fn generate_simulation_inputs(&mut self, writers: &WriterRegistry) -> Result<(), CalError> {
        if self.awaiting_results() {
            return Err(CalError::Fitter(
                ErrorInfo::new(
                    "lmcal_fit.results_pending",
                    "results of the previous batch have not been ingested",
                )
                .with_context("opt_index", self.opt_index.to_string()),
            ));
        }
        let writer = writers.get(&self.inputs_writer.writer)?;
        let centre = self.next_scales.clone();
        let first = self.opt_index * self.sims_per_iteration;

        for (offset, scales) in self.trial_scales(&centre).iter().enumerate() {
            let dir = self.sim_dir.join((first + offset).to_string());
            prepare_sim_dir(&self.base_sim_dir, &dir)?;
            let doc = self.material_for(scales)?;
            let args = self.inputs_writer.resolve_args(&doc.to_json_value()?, &dir);
            writer.write_inputs(&args)?;
            debug!(dir = %dir.display(), ?scales, "wrote simulation inputs");
        }

        info!(
            opt_index = self.opt_index + 1,
            first_dir = first,
            count = self.sims_per_iteration,
            "generated simulation batch"
        );
        self.param_history.push(centre);
        self.opt_index += 1;
        Ok(())
    }

    fn add_simulated_tensile_tests(&mut self, tests: Vec<TensileTest>) -> Result<(), CalError> {
        if self.opt_index == 0 || !self.awaiting_results() {
            return Err(CalError::Fitter(
                ErrorInfo::new("lmcal_fit.no_pending_batch", "no generated batch is awaiting results")
                    .with_context("opt_index", self.opt_index.to_string()),
            ));
        }
        if tests.len() != self.sims_per_iteration {
            return Err(CalError::Fitter(
                ErrorInfo::new("lmcal_fit.batch_size", "result count differs from batch size")
                    .with_context("expected", self.sims_per_iteration.to_string())
                    .with_context("found", tests.len().to_string()),
            ));
        }

        let centre = self.param_history[self.opt_index - 1].clone();
        let curves: Vec<Vec<f64>> = tests
            .iter()
            .map(|test| step::residuals(&self.exp_tensile_test, test, &self.strain_grid))
            .collect();
        let Some((base, perturbed)) = curves.split_first() else {
            return Err(fitter_error("lmcal_fit.batch_size", "batch holds no results"));
        };
        let jacobian = step::jacobian_columns(base, perturbed, &self.perturbations(&centre));
        let error = step::rms(base);

        let current = LmIteration {
            scales: centre,
            error,
            residual: base.clone(),
            jacobian,
        };
        let k = self.iterations.len();
        let (origin, damping) = self.choose_damping(k, error);
        let from = self.iterations.get(origin).unwrap_or(&current);
        let delta = step::damped_step(&from.jacobian, &from.residual, damping)?;
        let next_scales: Vec<f64> = from
            .scales
            .iter()
            .zip(&delta)
            .map(|(s, d)| (s + d).max(s * MIN_SCALE_RATIO))
            .collect();
        if !error.is_finite() || next_scales.iter().any(|s| !s.is_finite()) {
            return Err(CalError::Fitter(
                ErrorInfo::new("lmcal_fit.non_finite_step", "iteration produced a non-finite error or step")
                    .with_context("error", error.to_string())
                    .with_context("next", format!("{next_scales:?}")),
            ));
        }

        self.iterations.push(current);
        self.next_scales = next_scales;
        self.damping_history.push(damping);

        info!(
            iteration = k,
            error,
            damping,
            step_from = origin,
            next = ?self.next_scales,
            "ingested simulation batch"
        );
        Ok(())
    }

    fn to_json_file(&self, path: &Path) -> Result<(), CalError> {
        checkpoint::save(self, path)
    }

    fn from_json_file(path: &Path) -> Result<Self, CalError> {
        checkpoint::load(path)
    }
}
