use std::fs;
use std::path::{Path, PathBuf};

use lmcal_core::{CalError, ErrorInfo};
use lmcal_fit::{FittingParameter, InputsWriterSpec, PathSegment, CHECKPOINT_FILE_NAME};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// YAML-configurable description of a calibration run.
///
/// Every field has a default, so an empty document (or no document at all)
/// describes the standard tensile calibration layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Filesystem locations used by the run.
    #[serde(default)]
    pub paths: PathConfig,
    /// Which experimental curve to fit and its unit conversion.
    #[serde(default)]
    pub experiment: ExperimentConfig,
    /// Column labels read from each simulation output table.
    #[serde(default)]
    pub simulation_columns: SimulationColumns,
    /// Parameters to calibrate and where they live in the material document.
    #[serde(default = "default_fitting_parameters")]
    pub fitting_parameters: Vec<FittingParameter>,
    /// Writer used to produce each simulation's inputs.
    #[serde(default = "default_inputs_writer")]
    pub inputs_writer: InputsWriterSpec,
    /// Damping factors of the first optimizer iterations.
    #[serde(default = "default_initial_damping")]
    pub initial_damping: Vec<f64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            paths: PathConfig::default(),
            experiment: ExperimentConfig::default(),
            simulation_columns: SimulationColumns::default(),
            fitting_parameters: default_fitting_parameters(),
            inputs_writer: default_inputs_writer(),
            initial_damping: default_initial_damping(),
        }
    }
}

impl RunConfig {
    /// Reads a YAML configuration file.
    pub fn load(path: &Path) -> Result<Self, CalError> {
        let text = fs::read_to_string(path).map_err(|err| CalError::io("lmcal_run.config_read", path, err))?;
        serde_yaml::from_str(&text).map_err(|err| {
            CalError::SetUp(ErrorInfo::new("lmcal_run.config_parse", err.to_string()).with_path(path))
        })
    }

    /// Resolves the relative run paths against `root`.
    ///
    /// `paths.simulation_output` stays relative; it is resolved per
    /// simulation directory.
    pub fn rooted_at(mut self, root: &Path) -> Self {
        let paths = &mut self.paths;
        for path in [
            &mut paths.experimental_data,
            &mut paths.material_params,
            &mut paths.base_sim_dir,
            &mut paths.sim_dir,
            &mut paths.checkpoint,
        ] {
            if path.is_relative() {
                *path = root.join(&*path);
            }
        }
        self
    }
}

/// Filesystem layout of a run. Relative paths resolve from the working directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathConfig {
    /// Multi-orientation tensile-test CSV.
    #[serde(default = "default_experimental_data")]
    pub experimental_data: PathBuf,
    /// Material parameter document (YAML).
    #[serde(default = "default_material_params")]
    pub material_params: PathBuf,
    /// Template simulation directory copied for each simulation.
    #[serde(default = "default_base_sim_dir")]
    pub base_sim_dir: PathBuf,
    /// Parent of the numbered simulation directories.
    #[serde(default = "default_sim_dir")]
    pub sim_dir: PathBuf,
    /// Checkpoint file chaining the invocations.
    #[serde(default = "default_checkpoint")]
    pub checkpoint: PathBuf,
    /// Simulator output table, relative to each simulation directory.
    #[serde(default = "default_simulation_output")]
    pub simulation_output: PathBuf,
}

fn default_experimental_data() -> PathBuf {
    PathBuf::from("data/experimental/surfalex_tensile_test_data.csv")
}

fn default_material_params() -> PathBuf {
    PathBuf::from("data/lm_opt/damask_material_params.yml")
}

fn default_base_sim_dir() -> PathBuf {
    PathBuf::from("data/lm_opt/base_damask_sim")
}

fn default_sim_dir() -> PathBuf {
    PathBuf::from("data/lm_opt/sims")
}

fn default_checkpoint() -> PathBuf {
    PathBuf::from(CHECKPOINT_FILE_NAME)
}

fn default_simulation_output() -> PathBuf {
    PathBuf::from("postProc").join("geom_load.txt")
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            experimental_data: default_experimental_data(),
            material_params: default_material_params(),
            base_sim_dir: default_base_sim_dir(),
            sim_dir: default_sim_dir(),
            checkpoint: default_checkpoint(),
            simulation_output: default_simulation_output(),
        }
    }
}

/// Selection and scaling of the experimental target curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Position of the orientation record to fit (0 is the first pair of columns).
    #[serde(default)]
    pub orientation_index: usize,
    /// Factor converting the file's stress unit to the fitter's (MPa to Pa).
    #[serde(default = "default_stress_scale")]
    pub stress_scale: f64,
}

fn default_stress_scale() -> f64 {
    1e6
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            orientation_index: 0,
            stress_scale: default_stress_scale(),
        }
    }
}

/// Labels of the stress and strain columns in simulation output tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationColumns {
    /// True stress column.
    #[serde(default = "default_stress_column")]
    pub stress: String,
    /// True strain column.
    #[serde(default = "default_strain_column")]
    pub strain: String,
}

fn default_stress_column() -> String {
    "Mises(Cauchy)".to_string()
}

fn default_strain_column() -> String {
    "Mises(ln(V))".to_string()
}

impl Default for SimulationColumns {
    fn default() -> Self {
        Self {
            stress: default_stress_column(),
            strain: default_strain_column(),
        }
    }
}

fn default_fitting_parameters() -> Vec<FittingParameter> {
    let keys = vec![
        PathSegment::from("phase"),
        PathSegment::Index(0),
        PathSegment::from("keys"),
    ];
    vec![
        FittingParameter::new("h0_slipslip", vec![400e6], keys.clone(), 0.1),
        FittingParameter::new("tausat_slip", vec![95e6], keys, 0.1),
    ]
}

fn default_inputs_writer() -> InputsWriterSpec {
    InputsWriterSpec {
        writer: "material-config".to_string(),
        args: json!({
            "material": lmcal_fit::PARAMETERS_TOKEN,
            "dir_path": lmcal_fit::SIM_DIR_TOKEN,
            "part_paths": {
                "Texture": "./texture.config",
                "Microstructure": "./microstructure.config",
            },
        }),
    }
}

fn default_initial_damping() -> Vec<f64> {
    vec![2.0, 1.0, 0.5]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config: RunConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, RunConfig::default());
        assert_eq!(config.paths.checkpoint, PathBuf::from("lm_fitter.json"));
        assert_eq!(config.experiment.stress_scale, 1e6);
        assert_eq!(config.fitting_parameters[1].name, "tausat_slip");
    }

    #[test]
    fn partial_document_overrides_fields() {
        let config: RunConfig = serde_yaml::from_str(
            "paths:\n  sim_dir: runs/sims\nfitting_parameters:\n  - name: h0\n    initial_value: [1.0e8]\n    location: [phase, 0, keys]\n    step_size: 0.05\n",
        )
        .unwrap();
        assert_eq!(config.paths.sim_dir, PathBuf::from("runs/sims"));
        assert_eq!(config.paths.checkpoint, PathBuf::from("lm_fitter.json"));
        assert_eq!(
            config.fitting_parameters[0].location,
            vec![PathSegment::from("phase"), PathSegment::Index(0), PathSegment::from("keys")]
        );
    }

    #[test]
    fn rooting_leaves_simulation_output_relative() {
        let config = RunConfig::default().rooted_at(Path::new("/work"));
        assert_eq!(config.paths.checkpoint, PathBuf::from("/work/lm_fitter.json"));
        assert_eq!(config.paths.simulation_output, PathBuf::from("postProc/geom_load.txt"));
    }
}
