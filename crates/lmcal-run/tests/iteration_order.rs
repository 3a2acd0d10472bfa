use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use lmcal_core::{CalError, ErrorInfo, TensileTest};
use lmcal_fit::{Fitter, WriterRegistry};
use lmcal_run::{IterationController, RunConfig};
use serde::{Deserialize, Serialize};

thread_local! {
    static EVENTS: RefCell<Vec<String>> = RefCell::new(Vec::new());
}

fn record(event: impl Into<String>) {
    EVENTS.with(|events| events.borrow_mut().push(event.into()));
}

fn take_events() -> Vec<String> {
    EVENTS.with(|events| events.borrow_mut().drain(..).collect())
}

/// Fitter that only records the calls it receives.
#[derive(Debug, Serialize, Deserialize)]
struct RecordingFitter {
    opt_index: usize,
    sims: usize,
    sim_dir: PathBuf,
    fail_generation: bool,
}

impl Fitter for RecordingFitter {
    fn opt_index(&self) -> usize {
        self.opt_index
    }

    fn sims_per_iteration(&self) -> usize {
        self.sims
    }

    fn sim_dir(&self) -> &Path {
        &self.sim_dir
    }

    fn generate_simulation_inputs(&mut self, _writers: &WriterRegistry) -> Result<(), CalError> {
        record("generate");
        if self.fail_generation {
            return Err(CalError::InputsWriter(ErrorInfo::new("test.generate", "refused")));
        }
        self.opt_index += 1;
        Ok(())
    }

    fn add_simulated_tensile_tests(&mut self, tests: Vec<TensileTest>) -> Result<(), CalError> {
        let peaks: Vec<String> = tests.iter().map(|t| t.true_stress()[1].to_string()).collect();
        record(format!("add {} [{}]", tests.len(), peaks.join(",")));
        Ok(())
    }

    fn to_json_file(&self, path: &Path) -> Result<(), CalError> {
        record("save");
        fs::write(path, serde_json::to_string(self).unwrap()).unwrap();
        Ok(())
    }

    fn from_json_file(path: &Path) -> Result<Self, CalError> {
        record("load");
        let text = fs::read_to_string(path)
            .map_err(|err| CalError::NoCheckpoint(ErrorInfo::new("test.load", err.to_string())))?;
        Ok(serde_json::from_str(&text).unwrap())
    }
}

fn write_output(sim_dir: &Path, index: usize) {
    let dir = sim_dir.join(index.to_string()).join("postProc");
    fs::create_dir_all(&dir).unwrap();
    let stress = 100.0 * (index as f64 + 1.0);
    fs::write(
        dir.join("geom_load.txt"),
        format!("1 header\ninc Mises(Cauchy) Mises(ln(V))\n0 0.0 0.0\n1 {stress} 0.01\n"),
    )
    .unwrap();
}

fn run_fixture(root: &Path, fail_generation: bool) -> IterationController {
    let mut config = RunConfig::default().rooted_at(root);
    config.paths.sim_dir = root.join("sims");
    let fitter = RecordingFitter {
        opt_index: 2,
        sims: 3,
        sim_dir: config.paths.sim_dir.clone(),
        fail_generation,
    };
    fs::write(&config.paths.checkpoint, serde_json::to_string(&fitter).unwrap()).unwrap();
    for i in [5, 3, 4] {
        write_output(&config.paths.sim_dir, i);
    }
    IterationController::new(config, WriterRegistry::empty())
}

#[test]
fn iterate_ingests_then_generates_then_saves() {
    let root = tempfile::tempdir().unwrap();
    let controller = run_fixture(root.path(), false);
    take_events();

    let fitter: RecordingFitter = controller.iterate().unwrap();
    assert_eq!(fitter.opt_index, 3);
    // Results arrive ordered by directory index, starting at directory 3.
    assert_eq!(take_events(), vec!["load", "add 3 [400,500,600]", "generate", "save"]);
}

#[test]
fn failed_generation_skips_the_checkpoint() {
    let root = tempfile::tempdir().unwrap();
    let controller = run_fixture(root.path(), true);
    let checkpoint = controller.config().paths.checkpoint.clone();
    let before = fs::read(&checkpoint).unwrap();
    take_events();

    let err = controller.iterate::<RecordingFitter>().unwrap_err();
    assert!(matches!(err, CalError::InputsWriter(_)));
    assert_eq!(take_events(), vec!["load", "add 3 [400,500,600]", "generate"]);
    assert_eq!(fs::read(&checkpoint).unwrap(), before);
}
