#![deny(missing_docs)]

//! Run orchestration for lmcal: configuration, the set-up/iterate cycle and
//! run status, shared by the `lmcal` binary and integration tests.

/// YAML run configuration.
pub mod config;
mod controller;

pub use config::{ExperimentConfig, PathConfig, RunConfig, SimulationColumns};
pub use controller::{simulation_batch, CalibrationStage, IterationController, StatusReport};
