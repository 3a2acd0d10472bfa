#![deny(missing_docs)]

//! Fitting side of an lmcal calibration run.

/// JSON checkpoint persistence.
pub mod checkpoint;
mod fitter;
mod lm;
/// Material parameter document and fitting parameter definitions.
pub mod params;
pub mod step;
/// Simulation inputs writers and their registry.
pub mod writer;

pub use checkpoint::CHECKPOINT_FILE_NAME;
pub use fitter::Fitter;
pub use lm::{FitterSetUp, LmFitter, LmIteration};
pub use params::{FittingParameter, ParamTree, PathSegment, Scalar};
pub use writer::{
    InputsWriter, InputsWriterSpec, JsonParametersWriter, MaterialConfigWriter, WriterRegistry,
    PARAMETERS_TOKEN, SIM_DIR_TOKEN,
};
