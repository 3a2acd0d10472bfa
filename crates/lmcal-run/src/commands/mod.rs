use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use lmcal_fit::WriterRegistry;
use lmcal_run::{IterationController, RunConfig};

pub mod iterate;
pub mod set_up;
pub mod status;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// YAML run configuration; built-in defaults are used when omitted.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl RunArgs {
    pub fn controller(&self) -> Result<IterationController, Box<dyn Error>> {
        let config = match &self.config {
            Some(path) => RunConfig::load(path)?,
            None => RunConfig::default(),
        };
        Ok(IterationController::new(config, WriterRegistry::with_builtin()))
    }
}
