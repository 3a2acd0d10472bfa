use std::error::Error;

use lmcal_fit::{Fitter, LmFitter};
use lmcal_run::simulation_batch;

use super::RunArgs;

pub fn run(args: &RunArgs) -> Result<(), Box<dyn Error>> {
    let controller = args.controller()?;
    let fitter: LmFitter = controller.iterate()?;
    if let Some(last) = fitter.iterations().last() {
        println!("iteration {} error {:.6e}", fitter.iterations().len(), last.error);
    }
    let batch = simulation_batch(fitter.opt_index(), fitter.sims_per_iteration())?;
    println!(
        "wrote simulations {}..{} under {}",
        batch.start,
        batch.end,
        fitter.sim_dir().display()
    );
    Ok(())
}
