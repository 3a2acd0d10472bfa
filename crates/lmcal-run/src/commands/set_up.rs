use std::error::Error;

use lmcal_fit::Fitter;

use super::RunArgs;

pub fn run(args: &RunArgs) -> Result<(), Box<dyn Error>> {
    let controller = args.controller()?;
    let fitter = controller.set_up()?;
    println!(
        "wrote simulations 0..{} under {}",
        fitter.sims_per_iteration(),
        fitter.sim_dir().display()
    );
    Ok(())
}
