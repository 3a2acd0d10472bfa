use std::error::Error;

use super::RunArgs;

pub fn run(args: &RunArgs) -> Result<(), Box<dyn Error>> {
    let report = args.controller()?.status()?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
