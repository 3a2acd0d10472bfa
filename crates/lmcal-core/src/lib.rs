#![deny(missing_docs)]
#![doc = "Error surface and curve types shared by the lmcal calibration crates."]

mod curve;
pub mod errors;

pub use curve::{EngineeringCurve, TensileTest};
pub use errors::{CalError, ErrorInfo};
