//! Readers for the tabular inputs of a calibration run.
//!
//! - `table`: delimited numeric tables with an irregular preamble, plus the
//!   simulator's ASCII output format
//! - `specimen`: multi-orientation tensile-test CSV files

mod specimen;
mod table;

pub use specimen::{read_tensile_test_data, CurveField, OrientationRecord};
pub use table::{read_simulation_table, read_table, Delimiter, RawTable};
