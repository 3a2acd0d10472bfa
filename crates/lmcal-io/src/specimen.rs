use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use lmcal_core::{CalError, ErrorInfo, TensileTest};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::table::{read_table, split_fields, Delimiter};

const DELIMITER: u8 = b',';
const SKIP_ROWS: usize = 2;
const HEADER_ROW: usize = 1;

/// Record field a tensile-test column label maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveField {
    /// Engineering strain.
    EngStrain,
    /// Engineering stress.
    EngStress,
    /// True (logarithmic) strain.
    TrueStrain,
    /// True (Cauchy) stress.
    TrueStress,
}

impl CurveField {
    /// Maps a raw column label onto a record field.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "eng. strain" => Some(CurveField::EngStrain),
            "eng. stress /Mpa" => Some(CurveField::EngStress),
            "true strain" => Some(CurveField::TrueStrain),
            "true stress /Mpa" => Some(CurveField::TrueStress),
            _ => None,
        }
    }

    fn is_strain(self) -> bool {
        matches!(self, CurveField::EngStrain | CurveField::TrueStrain)
    }

    fn is_engineering(self) -> bool {
        matches!(self, CurveField::EngStrain | CurveField::EngStress)
    }
}

/// Stress/strain data of one specimen orientation.
///
/// Exactly one of the engineering or true pairs is populated, with equal
/// lengths. Stress is in the file's unit (MPa).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrientationRecord {
    /// Loading direction in degrees.
    pub orientation: i64,
    /// Engineering strain samples.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eng_strain: Option<Vec<f64>>,
    /// Engineering stress samples.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eng_stress: Option<Vec<f64>>,
    /// True strain samples.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub true_strain: Option<Vec<f64>>,
    /// True stress samples.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub true_stress: Option<Vec<f64>>,
}

impl OrientationRecord {
    fn set(&mut self, field: CurveField, values: Vec<f64>) {
        match field {
            CurveField::EngStrain => self.eng_strain = Some(values),
            CurveField::EngStress => self.eng_stress = Some(values),
            CurveField::TrueStrain => self.true_strain = Some(values),
            CurveField::TrueStress => self.true_stress = Some(values),
        }
    }

    /// Number of samples in the populated pair.
    pub fn len(&self) -> usize {
        self.eng_strain
            .as_ref()
            .or(self.true_strain.as_ref())
            .map_or(0, Vec::len)
    }

    /// True when the record holds no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Converts the record into a [`TensileTest`], multiplying stress by `stress_scale`.
    pub fn to_tensile_test(&self, stress_scale: f64) -> Result<TensileTest, CalError> {
        let scale = |values: &[f64]| values.iter().map(|v| v * stress_scale).collect::<Vec<_>>();
        match (
            &self.eng_strain,
            &self.eng_stress,
            &self.true_strain,
            &self.true_stress,
        ) {
            (Some(strain), Some(stress), _, _) => {
                TensileTest::from_engineering(strain.clone(), scale(stress))
            }
            (_, _, Some(strain), Some(stress)) => TensileTest::from_true(strain.clone(), scale(stress)),
            _ => Err(CalError::UnknownColumnLabel(
                ErrorInfo::new(
                    "lmcal_io.incomplete_record",
                    "orientation has no complete stress/strain pair",
                )
                .with_context("orientation", self.orientation.to_string()),
            )),
        }
    }
}

/// Reads a multi-orientation tensile-test CSV.
///
/// Line 0 carries the orientation ids, one per stress/strain column pair at
/// every other field. Line 1 carries the column labels. Orientation `k` owns
/// data columns `2k` and `2k + 1`.
pub fn read_tensile_test_data(path: &Path) -> Result<Vec<OrientationRecord>, CalError> {
    let orientations = read_orientations(path)?;
    if orientations.is_empty() {
        return Ok(Vec::new());
    }

    let table = read_table(path, Delimiter::Char(DELIMITER), SKIP_ROWS, HEADER_ROW)?;
    if table.n_cols() != 2 * orientations.len() {
        return Err(CalError::MalformedAnnotation(
            ErrorInfo::new(
                "lmcal_io.orientation_pairing",
                "orientation ids do not pair with the data columns",
            )
            .with_path(path)
            .with_context("orientations", orientations.len().to_string())
            .with_context("columns", table.n_cols().to_string()),
        ));
    }

    let mut records = Vec::with_capacity(orientations.len());
    for (k, &orientation) in orientations.iter().enumerate() {
        let (first, second) = (2 * k, 2 * k + 1);
        let first_field = map_label(&table.headers()[first], path)?;
        let second_field = map_label(&table.headers()[second], path)?;
        if first_field.is_strain() == second_field.is_strain()
            || first_field.is_engineering() != second_field.is_engineering()
        {
            return Err(CalError::UnknownColumnLabel(
                ErrorInfo::new(
                    "lmcal_io.label_pairing",
                    "column pair is not one strain and one stress of the same measure",
                )
                .with_path(path)
                .with_context("orientation", orientation.to_string())
                .with_context("labels", format!("{:?}", [first_field, second_field])),
            ));
        }

        // Shorter orientations are padded with blank cells.
        let (mut a, mut b) = (Vec::new(), Vec::new());
        for row in 0..table.n_rows() {
            if let (Some(x), Some(y)) = (table.value(row, first), table.value(row, second)) {
                if !x.is_nan() && !y.is_nan() {
                    a.push(x);
                    b.push(y);
                }
            }
        }
        let mut record = OrientationRecord {
            orientation,
            ..OrientationRecord::default()
        };
        record.set(first_field, a);
        record.set(second_field, b);
        debug!(orientation, samples = record.len(), "parsed orientation");
        records.push(record);
    }
    Ok(records)
}

fn read_orientations(path: &Path) -> Result<Vec<i64>, CalError> {
    let file = File::open(path).map_err(|err| CalError::io("lmcal_io.table_read", path, err))?;
    let mut line = String::new();
    BufReader::new(file)
        .read_line(&mut line)
        .map_err(|err| CalError::io("lmcal_io.table_read", path, err))?;
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Ok(Vec::new());
    }

    let fields = split_fields(line, Delimiter::Char(DELIMITER), path, 1).map_err(|err| {
        CalError::MalformedAnnotation(err.info().clone())
    })?;
    fields
        .iter()
        .step_by(2)
        .enumerate()
        .map(|(k, token)| {
            token
                .split_whitespace()
                .next()
                .and_then(|word| word.parse::<i64>().ok())
                .ok_or_else(|| {
                    CalError::MalformedAnnotation(
                        ErrorInfo::new(
                            "lmcal_io.orientation_id",
                            "orientation annotation is not an integer",
                        )
                        .with_path(path)
                        .with_context("pair", k.to_string())
                        .with_context("token", token.as_str()),
                    )
                })
        })
        .collect()
}

fn map_label(label: &str, path: &Path) -> Result<CurveField, CalError> {
    CurveField::from_label(label).ok_or_else(|| {
        CalError::UnknownColumnLabel(
            ErrorInfo::new("lmcal_io.unknown_label", "column label has no record field")
                .with_path(path)
                .with_context("label", label),
        )
    })
}
