use std::fs;
use std::path::Path;

use csv::{ReaderBuilder, Trim};
use lmcal_core::{CalError, ErrorInfo};
use serde::{Deserialize, Serialize};

/// Field separator used by [`read_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Delimiter {
    /// Single byte separator, quoted fields allowed (`,` for CSV).
    Char(u8),
    /// Any run of spaces or tabs.
    Whitespace,
}

/// Column-addressable numeric table with header labels.
///
/// Values are stored row-major. Blank cells are kept as `NaN`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    headers: Vec<String>,
    values: Vec<f64>,
    n_rows: usize,
}

impl RawTable {
    /// Column labels in file order.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Number of data rows.
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Number of columns, equal to the number of headers.
    pub fn n_cols(&self) -> usize {
        self.headers.len()
    }

    /// Value at `(row, col)` if both indices are in range.
    pub fn value(&self, row: usize, col: usize) -> Option<f64> {
        if row < self.n_rows && col < self.n_cols() {
            Some(self.values[row * self.n_cols() + col])
        } else {
            None
        }
    }

    /// Copies column `idx` out of the table.
    pub fn column(&self, idx: usize) -> Option<Vec<f64>> {
        if idx >= self.n_cols() {
            return None;
        }
        Some(
            self.values
                .iter()
                .skip(idx)
                .step_by(self.n_cols())
                .copied()
                .collect(),
        )
    }

    /// Copies the first column whose label equals `label`.
    pub fn column_by_label(&self, label: &str) -> Result<Vec<f64>, CalError> {
        self.headers
            .iter()
            .position(|header| header == label)
            .and_then(|idx| self.column(idx))
            .ok_or_else(|| {
                CalError::MalformedTable(
                    ErrorInfo::new("lmcal_io.missing_column", "required column not present")
                        .with_context("label", label),
                )
            })
    }
}

/// Reads a delimited numeric table with an irregular preamble.
///
/// The first `skip_rows` lines are the preamble; the line at `header_row`
/// within it supplies the column labels. All later non-blank lines are data
/// rows and must have exactly as many fields as there are labels.
pub fn read_table(
    path: &Path,
    delimiter: Delimiter,
    skip_rows: usize,
    header_row: usize,
) -> Result<RawTable, CalError> {
    if header_row >= skip_rows {
        return Err(malformed(
            "lmcal_io.header_outside_preamble",
            "header row must lie within the skipped preamble",
            path,
        )
        .with_context("skip_rows", skip_rows.to_string())
        .with_context("header_row", header_row.to_string())
        .into_table_error());
    }
    let text = fs::read_to_string(path).map_err(|err| CalError::io("lmcal_io.table_read", path, err))?;

    let mut consumed = 0usize;
    let mut preamble = Vec::with_capacity(skip_rows);
    for line in text.split_inclusive('\n').take(skip_rows) {
        consumed += line.len();
        preamble.push(line.trim_end_matches(['\r', '\n']));
    }
    let header_line = preamble.get(header_row).ok_or_else(|| {
        malformed("lmcal_io.short_preamble", "file ends before the header row", path)
            .with_context("header_row", header_row.to_string())
            .into_table_error()
    })?;
    let headers: Vec<String> = split_fields(header_line, delimiter, path, header_row + 1)?
        .into_iter()
        .map(|field| field.trim().to_string())
        .collect();

    let body = &text[consumed..];
    let mut values = Vec::new();
    let mut n_rows = 0usize;
    for (line_no, fields) in data_rows(body, delimiter, skip_rows, path)? {
        if fields.len() != headers.len() {
            return Err(malformed("lmcal_io.row_width", "data row width differs from header", path)
                .with_context("line", line_no.to_string())
                .with_context("expected", headers.len().to_string())
                .with_context("found", fields.len().to_string())
                .into_table_error());
        }
        for (col, field) in fields.iter().enumerate() {
            values.push(parse_cell(field, path, line_no, col)?);
        }
        n_rows += 1;
    }

    Ok(RawTable {
        headers,
        values,
        n_rows,
    })
}

/// Reads a simulator ASCII output table.
///
/// The first line has the form `"<N> header"` and announces `N` further header
/// lines, the last of which holds the whitespace separated column labels.
/// Files without that marker are read with a single label line.
pub fn read_simulation_table(path: &Path) -> Result<RawTable, CalError> {
    let text = fs::read_to_string(path).map_err(|err| CalError::io("lmcal_io.table_read", path, err))?;
    let first = text.lines().next().unwrap_or_default();
    let mut tokens = first.split_whitespace();
    let announced = match (tokens.next(), tokens.next()) {
        (Some(count), Some(marker)) if marker.eq_ignore_ascii_case("header") => {
            count.parse::<usize>().ok()
        }
        _ => None,
    };
    match announced {
        Some(count) if count > 0 => read_table(path, Delimiter::Whitespace, count + 1, count),
        _ => read_table(path, Delimiter::Whitespace, 1, 0),
    }
}

/// Splits one line into raw fields according to `delimiter`.
pub(crate) fn split_fields(
    line: &str,
    delimiter: Delimiter,
    path: &Path,
    line_no: usize,
) -> Result<Vec<String>, CalError> {
    match delimiter {
        Delimiter::Whitespace => Ok(line.split_whitespace().map(str::to_string).collect()),
        Delimiter::Char(byte) => {
            let mut reader = ReaderBuilder::new()
                .delimiter(byte)
                .has_headers(false)
                .flexible(true)
                .from_reader(line.as_bytes());
            match reader.records().next() {
                Some(Ok(record)) => Ok(record.iter().map(str::to_string).collect()),
                Some(Err(err)) => Err(malformed("lmcal_io.csv_parse", err.to_string(), path)
                    .with_context("line", line_no.to_string())
                    .into_table_error()),
                None => Ok(Vec::new()),
            }
        }
    }
}

fn data_rows(
    body: &str,
    delimiter: Delimiter,
    offset: usize,
    path: &Path,
) -> Result<Vec<(usize, Vec<String>)>, CalError> {
    match delimiter {
        Delimiter::Whitespace => Ok(body
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(idx, line)| {
                (
                    offset + idx + 1,
                    line.split_whitespace().map(str::to_string).collect(),
                )
            })
            .collect()),
        Delimiter::Char(byte) => {
            // The csv reader drops empty lines but not whitespace-only ones.
            let mut reader = ReaderBuilder::new()
                .delimiter(byte)
                .has_headers(false)
                .flexible(true)
                .trim(Trim::All)
                .from_reader(body.as_bytes());
            let mut rows = Vec::new();
            for result in reader.records() {
                let record = result.map_err(|err| {
                    malformed("lmcal_io.csv_parse", err.to_string(), path).into_table_error()
                })?;
                if record.iter().all(|field| field.trim().is_empty()) {
                    continue;
                }
                let line_no = offset + record.position().map(|pos| pos.line() as usize).unwrap_or(0);
                rows.push((line_no, record.iter().map(str::to_string).collect()));
            }
            Ok(rows)
        }
    }
}

fn parse_cell(field: &str, path: &Path, line_no: usize, col: usize) -> Result<f64, CalError> {
    let field = field.trim();
    if field.is_empty() {
        return Ok(f64::NAN);
    }
    field.parse::<f64>().map_err(|err| {
        malformed("lmcal_io.cell_parse", err.to_string(), path)
            .with_context("line", line_no.to_string())
            .with_context("column", col.to_string())
            .with_context("value", field)
            .into_table_error()
    })
}

fn malformed(code: &str, message: impl Into<String>, path: &Path) -> ErrorInfo {
    ErrorInfo::new(code, message).with_path(path)
}

trait IntoTableError {
    fn into_table_error(self) -> CalError;
}

impl IntoTableError for ErrorInfo {
    fn into_table_error(self) -> CalError {
        CalError::MalformedTable(self)
    }
}
