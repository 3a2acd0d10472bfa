//! Structured error types shared across lmcal crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`CalError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (paths, indices, labels).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the operator resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Adds the display form of `path` under the `path` context key.
    pub fn with_path(self, path: &Path) -> Self {
        self.with_context("path", path.display().to_string())
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Canonical error type for calibration runs.
///
/// Every variant is terminal for the current invocation. Nothing is retried
/// internally; the checkpoint is only rewritten after a fully successful step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum CalError {
    /// A delimited table could not be read or has inconsistent rows.
    #[error("malformed table: {0}")]
    MalformedTable(ErrorInfo),
    /// A tensile-test column label is not in the known label dictionary.
    #[error("unknown column label: {0}")]
    UnknownColumnLabel(ErrorInfo),
    /// The orientation annotation line could not be interpreted.
    #[error("malformed annotation: {0}")]
    MalformedAnnotation(ErrorInfo),
    /// Inputs required to initialise a calibration are missing or invalid.
    #[error("set-up failed: {0}")]
    SetUp(ErrorInfo),
    /// No checkpoint exists where one is required.
    #[error("no checkpoint: {0}")]
    NoCheckpoint(ErrorInfo),
    /// Iterate was invoked before any simulation batch had been generated.
    #[error("premature iteration: {0}")]
    PrematureIteration(ErrorInfo),
    /// A simulation output file of the expected batch is absent.
    #[error("missing simulation output: {0}")]
    MissingSimulationOutput(ErrorInfo),
    /// The checkpoint exists but cannot be decoded.
    #[error("corrupt checkpoint: {0}")]
    CorruptCheckpoint(ErrorInfo),
    /// A location path does not address a valid node of the parameter document.
    #[error("parameter path error: {0}")]
    ParamPath(ErrorInfo),
    /// Resolving or running a simulation inputs writer failed.
    #[error("inputs writer error: {0}")]
    InputsWriter(ErrorInfo),
    /// The fitter rejected an operation or could not compute a step.
    #[error("fitter error: {0}")]
    Fitter(ErrorInfo),
    /// Filesystem failures outside the more specific families above.
    #[error("io error: {0}")]
    Io(ErrorInfo),
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

impl CalError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            CalError::MalformedTable(info)
            | CalError::UnknownColumnLabel(info)
            | CalError::MalformedAnnotation(info)
            | CalError::SetUp(info)
            | CalError::NoCheckpoint(info)
            | CalError::PrematureIteration(info)
            | CalError::MissingSimulationOutput(info)
            | CalError::CorruptCheckpoint(info)
            | CalError::ParamPath(info)
            | CalError::InputsWriter(info)
            | CalError::Fitter(info)
            | CalError::Io(info) => info,
        }
    }

    /// Wraps an I/O failure on `path` into the [`CalError::Io`] family.
    pub fn io(code: &str, path: &Path, err: impl ToString) -> Self {
        CalError::Io(ErrorInfo::new(code, err.to_string()).with_path(path))
    }
}
