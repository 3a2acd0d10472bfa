use std::fmt::{self, Display};
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use lmcal_core::{CalError, ErrorInfo};
use serde::{Deserialize, Serialize};

/// Leaf value of a [`ParamTree`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// Explicit null.
    Null,
    /// Boolean flag.
    Bool(bool),
    /// Integer literal.
    Integer(i64),
    /// Floating point literal.
    Float(f64),
    /// Free text.
    Text(String),
}

/// Nested material-parameter document.
///
/// Mapping keys keep their document order so that a rewritten document reads
/// like the one it was loaded from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamTree {
    /// Leaf value.
    Scalar(Scalar),
    /// Ordered list of nodes.
    Sequence(Vec<ParamTree>),
    /// String-keyed mapping of nodes.
    Mapping(IndexMap<String, ParamTree>),
}

/// One step of a location path inside a [`ParamTree`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// Position inside a sequence.
    Index(usize),
    /// Key inside a mapping.
    Key(String),
}

impl Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Index(idx) => write!(f, "[{idx}]"),
            PathSegment::Key(key) => write!(f, ".{key}"),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(idx: usize) -> Self {
        PathSegment::Index(idx)
    }
}

/// Renders a path as `.phase[0].keys`.
pub fn render_path(path: &[PathSegment]) -> String {
    path.iter().map(ToString::to_string).collect()
}

impl From<f64> for ParamTree {
    fn from(value: f64) -> Self {
        ParamTree::Scalar(Scalar::Float(value))
    }
}

impl From<Vec<f64>> for ParamTree {
    fn from(values: Vec<f64>) -> Self {
        ParamTree::Sequence(values.into_iter().map(ParamTree::from).collect())
    }
}

impl ParamTree {
    /// Loads a YAML (or JSON) document from disk.
    pub fn load_yaml(path: &Path) -> Result<Self, CalError> {
        let text = fs::read_to_string(path).map_err(|err| {
            CalError::SetUp(
                ErrorInfo::new("lmcal_fit.param_doc_read", err.to_string()).with_path(path),
            )
        })?;
        serde_yaml::from_str(&text).map_err(|err| {
            CalError::SetUp(
                ErrorInfo::new("lmcal_fit.param_doc_parse", err.to_string()).with_path(path),
            )
        })
    }

    /// Returns the node at `path`, if every segment resolves.
    pub fn get(&self, path: &[PathSegment]) -> Option<&ParamTree> {
        path.iter().try_fold(self, |node, segment| match (node, segment) {
            (ParamTree::Mapping(map), PathSegment::Key(key)) => map.get(key),
            (ParamTree::Sequence(items), PathSegment::Index(idx)) => items.get(*idx),
            _ => None,
        })
    }

    /// Writes `value` at `path`.
    ///
    /// Every segment but the last must already exist with the right shape.
    /// A final key segment inserts or replaces a mapping entry; a final index
    /// segment must address an existing sequence element.
    pub fn set(&mut self, path: &[PathSegment], value: ParamTree) -> Result<(), CalError> {
        let Some((last, parents)) = path.split_last() else {
            *self = value;
            return Ok(());
        };

        let mut node = self;
        for (depth, segment) in parents.iter().enumerate() {
            node = match (node, segment) {
                (ParamTree::Mapping(map), PathSegment::Key(key)) => map
                    .get_mut(key)
                    .ok_or_else(|| path_error("lmcal_fit.path_missing", path, depth))?,
                (ParamTree::Sequence(items), PathSegment::Index(idx)) => items
                    .get_mut(*idx)
                    .ok_or_else(|| path_error("lmcal_fit.path_missing", path, depth))?,
                _ => return Err(path_error("lmcal_fit.path_shape", path, depth)),
            };
        }

        match (node, last) {
            (ParamTree::Mapping(map), PathSegment::Key(key)) => {
                map.insert(key.clone(), value);
                Ok(())
            }
            (ParamTree::Sequence(items), PathSegment::Index(idx)) => {
                let slot = items
                    .get_mut(*idx)
                    .ok_or_else(|| path_error("lmcal_fit.path_missing", path, parents.len()))?;
                *slot = value;
                Ok(())
            }
            _ => Err(path_error("lmcal_fit.path_shape", path, parents.len())),
        }
    }

    /// Converts the document into a JSON value for template substitution.
    pub fn to_json_value(&self) -> Result<serde_json::Value, CalError> {
        serde_json::to_value(self).map_err(|err| {
            CalError::InputsWriter(ErrorInfo::new("lmcal_fit.param_doc_encode", err.to_string()))
        })
    }
}

fn path_error(code: &str, path: &[PathSegment], depth: usize) -> CalError {
    let message = if code == "lmcal_fit.path_shape" {
        "path segment does not match the node shape"
    } else {
        "path segment does not exist"
    };
    CalError::ParamPath(
        ErrorInfo::new(code, message)
            .with_context("path", render_path(path))
            .with_context("segment", path[depth].to_string()),
    )
}

/// A calibrated quantity and where it lives in the material document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittingParameter {
    /// Key under which the value is stored.
    pub name: String,
    /// Starting value; one entry is written as a scalar, more as a sequence.
    pub initial_value: Vec<f64>,
    /// Path of the node holding `name`.
    pub location: Vec<PathSegment>,
    /// Relative perturbation used for finite differences.
    pub step_size: f64,
}

impl FittingParameter {
    /// Creates a parameter entry.
    pub fn new(
        name: impl Into<String>,
        initial_value: Vec<f64>,
        location: Vec<PathSegment>,
        step_size: f64,
    ) -> Self {
        Self {
            name: name.into(),
            initial_value,
            location,
            step_size,
        }
    }

    /// Full path of the value: `location` followed by `name`.
    pub fn address(&self) -> Vec<PathSegment> {
        let mut path = self.location.clone();
        path.push(PathSegment::Key(self.name.clone()));
        path
    }

    /// Value node for a multiplicative `scale` of the initial value.
    pub fn scaled_value(&self, scale: f64) -> ParamTree {
        let values: Vec<f64> = self.initial_value.iter().map(|v| v * scale).collect();
        if values.len() == 1 {
            ParamTree::from(values[0])
        } else {
            ParamTree::from(values)
        }
    }

    /// Writes the scaled value into `doc`.
    pub fn apply(&self, doc: &mut ParamTree, scale: f64) -> Result<(), CalError> {
        doc.set(&self.address(), self.scaled_value(scale))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_doc() -> ParamTree {
        serde_yaml::from_str(
            "phase:\n  - lattice: fcc\n    keys:\n      h0_slipslip: 1.0e8\n      n_slip: 20\n      flags: [true, ~]\n",
        )
        .unwrap()
    }

    fn path(segments: &[PathSegment]) -> Vec<PathSegment> {
        segments.to_vec()
    }

    #[test]
    fn yaml_document_parses_into_tagged_tree() {
        let doc = sample_doc();
        let keys = doc.get(&path(&["phase".into(), PathSegment::Index(0), "keys".into()])).unwrap();
        let ParamTree::Mapping(map) = keys else {
            panic!("expected mapping");
        };
        assert_eq!(map["h0_slipslip"], ParamTree::Scalar(Scalar::Float(1.0e8)));
        assert_eq!(map["n_slip"], ParamTree::Scalar(Scalar::Integer(20)));
        assert_eq!(
            map["flags"],
            ParamTree::Sequence(vec![
                ParamTree::Scalar(Scalar::Bool(true)),
                ParamTree::Scalar(Scalar::Null)
            ])
        );
    }

    #[test]
    fn fitting_parameter_writes_at_location_plus_name() {
        let mut doc = sample_doc();
        let param = FittingParameter::new(
            "h0_slipslip",
            vec![400e6],
            vec!["phase".into(), PathSegment::Index(0), "keys".into()],
            0.1,
        );
        param.apply(&mut doc, 1.5).unwrap();
        assert_eq!(doc.get(&param.address()), Some(&ParamTree::from(600e6)));

        let vector = FittingParameter::new("tau0", vec![1.0, 2.0], param.location.clone(), 0.1);
        vector.apply(&mut doc, 2.0).unwrap();
        assert_eq!(doc.get(&vector.address()), Some(&ParamTree::from(vec![2.0, 4.0])));
    }

    #[test]
    fn missing_intermediate_segment_fails() {
        let mut doc = sample_doc();
        let err = doc
            .set(&path(&["phase".into(), PathSegment::Index(3), "keys".into()]), ParamTree::from(1.0))
            .unwrap_err();
        assert!(matches!(err, CalError::ParamPath(_)));
        assert_eq!(err.info().code, "lmcal_fit.path_missing");
        assert_eq!(err.info().context["segment"], "[3]");
    }

    #[test]
    fn wrong_shape_fails() {
        let mut doc = sample_doc();
        let err = doc
            .set(&path(&["phase".into(), "keys".into(), "x".into()]), ParamTree::from(1.0))
            .unwrap_err();
        assert_eq!(err.info().code, "lmcal_fit.path_shape");
        assert_eq!(err.info().context["path"], ".phase.keys.x");
    }

    #[test]
    fn json_round_trip_preserves_scalars() {
        let doc = sample_doc();
        let json = serde_json::to_string(&doc).unwrap();
        let back: ParamTree = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);
    }
}
