use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use lmcal_core::{CalError, ErrorInfo};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::params::ParamTree;

/// Placeholder replaced by the material document of one simulation.
pub const PARAMETERS_TOKEN: &str = "<<PARAMETERS>>";
/// Placeholder replaced by the numbered simulation directory.
pub const SIM_DIR_TOKEN: &str = "<<SIM_DIR>>";

/// Produces the input files of one simulation from resolved arguments.
pub trait InputsWriter {
    /// Registry name the writer is selected by.
    fn name(&self) -> &str;

    /// Writes the simulation inputs described by `args`.
    fn write_inputs(&self, args: &Value) -> Result<(), CalError>;
}

/// Which writer to use and its argument template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputsWriterSpec {
    /// Registry name of the writer.
    pub writer: String,
    /// Argument template containing [`PARAMETERS_TOKEN`] and [`SIM_DIR_TOKEN`] placeholders.
    #[serde(default)]
    pub args: Value,
}

impl InputsWriterSpec {
    /// Substitutes the placeholders for one simulation.
    ///
    /// A string equal to [`PARAMETERS_TOKEN`] becomes `parameters`; every
    /// occurrence of [`SIM_DIR_TOKEN`] inside a string becomes `sim_dir`.
    pub fn resolve_args(&self, parameters: &Value, sim_dir: &Path) -> Value {
        substitute(&self.args, parameters, &sim_dir.display().to_string())
    }
}

fn substitute(template: &Value, parameters: &Value, sim_dir: &str) -> Value {
    match template {
        Value::String(text) if text == PARAMETERS_TOKEN => parameters.clone(),
        Value::String(text) => Value::String(text.replace(SIM_DIR_TOKEN, sim_dir)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| substitute(item, parameters, sim_dir))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| (key.clone(), substitute(item, parameters, sim_dir)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Named collection of [`InputsWriter`] implementations.
pub struct WriterRegistry {
    writers: BTreeMap<String, Box<dyn InputsWriter>>,
}

impl WriterRegistry {
    /// Registry without any writers.
    pub fn empty() -> Self {
        Self {
            writers: BTreeMap::new(),
        }
    }

    /// Registry holding the built-in writers.
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(MaterialConfigWriter));
        registry.register(Box::new(JsonParametersWriter));
        registry
    }

    /// Adds or replaces a writer under its own name.
    pub fn register(&mut self, writer: Box<dyn InputsWriter>) {
        self.writers.insert(writer.name().to_string(), writer);
    }

    /// Looks up a writer by name.
    pub fn get(&self, name: &str) -> Result<&dyn InputsWriter, CalError> {
        self.writers.get(name).map(|writer| writer.as_ref()).ok_or_else(|| {
            CalError::InputsWriter(
                ErrorInfo::new("lmcal_fit.writer_unknown", "no inputs writer registered under this name")
                    .with_context("writer", name)
                    .with_hint(format!("registered: {}", self.names().join(", "))),
            )
        })
    }

    /// Names of the registered writers in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.writers.keys().map(String::as_str).collect()
    }
}

impl Default for WriterRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl fmt::Debug for WriterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriterRegistry")
            .field("writers", &self.names())
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct DocumentArgs {
    material: ParamTree,
    dir_path: PathBuf,
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    part_paths: IndexMap<String, PathBuf>,
}

impl DocumentArgs {
    fn parse(writer: &str, args: &Value) -> Result<Self, CalError> {
        serde_json::from_value(args.clone()).map_err(|err| {
            CalError::InputsWriter(
                ErrorInfo::new("lmcal_fit.writer_args", err.to_string()).with_context("writer", writer),
            )
        })
    }

    fn target(&self, default_name: &str) -> Result<PathBuf, CalError> {
        fs::create_dir_all(&self.dir_path).map_err(|err| writer_io(&self.dir_path, err))?;
        Ok(self
            .dir_path
            .join(self.file_name.as_deref().unwrap_or(default_name)))
    }
}

fn writer_io(path: &Path, err: impl ToString) -> CalError {
    CalError::InputsWriter(ErrorInfo::new("lmcal_fit.writer_io", err.to_string()).with_path(path))
}

/// Writes the material document as YAML and copies the referenced part files.
///
/// Arguments: `material`, `dir_path`, optional `file_name` (default
/// `material.yaml`) and optional `part_paths` mapping part names to files that
/// are copied next to the document.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaterialConfigWriter;

impl InputsWriter for MaterialConfigWriter {
    fn name(&self) -> &str {
        "material-config"
    }

    fn write_inputs(&self, args: &Value) -> Result<(), CalError> {
        let args = DocumentArgs::parse(self.name(), args)?;
        let target = args.target("material.yaml")?;
        let yaml = serde_yaml::to_string(&args.material).map_err(|err| {
            CalError::InputsWriter(ErrorInfo::new("lmcal_fit.writer_encode", err.to_string()))
        })?;
        fs::write(&target, yaml).map_err(|err| writer_io(&target, err))?;

        for (part, source) in &args.part_paths {
            let file_name = source.file_name().ok_or_else(|| {
                CalError::InputsWriter(
                    ErrorInfo::new("lmcal_fit.writer_part", "part path has no file name")
                        .with_context("part", part.as_str())
                        .with_path(source),
                )
            })?;
            let dest = args.dir_path.join(file_name);
            fs::copy(source, &dest).map_err(|err| writer_io(source, err))?;
        }
        Ok(())
    }
}

/// Writes the material document as pretty JSON (default `material.json`).
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonParametersWriter;

impl InputsWriter for JsonParametersWriter {
    fn name(&self) -> &str {
        "json-parameters"
    }

    fn write_inputs(&self, args: &Value) -> Result<(), CalError> {
        let args = DocumentArgs::parse(self.name(), args)?;
        let target = args.target("material.json")?;
        let json = serde_json::to_string_pretty(&args.material).map_err(|err| {
            CalError::InputsWriter(ErrorInfo::new("lmcal_fit.writer_encode", err.to_string()))
        })?;
        fs::write(&target, json).map_err(|err| writer_io(&target, err))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::params::PathSegment;

    fn spec() -> InputsWriterSpec {
        InputsWriterSpec {
            writer: "material-config".into(),
            args: json!({
                "material": "<<PARAMETERS>>",
                "dir_path": "<<SIM_DIR>>",
                "part_paths": {"Texture": "<<SIM_DIR>>/../texture.config"},
                "label": "run <<PARAMETERS>>",
            }),
        }
    }

    #[test]
    fn placeholders_are_substituted() {
        let params = json!({"phase": [{"keys": {"h0": 1.0}}]});
        let args = spec().resolve_args(&params, Path::new("/sims/4"));
        assert_eq!(args["material"], params);
        assert_eq!(args["dir_path"], "/sims/4");
        assert_eq!(args["part_paths"]["Texture"], "/sims/4/../texture.config");
        // Only an exact match is replaced by the document.
        assert_eq!(args["label"], "run <<PARAMETERS>>");
    }

    #[test]
    fn unknown_writer_lists_registered_names() {
        let registry = WriterRegistry::with_builtin();
        let err = registry.get("damask_parse").err().unwrap();
        assert!(matches!(err, CalError::InputsWriter(_)));
        assert_eq!(
            err.info().hint.as_deref(),
            Some("registered: json-parameters, material-config")
        );
    }

    #[test]
    fn material_config_writer_emits_yaml_and_parts() {
        let dir = tempfile::tempdir().unwrap();
        let part = dir.path().join("texture.config");
        fs::write(&part, "[Texture]\n").unwrap();
        let sim = dir.path().join("sims").join("0");
        let args = json!({
            "material": {"phase": [{"keys": {"h0": 2.5}}]},
            "dir_path": sim,
            "part_paths": {"Texture": part},
        });
        MaterialConfigWriter.write_inputs(&args).unwrap();

        let written: ParamTree =
            serde_yaml::from_str(&fs::read_to_string(sim.join("material.yaml")).unwrap()).unwrap();
        let h0 = [
            PathSegment::from("phase"),
            PathSegment::Index(0),
            PathSegment::from("keys"),
            PathSegment::from("h0"),
        ];
        assert_eq!(written.get(&h0), Some(&ParamTree::from(2.5)));
        assert_eq!(fs::read_to_string(sim.join("texture.config")).unwrap(), "[Texture]\n");
    }

    #[test]
    fn missing_arguments_are_reported() {
        let err = JsonParametersWriter.write_inputs(&json!({"dir_path": "x"})).unwrap_err();
        assert_eq!(err.info().code, "lmcal_fit.writer_args");
    }
}
