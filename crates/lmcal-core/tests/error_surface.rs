use std::path::Path;

use lmcal_core::errors::{CalError, ErrorInfo};

fn sample_info(code: &str, message: &str) -> ErrorInfo {
    ErrorInfo::new(code, message)
        .with_context("index", "4")
        .with_context("reason", "example")
}

#[test]
fn table_error_surface() {
    let err = CalError::MalformedTable(sample_info("T001", "row width mismatch"));
    assert_eq!(err.info().code, "T001");
    assert!(err.info().context.contains_key("index"));
    assert!(err.to_string().starts_with("malformed table: row width mismatch"));
}

#[test]
fn iteration_error_surface() {
    let err = CalError::PrematureIteration(sample_info("I001", "opt_index is zero"));
    assert_eq!(err.info().code, "I001");
    let err = CalError::MissingSimulationOutput(sample_info("I002", "absent"));
    assert_eq!(err.info().context["index"], "4");
}

#[test]
fn checkpoint_error_surface() {
    let err = CalError::CorruptCheckpoint(
        ErrorInfo::new("C001", "bad json")
            .with_path(Path::new("lm_fitter.json"))
            .with_hint("restore from backup"),
    );
    let text = err.to_string();
    assert!(text.contains("path=lm_fitter.json"));
    assert!(text.contains("hint: restore from backup"));
}

#[test]
fn errors_serialize_with_family_tag() {
    let err = CalError::NoCheckpoint(sample_info("N001", "absent"));
    let json = serde_json::to_value(&err).expect("serialize");
    assert_eq!(json["family"], "NoCheckpoint");
    let decoded: CalError = serde_json::from_value(json).expect("deserialize");
    assert_eq!(decoded, err);
}
