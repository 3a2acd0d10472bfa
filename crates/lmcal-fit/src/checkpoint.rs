use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use lmcal_core::{CalError, ErrorInfo};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Default checkpoint file name, relative to the working directory.
pub const CHECKPOINT_FILE_NAME: &str = "lm_fitter.json";

/// Restores a checkpointed state from disk.
pub fn load<T: DeserializeOwned>(path: &Path) -> Result<T, CalError> {
    let contents = fs::read_to_string(path).map_err(|err| {
        if err.kind() == ErrorKind::NotFound {
            CalError::NoCheckpoint(
                ErrorInfo::new("lmcal_fit.checkpoint_missing", err.to_string())
                    .with_path(path)
                    .with_hint("run `lmcal set-up` first"),
            )
        } else {
            CalError::io("lmcal_fit.checkpoint_read", path, err)
        }
    })?;
    serde_json::from_str(&contents).map_err(|err| {
        CalError::CorruptCheckpoint(
            ErrorInfo::new("lmcal_fit.checkpoint_parse", err.to_string()).with_path(path),
        )
    })
}

/// Writes a state to disk.
///
/// The JSON is first written to a sibling temporary file which is then
/// renamed over `path`, so the previous checkpoint stays intact until the new
/// one is complete. A state that would not load back (JSON has no encoding for
/// NaN or infinities) is refused before anything touches the disk.
pub fn save<T: Serialize + DeserializeOwned>(state: &T, path: &Path) -> Result<(), CalError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| CalError::io("lmcal_fit.checkpoint_mkdir", parent, err))?;
    }
    let json = serde_json::to_string_pretty(state).map_err(|err| {
        CalError::Io(ErrorInfo::new("lmcal_fit.checkpoint_serialize", err.to_string()).with_path(path))
    })?;
    serde_json::from_str::<T>(&json).map_err(|err| {
        CalError::CorruptCheckpoint(
            ErrorInfo::new("lmcal_fit.checkpoint_unloadable", err.to_string())
                .with_path(path)
                .with_hint("the state holds a non-finite number; the previous checkpoint was kept"),
        )
    })?;
    let staging = staging_path(path);
    fs::write(&staging, json).map_err(|err| CalError::io("lmcal_fit.checkpoint_write", &staging, err))?;
    fs::rename(&staging, path).map_err(|err| {
        let _ = fs::remove_file(&staging);
        CalError::io("lmcal_fit.checkpoint_write", path, err)
    })
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from(CHECKPOINT_FILE_NAME));
    name.push(".partial");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        opt_index: usize,
        sim_dir: PathBuf,
    }

    #[test]
    fn save_then_load_is_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CHECKPOINT_FILE_NAME);
        let state = Sample {
            opt_index: 3,
            sim_dir: PathBuf::from("data/sims"),
        };
        save(&state, &path).unwrap();
        assert_eq!(load::<Sample>(&path).unwrap(), state);
        assert!(!staging_path(&path).exists());
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Scores {
        error: f64,
    }

    #[test]
    fn non_finite_state_keeps_previous_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CHECKPOINT_FILE_NAME);
        save(&Scores { error: 0.25 }, &path).unwrap();
        let before = fs::read(&path).unwrap();

        let err = save(&Scores { error: f64::NAN }, &path).unwrap_err();
        assert!(matches!(err, CalError::CorruptCheckpoint(_)));
        assert_eq!(err.info().code, "lmcal_fit.checkpoint_unloadable");
        assert_eq!(fs::read(&path).unwrap(), before);
        assert!(!staging_path(&path).exists());
        assert_eq!(load::<Scores>(&path).unwrap().error, 0.25);
    }

    #[test]
    fn missing_checkpoint_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = load::<Sample>(&dir.path().join(CHECKPOINT_FILE_NAME)).unwrap_err();
        assert!(matches!(err, CalError::NoCheckpoint(_)));
    }

    #[test]
    fn corrupt_checkpoint_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CHECKPOINT_FILE_NAME);
        fs::write(&path, "{\"opt_index\": ").unwrap();
        let err = load::<Sample>(&path).unwrap_err();
        assert!(matches!(err, CalError::CorruptCheckpoint(_)));
    }
}
