//! # Snapshot Persistence
//!
//! Load the key-value store and the expiration index from disk at startup,
//! and flush them back on a timer, on `SAVE`, and on shutdown.
//!
//! ## Design Principles
//!
//! 1. **Dirty-Gated Flushes**: a structure that has not changed since its
//!    last successful flush is never rewritten.
//! 2. **Write-Temp-Then-Rename**: every flush writes to a temporary file in
//!    the same directory and renames it into place, so a crash mid-write
//!    never corrupts the previous snapshot.
//! 3. **Empty Is Legal**: a missing or empty snapshot file means an empty
//!    store, not an error.

use std::collections::HashMap as StdHashMap;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{Map, Value};

use elysiandb_common::error::{ElysianError, ElysianResult};

use crate::engine::Engine;

pub const DATA_FILE: &str = "elysiandb.json";
pub const EXPIRATION_FILE: &str = "elysiandb.expiration.json";

/// Resolved snapshot file paths rooted at the configured data folder.
#[derive(Debug, Clone)]
pub struct SnapshotPaths {
    pub folder: PathBuf,
}

impl SnapshotPaths {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        SnapshotPaths {
            folder: folder.into(),
        }
    }

    pub fn data_file(&self) -> PathBuf {
        self.folder.join(DATA_FILE)
    }

    pub fn expiration_file(&self) -> PathBuf {
        self.folder.join(EXPIRATION_FILE)
    }

    /// Creates the data folder and seeds both snapshot files with `{}` if
    /// they do not already exist.
    pub fn ensure_exists(&self) -> ElysianResult<()> {
        std::fs::create_dir_all(&self.folder)
            .map_err(|err| ElysianError::fatal_path("could not create data folder", &self.folder, err))?;

        for path in [self.data_file(), self.expiration_file()] {
            if !path.exists() {
                std::fs::write(&path, "{}")
                    .map_err(|err| ElysianError::fatal_path("could not create snapshot file", &path, err))?;
            }
        }
        Ok(())
    }
}

/// Loads both snapshot files into `engine`, clearing the dirty flags on
/// success. Fatal if the folder cannot be created or an existing file
/// contains syntactically invalid JSON; an empty or `{}` file is treated as
/// an empty structure.
pub fn load(engine: &Engine, paths: &SnapshotPaths) -> ElysianResult<()> {
    paths.ensure_exists()?;

    let data_map = read_data_file(&paths.data_file())?;
    engine.kvs().from_map(data_map);

    let expiration_map = read_expiration_file(&paths.expiration_file())?;
    engine.exi().from_map(expiration_map);

    tracing::info!(
        keys = engine.keys_count(),
        expirations = engine.expiration_keys_count(),
        "loaded snapshot"
    );
    Ok(())
}

fn read_data_file(path: &Path) -> ElysianResult<StdHashMap<Vec<u8>, Vec<u8>>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|err| ElysianError::fatal_path("could not read data snapshot", &path.to_path_buf(), err))?;

    if raw.trim().is_empty() {
        return Ok(StdHashMap::new());
    }

    let value: Value = serde_json::from_str(&raw)
        .map_err(|err| ElysianError::fatal_path("invalid data snapshot JSON", &path.to_path_buf(), err))?;

    let object = value.as_object().cloned().unwrap_or_default();
    let mut out = StdHashMap::with_capacity(object.len());
    for (key, value) in object {
        let Some(encoded) = value.as_str() else {
            tracing::warn!(key = %key, "skipping snapshot entry with non-string value");
            continue;
        };
        match BASE64.decode(encoded) {
            Ok(bytes) => {
                out.insert(key.into_bytes(), bytes);
            }
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "skipping snapshot entry with invalid base64");
            }
        }
    }
    Ok(out)
}

fn read_expiration_file(path: &Path) -> ElysianResult<StdHashMap<String, Vec<Vec<u8>>>> {
    let raw = std::fs::read_to_string(path).map_err(|err| {
        ElysianError::fatal_path("could not read expiration snapshot", &path.to_path_buf(), err)
    })?;

    if raw.trim().is_empty() {
        return Ok(StdHashMap::new());
    }

    let value: Value = serde_json::from_str(&raw).map_err(|err| {
        ElysianError::fatal_path("invalid expiration snapshot JSON", &path.to_path_buf(), err)
    })?;

    let object = value.as_object().cloned().unwrap_or_default();
    let mut out = StdHashMap::with_capacity(object.len());
    for (timestamp, keys) in object {
        let Some(array) = keys.as_array() else {
            continue;
        };
        let keys: Vec<Vec<u8>> = array
            .iter()
            .filter_map(|item| item.as_str().map(|s| s.as_bytes().to_vec()))
            .collect();
        out.insert(timestamp, keys);
    }
    Ok(out)
}

/// Flushes whichever of KVS/EXI is dirty to disk. Each structure is
/// serialized and written independently, so a failure in one does not
/// prevent the other from being persisted.
pub fn flush(engine: &Engine, paths: &SnapshotPaths) -> ElysianResult<()> {
    let mut first_error = None;

    if engine.kvs().is_dirty() {
        match write_data_file(engine, &paths.data_file()) {
            Ok(()) => engine.kvs().clear_dirty(),
            Err(err) => {
                tracing::error!(error = %err, "failed to flush data snapshot, will retry");
                first_error.get_or_insert(err);
            }
        }
    }

    if engine.exi().is_dirty() {
        match write_expiration_file(engine, &paths.expiration_file()) {
            Ok(()) => engine.exi().clear_dirty(),
            Err(err) => {
                tracing::error!(error = %err, "failed to flush expiration snapshot, will retry");
                first_error.get_or_insert(err);
            }
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn write_data_file(engine: &Engine, path: &Path) -> ElysianResult<()> {
    let mut object = Map::new();
    engine.kvs().iterate(|key, value| {
        let key = String::from_utf8_lossy(key).into_owned();
        object.insert(key, Value::String(BASE64.encode(value)));
    });

    let encoded = serde_json::to_string_pretty(&Value::Object(object))
        .map_err(|err| ElysianError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, err)))?;
    write_atomically(path, encoded.as_bytes())
}

fn write_expiration_file(engine: &Engine, path: &Path) -> ElysianResult<()> {
    let mut object = Map::new();
    for (timestamp, keys) in engine.exi().to_map() {
        let array = keys
            .into_iter()
            .map(|k| Value::String(String::from_utf8_lossy(&k).into_owned()))
            .collect();
        object.insert(timestamp, Value::Array(array));
    }

    let encoded = serde_json::to_string_pretty(&Value::Object(object))
        .map_err(|err| ElysianError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, err)))?;
    write_atomically(path, encoded.as_bytes())
}

/// Writes `contents` to a temp file beside `path` and renames it into
/// place, so a crash mid-write leaves the previous snapshot untouched.
fn write_atomically(path: &Path, contents: &[u8]) -> ElysianResult<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("snapshot");
    let tmp_path = dir.join(format!(".{file_name}.tmp"));

    std::fs::write(&tmp_path, contents)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_then_load_round_trips_values_and_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let paths = SnapshotPaths::new(dir.path());

        let engine = Engine::new();
        engine.set(b"foo".to_vec(), b"hello".to_vec(), None);
        engine.exi().put(b"foo".to_vec(), 9_999_999_999);

        flush(&engine, &paths).unwrap();
        assert!(!engine.kvs().is_dirty());
        assert!(!engine.exi().is_dirty());

        let reloaded = Engine::new();
        load(&reloaded, &paths).unwrap();
        assert_eq!(reloaded.get(b"foo"), Some(b"hello".to_vec()));
        assert_eq!(reloaded.exi().ttl_of(b"foo"), Some(9_999_999_999));
    }

    #[test]
    fn missing_files_are_created_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let paths = SnapshotPaths::new(dir.path());

        let engine = Engine::new();
        load(&engine, &paths).unwrap();
        assert_eq!(engine.keys_count(), 0);
        assert!(paths.data_file().exists());
        assert!(paths.expiration_file().exists());
    }

    #[test]
    fn flush_skips_clean_structures() {
        let dir = tempfile::tempdir().unwrap();
        let paths = SnapshotPaths::new(dir.path());

        let engine = Engine::new();
        load(&engine, &paths).unwrap();
        let before = std::fs::metadata(paths.data_file()).unwrap().modified().unwrap();

        std::thread::sleep(std::time::Duration::from_millis(10));
        flush(&engine, &paths).unwrap();
        let after = std::fs::metadata(paths.data_file()).unwrap().modified().unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn invalid_json_is_a_fatal_error() {
        let dir = tempfile::tempdir().unwrap();
        let paths = SnapshotPaths::new(dir.path());
        paths.ensure_exists().unwrap();
        std::fs::write(paths.data_file(), "not json").unwrap();

        let engine = Engine::new();
        assert!(load(&engine, &paths).is_err());
    }
}
