//! JSON-file persistence helpers shared by the pool, batch, and auth stores.
//!
//! Mirrors the teacher's persisted-queue convention: load the whole file on
//! open (or start from `Default` when it is missing or empty), and rewrite
//! the whole file after every mutation. Callers hold the file behind a
//! `tokio::sync::Mutex` to get the linearizable read-modify-write semantics
//! the stores require.

use crate::error::CoreError;
use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// How a store persists its state.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    /// Not persisted across restarts; lives only in process memory.
    Memory,
    /// Whole-state JSON file at `path`.
    JsonFile { path: PathBuf },
}

impl StorageConfig {
    pub fn json_file(path: impl Into<PathBuf>) -> Self {
        StorageConfig::JsonFile { path: path.into() }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StorageConfig::Memory => "memory",
            StorageConfig::JsonFile { .. } => "json_file",
        }
    }
}

/// Loads `T` from `path`, defaulting when the file is absent or empty.
pub fn load_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T, CoreError> {
    if !path.exists() {
        return Ok(T::default());
    }
    let bytes = fs::read(path)?;
    if bytes.is_empty() {
        return Ok(T::default());
    }
    Ok(serde_json::from_slice(&bytes)?)
}

/// Serializes `value` and atomically-ish rewrites `path` (write to a temp
/// file in the same directory, then rename, so a crash never leaves a
/// truncated state file behind).
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, bytes)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Default, Serialize, Deserialize, PartialEq, Debug)]
    struct Sample {
        value: u32,
    }

    #[test]
    fn load_missing_file_defaults() {
        let path = PathBuf::from("/tmp/ecoretire-store-test-missing-does-not-exist.json");
        let loaded: Sample = load_json(&path).unwrap();
        assert_eq!(loaded, Sample::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = std::env::temp_dir().join(format!("ecoretire-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("state.json");
        let value = Sample { value: 42 };
        save_json(&path, &value).unwrap();
        let loaded: Sample = load_json(&path).unwrap();
        assert_eq!(loaded, value);
        let _ = fs::remove_dir_all(dir);
    }
}
