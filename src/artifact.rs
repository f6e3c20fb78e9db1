//! Binary artifact persistence.
//!
//! Graphs, identifier indexes, membership tables and per-checkpoint subgraphs
//! are stored as `bincode` encodings of their serde form. Writes go to a
//! temporary sibling file that is renamed into place, so a crash never leaves a
//! half-written artifact under the final name. Reads memory-map the file with
//! `memmap2` and decode straight from the mapping.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::checkpoint::Checkpoint;
use crate::error::ArtifactError;

/// Result type for artifact operations.
pub type ArtifactResult<T> = std::result::Result<T, ArtifactError>;

/// File name of the subgraph artifact for a checkpoint.
pub fn subgraph_file_name(checkpoint: Checkpoint) -> String {
    format!("cpd_patent_{checkpoint}.bin")
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ArtifactError + '_ {
    move |source| ArtifactError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Temporary sibling path used while writing `path`.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

/// Serialize `value` to `path` atomically.
pub fn write<T: Serialize + ?Sized>(path: &Path, value: &T) -> ArtifactResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }

    let tmp = temp_path(path);
    let result = (|| {
        let file = File::create(&tmp).map_err(io_err(&tmp))?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, value).map_err(|e| ArtifactError::Serialization {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        writer.flush().map_err(io_err(&tmp))?;
        writer
            .into_inner()
            .map_err(|e| ArtifactError::Io {
                path: tmp.display().to_string(),
                source: e.into_error(),
            })?
            .sync_all()
            .map_err(io_err(&tmp))?;
        fs::rename(&tmp, path).map_err(io_err(path))
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Deserialize an artifact from `path`.
///
/// A missing file is reported as [`ArtifactError::Missing`] so callers can
/// treat it as a precondition failure.
pub fn read<T: DeserializeOwned>(path: &Path) -> ArtifactResult<T> {
    if !path.exists() {
        return Err(ArtifactError::Missing {
            path: path.display().to_string(),
        });
    }
    let file = File::open(path).map_err(io_err(path))?;
    let len = file.metadata().map_err(io_err(path))?.len();
    if len == 0 {
        return Err(ArtifactError::Serialization {
            path: path.display().to_string(),
            message: "file is empty".into(),
        });
    }

    // Safety: the mapping is read-only and dropped before this function
    // returns. Artifacts are only replaced by rename, never modified in place.
    let mmap = unsafe { Mmap::map(&file) }.map_err(io_err(path))?;
    bincode::deserialize(&mmap[..]).map_err(|e| ArtifactError::Serialization {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[test]
    fn write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("table.bin");
        let mut value = BTreeMap::new();
        value.insert("SCHEMBL1".to_string(), 7u32);

        write(&path, &value).unwrap();
        let back: BTreeMap<String, u32> = read(&path).unwrap();
        assert_eq!(back, value);
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn missing_artifact_is_reported() {
        let dir = TempDir::new().unwrap();
        let err = read::<Vec<u8>>(&dir.path().join("nope.bin")).unwrap_err();
        assert!(matches!(err, ArtifactError::Missing { .. }));
    }

    #[test]
    fn truncated_artifact_is_a_serialization_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.bin");
        std::fs::write(&path, [1u8]).unwrap();
        let err = read::<Vec<String>>(&path).unwrap_err();
        assert!(matches!(err, ArtifactError::Serialization { .. }));

        std::fs::write(&path, []).unwrap();
        let err = read::<Vec<String>>(&path).unwrap_err();
        assert!(matches!(err, ArtifactError::Serialization { .. }));
    }

    #[test]
    fn subgraph_names_follow_checkpoint_label() {
        let cp: Checkpoint = "2004-09".parse().unwrap();
        assert_eq!(subgraph_file_name(cp), "cpd_patent_2004-09.bin");
    }
}
