//! Staging subgraph artifacts between bulk storage and local scratch.
//!
//! The driver never touches bulk storage directly. It asks an
//! [`ArtifactTransfer`] to stage a checkpoint's artifact into the scratch
//! directory and to clean the local copy up afterwards. [`StagedArtifact`]
//! ties the cleanup to scope, so the scratch copy is removed on every exit path.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::artifact::subgraph_file_name;
use crate::checkpoint::Checkpoint;
use crate::error::TransferError;

/// Result type for transfer operations.
pub type TransferResult<T> = std::result::Result<T, TransferError>;

/// Maximum amount of a failed command's stderr kept in the error message.
const MAX_STDERR: usize = 4 * 1024;

/// Moves per-checkpoint artifacts into scratch storage and removes them again.
pub trait ArtifactTransfer {
    /// Fetch the artifact for `checkpoint` into `scratch`, returning the local path.
    fn stage(&self, checkpoint: Checkpoint, scratch: &Path) -> TransferResult<PathBuf>;

    /// Remove a staged local copy. Removing an already-absent file succeeds.
    fn cleanup(&self, local: &Path) -> TransferResult<()> {
        remove_local(local)
    }
}

impl<T: ArtifactTransfer + ?Sized> ArtifactTransfer for Box<T> {
    fn stage(&self, checkpoint: Checkpoint, scratch: &Path) -> TransferResult<PathBuf> {
        (**self).stage(checkpoint, scratch)
    }

    fn cleanup(&self, local: &Path) -> TransferResult<()> {
        (**self).cleanup(local)
    }
}

fn remove_local(local: &Path) -> TransferResult<()> {
    match std::fs::remove_file(local) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(TransferError::Cleanup {
            path: local.display().to_string(),
            message: e.to_string(),
        }),
    }
}

/// Stages by copying from a directory on a mounted bulk filesystem.
#[derive(Debug, Clone)]
pub struct CopyTransfer {
    source_dir: PathBuf,
}

impl CopyTransfer {
    pub fn new(source_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
        }
    }
}

impl ArtifactTransfer for CopyTransfer {
    fn stage(&self, checkpoint: Checkpoint, scratch: &Path) -> TransferResult<PathBuf> {
        let name = subgraph_file_name(checkpoint);
        let source = self.source_dir.join(&name);
        let local = scratch.join(&name);
        let stage_err = |message: String| TransferError::Stage {
            checkpoint: checkpoint.label(),
            message,
        };

        std::fs::create_dir_all(scratch)
            .map_err(|e| stage_err(format!("cannot create {}: {e}", scratch.display())))?;
        std::fs::copy(&source, &local)
            .map_err(|e| stage_err(format!("copy from {} failed: {e}", source.display())))?;
        Ok(local)
    }
}

/// Stages by running an external copy program (e.g. `rclone copy`).
///
/// Each argument may contain the placeholders `{remote}` (the remote artifact
/// path, `<remote_prefix>/<file name>`), `{local}` (the scratch directory) and
/// `{checkpoint}` (the `YYYY-MM` label).
#[derive(Debug, Clone)]
pub struct CommandTransfer {
    program: String,
    args: Vec<String>,
    remote_prefix: String,
}

impl CommandTransfer {
    pub fn new(program: impl Into<String>, args: Vec<String>, remote_prefix: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args,
            remote_prefix: remote_prefix.into(),
        }
    }

    /// `rclone copy <remote_prefix>/<artifact> <scratch>`.
    pub fn rclone(remote_prefix: impl Into<String>) -> Self {
        Self::new(
            "rclone",
            vec!["copy".into(), "{remote}".into(), "{local}".into()],
            remote_prefix,
        )
    }

    fn render_args(&self, checkpoint: Checkpoint, scratch: &Path) -> Vec<String> {
        let remote = format!(
            "{}/{}",
            self.remote_prefix.trim_end_matches('/'),
            subgraph_file_name(checkpoint)
        );
        let local = scratch.display().to_string();
        let label = checkpoint.label();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{remote}", &remote)
                    .replace("{local}", &local)
                    .replace("{checkpoint}", &label)
            })
            .collect()
    }
}

impl ArtifactTransfer for CommandTransfer {
    fn stage(&self, checkpoint: Checkpoint, scratch: &Path) -> TransferResult<PathBuf> {
        std::fs::create_dir_all(scratch).map_err(|e| TransferError::Stage {
            checkpoint: checkpoint.label(),
            message: format!("cannot create {}: {e}", scratch.display()),
        })?;

        let args = self.render_args(checkpoint, scratch);
        tracing::debug!(program = %self.program, ?args, "running transfer command");
        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|e| TransferError::Spawn {
                program: self.program.clone(),
                source: e,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let mut end = stderr.len().min(MAX_STDERR);
            while !stderr.is_char_boundary(end) {
                end -= 1;
            }
            return Err(TransferError::Stage {
                checkpoint: checkpoint.label(),
                message: format!("`{}` exited with {}: {}", self.program, output.status, &stderr[..end]),
            });
        }

        let local = scratch.join(subgraph_file_name(checkpoint));
        if !local.exists() {
            return Err(TransferError::Stage {
                checkpoint: checkpoint.label(),
                message: format!("`{}` succeeded but {} is missing", self.program, local.display()),
            });
        }
        Ok(local)
    }
}

/// A staged local artifact, removed through its transfer when dropped.
///
/// Call [`StagedArtifact::release`] to clean up explicitly and observe the
/// result; on any other exit path the drop handler cleans up and logs failures.
pub struct StagedArtifact<'a, T: ArtifactTransfer + ?Sized> {
    path: PathBuf,
    transfer: &'a T,
    released: bool,
}

impl<'a, T: ArtifactTransfer + ?Sized> StagedArtifact<'a, T> {
    /// Stage `checkpoint` into `scratch`.
    ///
    /// If staging fails, whatever a partial transfer left at the expected local
    /// path is removed before the error is returned.
    pub fn stage(transfer: &'a T, checkpoint: Checkpoint, scratch: &Path) -> TransferResult<Self> {
        match transfer.stage(checkpoint, scratch) {
            Ok(path) => Ok(Self {
                path,
                transfer,
                released: false,
            }),
            Err(e) => {
                let partial = scratch.join(subgraph_file_name(checkpoint));
                if let Err(cleanup) = transfer.cleanup(&partial) {
                    tracing::error!(path = %partial.display(), error = %cleanup, "failed to remove partial transfer");
                }
                Err(e)
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the local copy now.
    pub fn release(mut self) -> TransferResult<()> {
        self.released = true;
        self.transfer.cleanup(&self.path)
    }
}

impl<T: ArtifactTransfer + ?Sized> Drop for StagedArtifact<'_, T> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.transfer.cleanup(&self.path) {
            tracing::error!(path = %self.path.display(), error = %e, "failed to remove staged artifact");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cp(label: &str) -> Checkpoint {
        label.parse().unwrap()
    }

    #[test]
    fn copy_transfer_stages_and_cleans() {
        let bulk = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let name = subgraph_file_name(cp("2001-01"));
        std::fs::write(bulk.path().join(&name), b"graph").unwrap();

        let transfer = CopyTransfer::new(bulk.path());
        let staged = StagedArtifact::stage(&transfer, cp("2001-01"), scratch.path()).unwrap();
        assert_eq!(std::fs::read(staged.path()).unwrap(), b"graph");

        let path = staged.path().to_path_buf();
        staged.release().unwrap();
        assert!(!path.exists());
        assert!(bulk.path().join(&name).exists());
    }

    #[test]
    fn drop_cleans_up_staged_copy() {
        let bulk = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        std::fs::write(bulk.path().join(subgraph_file_name(cp("2001-02"))), b"g").unwrap();

        let transfer = CopyTransfer::new(bulk.path());
        let path = {
            let staged = StagedArtifact::stage(&transfer, cp("2001-02"), scratch.path()).unwrap();
            staged.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn missing_source_is_a_stage_error() {
        let bulk = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let transfer = CopyTransfer::new(bulk.path());
        let err = transfer.stage(cp("2001-03"), scratch.path()).unwrap_err();
        assert!(matches!(err, TransferError::Stage { .. }));
    }

    #[test]
    fn failed_stage_removes_partial_copy() {
        struct Partial;
        impl ArtifactTransfer for Partial {
            fn stage(&self, checkpoint: Checkpoint, scratch: &Path) -> TransferResult<PathBuf> {
                std::fs::write(scratch.join(subgraph_file_name(checkpoint)), b"half").unwrap();
                Err(TransferError::Stage {
                    checkpoint: checkpoint.label(),
                    message: "connection reset".into(),
                })
            }
        }

        let scratch = TempDir::new().unwrap();
        assert!(StagedArtifact::stage(&Partial, cp("2001-04"), scratch.path()).is_err());
        assert!(!scratch.path().join(subgraph_file_name(cp("2001-04"))).exists());
    }

    #[test]
    fn cleanup_of_absent_file_succeeds() {
        let scratch = TempDir::new().unwrap();
        let transfer = CopyTransfer::new(scratch.path());
        assert!(transfer.cleanup(&scratch.path().join("gone.bin")).is_ok());
    }

    #[test]
    fn command_args_are_rendered() {
        let transfer = CommandTransfer::rclone("bulk:Graphs/");
        let args = transfer.render_args(cp("2002-11"), Path::new("/scratch/run"));
        assert_eq!(
            args,
            vec!["copy", "bulk:Graphs/cpd_patent_2002-11.bin", "/scratch/run"]
        );
    }

    #[test]
    fn unknown_program_is_a_spawn_error() {
        let scratch = TempDir::new().unwrap();
        let transfer = CommandTransfer::new("definitely-not-a-real-program-cpd", vec![], "x:");
        let err = transfer.stage(cp("2002-01"), scratch.path()).unwrap_err();
        assert!(matches!(err, TransferError::Spawn { .. }));
    }
}
